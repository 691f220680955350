//! Data models for royalty-engine

pub mod ledger;
pub mod metadata;
pub mod row;
pub mod statement;
pub mod writer;

pub use ledger::{LedgerEntry, PaymentSummary, WriterPaymentLine, WriterTotals};
pub use metadata::{
    AssignedWriter, AssignmentSource, CommissionSnapshot, MatchedBy, ReviewItem, ReviewStatus,
    StatementMetadata, WorkAssignment, WriterMatch, METADATA_SCHEMA_VERSION,
};
pub use row::{normalize_ipi, normalize_title, work_keys, ProType, RowMetadata, StatementRow};
pub use statement::{PaymentStatus, Statement, StatementStatus, StatementSummary};
pub use writer::{
    CommissionPolicy, CommissionRedemption, Placement, PlacementCredit, RedemptionStatus,
    WriterBalance, WriterRecord,
};
