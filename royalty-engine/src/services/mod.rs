//! Settlement services
//!
//! Resolution and settlement math are pure (`identity_scorer`,
//! `settlement_builder`, `rounding`); the orchestrator and payment processor
//! own transactions and state transitions.

pub mod balance_ledger;
pub mod catalog;
pub mod commission_resolver;
pub mod identity_scorer;
pub mod notifier;
pub mod payment_processor;
pub mod policy_admin;
pub mod publish_orchestrator;
pub mod rounding;
pub mod settlement_builder;
pub mod writer_resolver;

pub use balance_ledger::BalanceChange;
pub use catalog::Catalog;
pub use commission_resolver::{EffectiveRate, RateSource, SettlementContext};
pub use identity_scorer::{Decision, IdentityScorer, ScoredRow};
pub use notifier::{EventBusNotifier, Notifier, NotifyError};
pub use payment_processor::{PaymentOutcome, PaymentProcessor, PaymentReceipt};
pub use policy_admin::PolicyAdmin;
pub use publish_orchestrator::{PublishOrchestrator, PublishOutcome, ReviewQueue};
pub use rounding::smart_round;
pub use settlement_builder::{Settlement, SettlementBuilder};
pub use writer_resolver::{
    IdentityDirectory, PlacementRegistry, ResolutionReport, RowOutcome, WriterResolver,
};
