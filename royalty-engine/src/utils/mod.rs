//! Utility modules for royalty-engine

pub mod db_retry;
pub mod deadline;
pub mod pool_monitor;

pub use db_retry::retry_on_lock;
pub use deadline::with_deadline;
pub use pool_monitor::{begin_monitored, MonitoredTransaction};
