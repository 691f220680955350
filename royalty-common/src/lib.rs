//! # Royalty Common Library
//!
//! Shared code for the royalty settlement workspace:
//! - Error types shared by every crate
//! - Bootstrap configuration (TOML + environment + root folder resolution)
//! - Settlement event types and the EventBus used for post-commit fan-out
//! - SQLite pool initialization and schema creation

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
