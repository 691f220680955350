//! Deadline for long settlement runs
//!
//! The future passed in owns its transaction. When the deadline fires the
//! future is dropped, which drops the transaction and rolls it back, so a
//! timed-out run leaves the statement in its pre-run state.

use std::future::Future;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};

/// Run `fut` with an upper bound of `limit`
pub async fn with_deadline<F, T>(operation: &'static str, limit: Duration, fut: F) -> EngineResult<T>
where
    F: Future<Output = EngineResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                operation,
                timeout_secs = limit.as_secs(),
                "Operation timed out; transaction rolled back"
            );
            Err(EngineError::Timeout {
                operation,
                seconds: limit.as_secs(),
            })
        }
    }
}
