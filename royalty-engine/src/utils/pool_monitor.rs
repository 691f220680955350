//! Connection pool monitoring
//!
//! Transactions opened through `begin_monitored` log how long the pool took
//! to hand out a connection and how long the connection was held. Settlement
//! runs hold one connection for the whole publish or payment, so long holds
//! show up here first.

use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::time::Instant;

use crate::error::EngineResult;

/// Transaction wrapper that logs hold time on commit, rollback, or drop
pub struct MonitoredTransaction<'c> {
    tx: Transaction<'c, Sqlite>,
    hold: HoldTimer,
}

/// Logs hold time once; a timer still armed at drop means the transaction
/// was dropped without commit (error path or timeout) and rolled back.
struct HoldTimer {
    caller: &'static str,
    acquired_at: Instant,
    armed: bool,
}

impl HoldTimer {
    fn release(&mut self, how: &'static str) {
        self.armed = false;
        let held_ms = self.acquired_at.elapsed().as_millis();
        if held_ms > 2000 {
            tracing::warn!(caller = self.caller, held_ms, how, "Long transaction released");
        } else {
            tracing::debug!(caller = self.caller, held_ms, how, "Connection released");
        }
    }
}

impl Drop for HoldTimer {
    fn drop(&mut self) {
        if self.armed {
            let held_ms = self.acquired_at.elapsed().as_millis();
            tracing::warn!(
                caller = self.caller,
                held_ms,
                "Transaction dropped without commit; changes rolled back"
            );
        }
    }
}

impl<'c> MonitoredTransaction<'c> {
    /// Connection to run queries on
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub async fn commit(self) -> EngineResult<()> {
        let MonitoredTransaction { tx, mut hold } = self;
        tx.commit().await?;
        hold.release("commit");
        Ok(())
    }

    pub async fn rollback(self) -> EngineResult<()> {
        let MonitoredTransaction { tx, mut hold } = self;
        tx.rollback().await?;
        hold.release("rollback");
        Ok(())
    }
}

/// Begin a transaction, logging slow connection acquisition
pub async fn begin_monitored<'c>(
    pool: &'c SqlitePool,
    caller: &'static str,
) -> EngineResult<MonitoredTransaction<'c>> {
    let start = Instant::now();
    let tx = pool.begin().await?;

    let wait_ms = start.elapsed().as_millis();
    if wait_ms > 1000 {
        tracing::warn!(caller, wait_ms, "Slow connection acquisition; pool may be saturated");
    } else {
        tracing::debug!(caller, wait_ms, "Connection acquired");
    }

    Ok(MonitoredTransaction {
        tx,
        hold: HoldTimer {
            caller,
            acquired_at: Instant::now(),
            armed: true,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use royalty_common::db::{init_database, PoolSettings};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("monitor.db"), &PoolSettings::default())
            .await
            .unwrap();

        {
            let mut tx = begin_monitored(&pool, "test::drop").await.unwrap();
            sqlx::query("INSERT INTO schema_version (version) VALUES (99)")
                .execute(tx.conn())
                .await
                .unwrap();
        }

        let mut tx = begin_monitored(&pool, "test::commit").await.unwrap();
        sqlx::query("INSERT INTO schema_version (version) VALUES (42)")
            .execute(tx.conn())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let versions: Vec<i64> = sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert!(versions.contains(&42));
        assert!(!versions.contains(&99));
    }
}
