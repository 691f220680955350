//! Settlement event types and the EventBus
//!
//! Events are emitted only after the owning transaction has committed. They
//! feed best-effort side effects (writer notifications, milestone badges) and
//! must never be able to fail a settlement.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Settlement events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RoyaltyEvent {
    /// Ledger entries for a statement were (re)materialized
    StatementPublished {
        statement_id: Uuid,
        entry_count: usize,
        total_commission: Decimal,
        total_net: Decimal,
        republished: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Ledger entries became visible to writers ahead of payment
    StatementQueued {
        statement_id: Uuid,
        entry_count: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Payment committed for a statement
    StatementPaid {
        statement_id: Uuid,
        writer_count: usize,
        total_credited: Decimal,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One writer's balance was credited by a payment run
    EarningsCredited {
        writer_id: Uuid,
        statement_id: Uuid,
        amount: Decimal,
        available_balance: Decimal,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Lifetime earnings crossed a milestone threshold
    EarningsMilestone {
        writer_id: Uuid,
        milestone: Decimal,
        lifetime_earnings: Decimal,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl RoyaltyEvent {
    /// Short event name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            RoyaltyEvent::StatementPublished { .. } => "StatementPublished",
            RoyaltyEvent::StatementQueued { .. } => "StatementQueued",
            RoyaltyEvent::StatementPaid { .. } => "StatementPaid",
            RoyaltyEvent::EarningsCredited { .. } => "EarningsCredited",
            RoyaltyEvent::EarningsMilestone { .. } => "EarningsMilestone",
        }
    }
}

/// Central event distribution bus
///
/// Uses `tokio::broadcast` internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use royalty_common::events::{EventBus, RoyaltyEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(RoyaltyEvent::StatementQueued {
///     statement_id: uuid::Uuid::new_v4(),
///     entry_count: 3,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RoyaltyEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<RoyaltyEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: RoyaltyEvent,
    ) -> Result<usize, broadcast::error::SendError<RoyaltyEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: RoyaltyEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
