//! Post-commit side effects
//!
//! Writer notifications and earnings milestones run after the payment
//! transaction commits, with bounded concurrency. A failed delivery is logged
//! and dropped; it never reaches the caller of the payment.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use royalty_common::events::{EventBus, RoyaltyEvent};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Lifetime earnings thresholds that raise a milestone event
pub fn earnings_milestones() -> [Decimal; 3] {
    [Decimal::ONE_HUNDRED, Decimal::ONE_THOUSAND, Decimal::from(10_000)]
}

#[derive(Debug, Error)]
#[error("Notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Downstream delivery of settlement events
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &RoyaltyEvent) -> Result<(), NotifyError>;
}

/// Publishes events on the in-process EventBus
pub struct EventBusNotifier {
    bus: EventBus,
}

impl EventBusNotifier {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Notifier for EventBusNotifier {
    async fn notify(&self, event: &RoyaltyEvent) -> Result<(), NotifyError> {
        // No subscribers is not a failure
        self.bus.emit_lossy(event.clone());
        Ok(())
    }
}

/// Milestones crossed when lifetime earnings move from `before` to `after`
pub fn crossed_milestones(before: Decimal, after: Decimal) -> Vec<Decimal> {
    earnings_milestones()
        .into_iter()
        .filter(|m| before < *m && after >= *m)
        .collect()
}

/// Deliver events with at most `concurrency` in flight
///
/// Returns the number of failed deliveries (already logged).
pub async fn deliver_all(notifier: Arc<dyn Notifier>, events: Vec<RoyaltyEvent>, concurrency: usize) -> usize {
    let failures = AtomicUsize::new(0);
    let total = events.len();

    stream::iter(events)
        .for_each_concurrent(concurrency.max(1), |event| {
            let notifier = Arc::clone(&notifier);
            let failures = &failures;
            async move {
                if let Err(e) = notifier.notify(&event).await {
                    failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(event = event.event_type(), error = %e, "Side effect failed; ignoring");
                }
            }
        })
        .await;

    let failed = failures.load(Ordering::Relaxed);
    tracing::debug!(total, failed, "Post-commit side effects delivered");
    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct FlakyNotifier {
        seen: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl Notifier for FlakyNotifier {
        async fn notify(&self, event: &RoyaltyEvent) -> Result<(), NotifyError> {
            self.seen.lock().unwrap().push(event.event_type());
            match event {
                RoyaltyEvent::EarningsMilestone { .. } => Err(NotifyError("badge service down".into())),
                _ => Ok(()),
            }
        }
    }

    #[test]
    fn test_crossed_milestones() {
        assert_eq!(crossed_milestones(dec!(99.99), dec!(100)), vec![dec!(100)]);
        assert_eq!(crossed_milestones(dec!(50), dec!(20000)), vec![dec!(100), dec!(1000), dec!(10000)]);
        assert!(crossed_milestones(dec!(100), dec!(999)).is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_propagated() {
        let notifier = Arc::new(FlakyNotifier { seen: Mutex::new(Vec::new()) });
        let writer_id = Uuid::new_v4();
        let events = vec![
            RoyaltyEvent::EarningsCredited {
                writer_id,
                statement_id: Uuid::new_v4(),
                amount: dec!(150),
                available_balance: dec!(150),
                timestamp: Utc::now(),
            },
            RoyaltyEvent::EarningsMilestone {
                writer_id,
                milestone: dec!(100),
                lifetime_earnings: dec!(150),
                timestamp: Utc::now(),
            },
        ];

        let failed = deliver_all(notifier.clone(), events, 10).await;
        assert_eq!(failed, 1);
        assert_eq!(notifier.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_event_bus_notifier_reaches_subscribers() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let notifier = EventBusNotifier::new(bus);
        notifier
            .notify(&RoyaltyEvent::StatementQueued {
                statement_id: Uuid::nil(),
                entry_count: 4,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().event_type(), "StatementQueued");
    }
}
