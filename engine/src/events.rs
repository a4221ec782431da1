//! Notification events.
//!
//! Best-effort observability hooks, not part of the consistency contract.
//! Events are dispatched without blocking the operation that triggered
//! them and always after the account lock is released, so observers may
//! race with subsequent operations on the same account. Delivery and
//! ordering are not guaranteed: a subscriber with a full or closed queue
//! silently misses events.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

use ledgerkeep_common::{Account, Balance, Entry};

/// Queue depth of each subscriber channel.
const SUBSCRIBER_QUEUE_DEPTH: usize = 256;

/// A notification event produced by the ledger engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// An account was created.
    AccountCreated(Account),
    /// An account and all its entries were deleted.
    AccountDeleted(Account),
    /// A credit entry was added.
    CreditAdded { account: Account, entry: Entry },
    /// A debit entry was added.
    DebitAdded { account: Account, entry: Entry },
    /// A pending entry was canceled.
    EntryCanceled { account: Account, entry: Entry },
    /// Pending entries were folded into a new balance snapshot.
    EntriesCommitted {
        account: Account,
        balance_before: Balance,
        balance_after: Balance,
    },
}

impl LedgerEvent {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::AccountCreated(_) => "account_created",
            LedgerEvent::AccountDeleted(_) => "account_deleted",
            LedgerEvent::CreditAdded { .. } => "credit_added",
            LedgerEvent::DebitAdded { .. } => "debit_added",
            LedgerEvent::EntryCanceled { .. } => "entry_canceled",
            LedgerEvent::EntriesCommitted { .. } => "entries_committed",
        }
    }
}

/// Fire-and-forget event dispatcher.
pub struct EventDispatcher {
    subscribers: RwLock<Vec<mpsc::Sender<LedgerEvent>>>,
}

impl EventDispatcher {
    /// Create a dispatcher with no subscribers.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Register a new subscriber and return its receiving end.
    pub fn subscribe(&self) -> mpsc::Receiver<LedgerEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        self.subscribers.write().push(tx);
        rx
    }

    /// Publish an event to all live subscribers without blocking.
    ///
    /// Subscribers whose queue is full miss the event; subscribers whose
    /// receiver was dropped are pruned.
    pub fn publish(&self, event: LedgerEvent) {
        trace!(event = event.name(), "publishing ledger event");
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_event() -> LedgerEvent {
        LedgerEvent::AccountCreated(Account::new("test", None))
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let dispatcher = EventDispatcher::new();
        let mut rx = dispatcher.subscribe();

        dispatcher.publish(test_event());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "account_created");
    }

    #[tokio::test]
    async fn test_closed_subscriber_is_pruned() {
        let dispatcher = EventDispatcher::new();
        let rx = dispatcher.subscribe();
        assert_eq!(dispatcher.subscriber_count(), 1);

        drop(rx);
        dispatcher.publish(test_event());
        assert_eq!(dispatcher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let dispatcher = EventDispatcher::new();
        let mut rx = dispatcher.subscribe();

        for _ in 0..SUBSCRIBER_QUEUE_DEPTH + 10 {
            dispatcher.publish(test_event());
        }

        // Subscriber stays registered and sees exactly the queued events.
        assert_eq!(dispatcher.subscriber_count(), 1);
        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, SUBSCRIBER_QUEUE_DEPTH);
    }
}
