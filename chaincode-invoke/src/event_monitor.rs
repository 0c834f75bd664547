//! Commit event monitoring
//!
//! [`CommitEventMonitor::arm`] registers interest in a transaction and fixes
//! the wait deadline. It must run before the commit is dispatched, otherwise
//! the event can arrive before anyone listens for it.
//!
//! The hub callbacks and the deadline race to settle a single slot. Whichever
//! wins, the registration is released exactly once: by [`PendingCommit::wait`]
//! on every outcome, or by `Drop` when the pending commit is abandoned.

use crate::{
    network::EventHub,
    types::{CommitConfirmation, CommitEvent, EventError, TransactionId},
    Error, Result,
};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Rejection reason when no event arrives in time
pub const TIMEOUT_MESSAGE: &str = "Timed out waiting for block event";

type Settlement = std::result::Result<CommitEvent, EventError>;

/// Slot that accepts the first value and ignores the rest
struct SettleOnce<T> {
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> SettleOnce<T> {
    fn new(sender: oneshot::Sender<T>) -> Self {
        Self {
            sender: Mutex::new(Some(sender)),
        }
    }

    /// Returns false if already settled
    fn settle(&self, value: T) -> bool {
        match self.sender.lock().take() {
            Some(sender) => sender.send(value).is_ok(),
            None => false,
        }
    }
}

/// Event hub registration, released at most once
struct Registration {
    hub: Arc<dyn EventHub>,
    tx_id: String,
    active: bool,
}

impl Registration {
    fn release(&mut self) {
        if self.active {
            self.active = false;
            self.hub.unregister_tx_event(&self.tx_id);
            debug!(tx_id = %self.tx_id, "Unregistered transaction event");
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.release();
    }
}

/// Arms commit event listeners on one channel's event hub
pub struct CommitEventMonitor {
    hub: Arc<dyn EventHub>,
    wait_time: Duration,
}

impl CommitEventMonitor {
    /// Create new monitor
    pub fn new(hub: Arc<dyn EventHub>, wait_time: Duration) -> Self {
        Self { hub, wait_time }
    }

    /// Register for the transaction's commit event and start the deadline
    pub fn arm(&self, tx_id: &TransactionId) -> Result<PendingCommit> {
        let (sender, receiver) = oneshot::channel::<Settlement>();
        let slot = Arc::new(SettleOnce::new(sender));
        let expected = tx_id.to_string();

        let on_event = {
            let slot = slot.clone();
            let expected = expected.clone();
            Box::new(move |event: CommitEvent| {
                if event.tx_id != expected {
                    debug!(
                        "Ignoring event for {} on registration {}",
                        event.tx_id, expected
                    );
                    return;
                }
                slot.settle(Ok(event));
            })
        };

        let on_error = {
            let slot = slot.clone();
            Box::new(move |error: EventError| {
                slot.settle(Err(error));
            })
        };

        self.hub
            .register_tx_event(&expected, on_event, on_error)?;

        debug!(tx_id = %expected, wait = ?self.wait_time, "Registered transaction event");

        Ok(PendingCommit {
            registration: Registration {
                hub: self.hub.clone(),
                tx_id: expected.clone(),
                active: true,
            },
            tx_id: expected,
            receiver,
            deadline: Instant::now() + self.wait_time,
        })
    }
}

/// Armed listener for one transaction's commit event
pub struct PendingCommit {
    registration: Registration,
    tx_id: String,
    receiver: oneshot::Receiver<Settlement>,
    deadline: Instant,
}

impl PendingCommit {
    /// Transaction being watched
    pub fn tx_id(&self) -> &str {
        &self.tx_id
    }

    /// Wait for the commit event or the deadline, whichever comes first
    pub async fn wait(mut self) -> Result<CommitConfirmation> {
        let settled = tokio::select! {
            biased;

            settled = &mut self.receiver => settled,

            _ = tokio::time::sleep_until(self.deadline) => {
                self.registration.release();
                warn!(tx_id = %self.tx_id, "Timeout - Failed to receive the transaction event");
                return Err(Error::CommitUnconfirmed {
                    tx_id: self.tx_id.clone(),
                    reason: TIMEOUT_MESSAGE.to_string(),
                });
            }
        };

        self.registration.release();

        match settled {
            Ok(Ok(event)) => self.judge(event),
            Ok(Err(error)) => {
                warn!(tx_id = %self.tx_id, "Failed to receive the transaction event ::{}", error);
                match error.code {
                    Some(code) if code.is_conflict() => Err(Error::Conflict {
                        tx_id: self.tx_id.clone(),
                    }),
                    _ => Err(Error::CommitUnconfirmed {
                        tx_id: self.tx_id.clone(),
                        reason: error.to_string(),
                    }),
                }
            }
            Err(_) => {
                warn!(tx_id = %self.tx_id, "Event hub dropped the transaction listener");
                Err(Error::CommitUnconfirmed {
                    tx_id: self.tx_id.clone(),
                    reason: "event hub dropped the registration".to_string(),
                })
            }
        }
    }

    fn judge(&self, event: CommitEvent) -> Result<CommitConfirmation> {
        if event.code.is_valid() {
            debug!(
                tx_id = %self.tx_id,
                block = event.block_number,
                "Successfully received the transaction event"
            );
            return Ok(CommitConfirmation {
                tx_id: event.tx_id,
                block_number: event.block_number,
                received_at: Utc::now(),
            });
        }

        warn!(
            tx_id = %self.tx_id,
            block = event.block_number,
            "Transaction committed with validation code {}", event.code
        );

        if event.code.is_conflict() {
            Err(Error::Conflict {
                tx_id: self.tx_id.clone(),
            })
        } else {
            Err(Error::CommitInvalid {
                tx_id: self.tx_id.clone(),
                code: event.code,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::memory::MemoryEventHub;
    use crate::types::TxValidationCode;

    const WAIT: Duration = Duration::from_millis(1000);

    fn tx_id() -> TransactionId {
        TransactionId::derive(vec![9; 24], b"admin@org1")
    }

    fn event(tx_id: &TransactionId, code: TxValidationCode) -> CommitEvent {
        CommitEvent {
            tx_id: tx_id.to_string(),
            code,
            block_number: 42,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_unregisters_once() {
        let hub = Arc::new(MemoryEventHub::new("mychannel"));
        let monitor = CommitEventMonitor::new(hub.clone(), WAIT);
        let tx_id = tx_id();

        let started = Instant::now();
        let pending = monitor.arm(&tx_id).unwrap();
        assert!(hub.is_registered(tx_id.as_str()));

        let result = pending.wait().await;

        match result {
            Err(Error::CommitUnconfirmed { reason, .. }) => assert_eq!(reason, TIMEOUT_MESSAGE),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(started.elapsed(), WAIT);
        assert_eq!(hub.registrations(), 1);
        assert_eq!(hub.unregistrations(), 1);
        assert!(!hub.is_registered(tx_id.as_str()));

        // A late event finds nobody listening
        assert!(!hub.deliver(event(&tx_id, TxValidationCode::Valid)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_before_deadline_cancels_timer() {
        let hub = Arc::new(MemoryEventHub::new("mychannel"));
        let monitor = CommitEventMonitor::new(hub.clone(), WAIT);
        let tx_id = tx_id();
        let pending = monitor.arm(&tx_id).unwrap();

        let emitter = {
            let hub = hub.clone();
            let tx_id = tx_id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                hub.deliver(event(&tx_id, TxValidationCode::Valid))
            })
        };

        let confirmation = pending.wait().await.unwrap();
        assert!(emitter.await.unwrap());
        assert_eq!(confirmation.tx_id, tx_id.to_string());
        assert_eq!(confirmation.block_number, 42);

        // Run past the original deadline: nothing else fires
        tokio::time::advance(WAIT * 2).await;
        assert_eq!(hub.registrations(), 1);
        assert_eq!(hub.unregistrations(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_error_unregisters() {
        let hub = Arc::new(MemoryEventHub::new("mychannel"));
        let monitor = CommitEventMonitor::new(hub.clone(), WAIT);
        let tx_id = tx_id();
        let pending = monitor.arm(&tx_id).unwrap();

        assert!(hub.fail(tx_id.as_str(), EventError::new("peer event service disconnected")));

        match pending.wait().await {
            Err(Error::CommitUnconfirmed { reason, .. }) => {
                assert!(reason.contains("disconnected"))
            }
            other => panic!("expected unconfirmed, got {:?}", other),
        }
        assert_eq!(hub.unregistrations(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_code_on_error_maps_to_conflict() {
        let hub = Arc::new(MemoryEventHub::new("mychannel"));
        let monitor = CommitEventMonitor::new(hub.clone(), WAIT);
        let tx_id = tx_id();
        let pending = monitor.arm(&tx_id).unwrap();

        hub.fail(
            tx_id.as_str(),
            EventError::new("invalid transaction").with_code(TxValidationCode::MvccReadConflict),
        );

        assert!(matches!(pending.wait().await, Err(Error::Conflict { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_event_codes() {
        let hub = Arc::new(MemoryEventHub::new("mychannel"));
        let monitor = CommitEventMonitor::new(hub.clone(), WAIT);

        let first = tx_id();
        let pending = monitor.arm(&first).unwrap();
        hub.deliver(event(&first, TxValidationCode::MvccReadConflict));
        assert!(matches!(pending.wait().await, Err(Error::Conflict { .. })));

        let second = TransactionId::derive(vec![1; 24], b"admin@org1");
        let pending = monitor.arm(&second).unwrap();
        hub.deliver(event(&second, TxValidationCode::EndorsementPolicyFailure));
        match pending.wait().await {
            Err(Error::CommitInvalid { code, .. }) => {
                assert_eq!(code, TxValidationCode::EndorsementPolicyFailure)
            }
            other => panic!("expected invalid commit, got {:?}", other),
        }

        assert_eq!(hub.registrations(), 2);
        assert_eq!(hub.unregistrations(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_settlement_ignored() {
        let hub = Arc::new(MemoryEventHub::new("mychannel"));
        let monitor = CommitEventMonitor::new(hub.clone(), WAIT);
        let tx_id = tx_id();
        let pending = monitor.arm(&tx_id).unwrap();

        // Event then error for the same registration: the event wins
        hub.deliver(event(&tx_id, TxValidationCode::Valid));
        hub.fail(tx_id.as_str(), EventError::new("too late"));

        assert!(pending.wait().await.is_ok());
        assert_eq!(hub.unregistrations(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_pending_commit_unregisters() {
        let hub = Arc::new(MemoryEventHub::new("mychannel"));
        let monitor = CommitEventMonitor::new(hub.clone(), WAIT);
        let tx_id = tx_id();

        let pending = monitor.arm(&tx_id).unwrap();
        drop(pending);

        assert_eq!(hub.unregistrations(), 1);
        assert!(!hub.is_registered(tx_id.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_registration_rejected() {
        let hub = Arc::new(MemoryEventHub::new("mychannel"));
        let monitor = CommitEventMonitor::new(hub.clone(), WAIT);
        let tx_id = tx_id();

        let _pending = monitor.arm(&tx_id).unwrap();
        assert!(monitor.arm(&tx_id).is_err());
    }
}
