use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_core::{AccountId, TransactionId};
use tokio::sync::broadcast;

/// Every checkpoint of an account was replaced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RebuiltEvent {
    pub account: AccountId,
    pub checkpoints: usize,
}

/// Cached sums were recomputed for the checkpoint(s) containing a date.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefreshedEvent {
    pub account: AccountId,
    pub at: DateTime<Utc>,
    pub rows: usize,
}

/// Cached sums were recomputed for every checkpoint a transaction falls into.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionRefreshedEvent {
    pub transaction: TransactionId,
    pub rows: usize,
}

/// Change notification fired after a checkpoint unit of work commits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum CheckpointEvent {
    Rebuilt(RebuiltEvent),
    Refreshed(RefreshedEvent),
    TransactionRefreshed(TransactionRefreshedEvent),
}

impl CheckpointEvent {
    /// Account whose cached balances became stale, when known.
    pub fn account(&self) -> Option<AccountId> {
        match self {
            CheckpointEvent::Rebuilt(event) => Some(event.account),
            CheckpointEvent::Refreshed(event) => Some(event.account),
            CheckpointEvent::TransactionRefreshed(_) => None,
        }
    }
}

pub struct CheckpointBus {
    sender: broadcast::Sender<CheckpointEvent>,
}

impl CheckpointBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> CheckpointStream {
        CheckpointStream {
            receiver: self.sender.subscribe(),
        }
    }

    /// Fire-and-forget; events are dropped when nobody listens.
    pub fn publish(&self, event: CheckpointEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for CheckpointBus {
    fn default() -> Self {
        Self::new(256)
    }
}

pub struct CheckpointStream {
    receiver: broadcast::Receiver<CheckpointEvent>,
}

impl CheckpointStream {
    /// Next pending event without blocking, skipping over lagged gaps.
    pub fn try_next(&mut self) -> Option<CheckpointEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Drain every pending event.
    pub fn drain(&mut self) -> Vec<CheckpointEvent> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}
