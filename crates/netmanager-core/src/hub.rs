//! Fan-out of human-readable progress messages to live-log subscribers.
//!
//! Backed by a bounded `tokio::sync::broadcast` ring.  Overflow policy is
//! drop-oldest per subscriber: a subscriber that falls more than `capacity`
//! messages behind skips the ones it missed and carries on.  Publishing never
//! waits on any subscriber and past messages are not replayed to late
//! subscribers.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone, Debug)]
pub struct LogHub {
    tx: broadcast::Sender<Arc<str>>,
}

impl Default for LogHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LogHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Send `msg` to every current subscriber.
    pub fn publish(&self, msg: impl Into<String>) {
        let msg: Arc<str> = Arc::from(msg.into());
        info!("{msg}");
        // No subscribers is normal (nobody has the UI open).
        let _ = self.tx.send(msg);
    }

    pub fn subscribe(&self) -> LogSubscription {
        LogSubscription { rx: self.tx.subscribe() }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

pub struct LogSubscription {
    rx: broadcast::Receiver<Arc<str>>,
}

impl LogSubscription {
    /// Next message, skipping over anything lost to overflow.
    ///
    /// Returns `None` once every [`LogHub`] handle has been dropped.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        loop {
            match self.rx.recv().await {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "log subscriber fell behind; dropped oldest messages");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next message if one is already queued.
    pub fn try_recv(&mut self) -> Option<Arc<str>> {
        loop {
            match self.rx.try_recv() {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "log subscriber fell behind; dropped oldest messages");
                }
                Err(_) => return None,
            }
        }
    }
}
