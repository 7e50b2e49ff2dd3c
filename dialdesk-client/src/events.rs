//! Event types for the headless runner loop.

use crate::traits::InvalidationSink;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleEvent {
    /// A whitelisted push event arrived.
    Invalidated(String),
    Shutdown,
}

/// Forwards push invalidations into the runner's event queue.
///
/// At most one invalidation is queued at a time. Signals arriving while one
/// is pending fold into it; the runner calls [`ChannelSink::acknowledge`]
/// before refetching so later signals queue a fresh one.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<ConsoleEvent>,
    pending: Arc<AtomicBool>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::Sender<ConsoleEvent>) -> Self {
        Self {
            sender,
            pending: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn acknowledge(&self) {
        self.pending.store(false, Ordering::SeqCst);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }
}

impl InvalidationSink for ChannelSink {
    fn invalidate(&self, event_type: &str) {
        if self.pending.swap(true, Ordering::SeqCst) {
            tracing::trace!(event_type, "Invalidation folded into pending refresh");
            return;
        }
        if let Err(e) = self.sender.try_send(ConsoleEvent::Invalidated(event_type.to_string())) {
            self.pending.store(false, Ordering::SeqCst);
            tracing::warn!(event_type, error = %e, "Push invalidation not queued");
        }
    }
}
