//! The bounded channel between committed writes and the dispatcher.
//!
//! `emit` runs on the committing thread, so it uses `try_send`: when the
//! channel is full the newest event is dropped and counted.

use loom_core::{ChangeEvent, EventSink};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Counters shared by the sink, dispatcher and workers.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub events_received: AtomicU64,
    pub events_dropped: AtomicU64,
    pub tasks_completed: AtomicU64,
    pub tasks_failed: AtomicU64,
    /// Events in the channel plus tasks queued or running.
    pub pending: AtomicUsize,
}

impl Counters {
    pub fn add_pending(&self, n: usize) {
        self.pending.fetch_add(n, Ordering::AcqRel);
    }

    pub fn finish_pending(&self) {
        // Never wraps below zero.
        let _ = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)));
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> EventStats {
        EventStats {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            pending: self.pending(),
        }
    }
}

/// Point-in-time Weaver counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventStats {
    pub events_received: u64,
    pub events_dropped: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub pending: usize,
}

/// Producer half. Register it with the store as its [`EventSink`].
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<ChangeEvent>,
    counters: Arc<Counters>,
}

/// Consumer half, handed to [`crate::Weaver::start`].
#[derive(Debug)]
pub struct EventReceiver {
    pub(crate) rx: mpsc::Receiver<ChangeEvent>,
    pub(crate) counters: Arc<Counters>,
}

/// A bounded event channel holding at most `capacity` undelivered events.
pub fn channel(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let counters = Arc::new(Counters::default());
    let sender = EventSender {
        tx,
        counters: Arc::clone(&counters),
    };
    (sender, EventReceiver { rx, counters })
}

impl EventSender {
    /// Offer `event` to the dispatcher. Returns whether it was accepted.
    pub fn send(&self, event: ChangeEvent) -> bool {
        self.counters.add_pending(1);
        match self.tx.try_send(event) {
            Ok(()) => {
                self.counters.events_received.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(event)) => {
                self.counters.finish_pending();
                let dropped = self.counters.events_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(%event, dropped, "Event queue full, dropping event");
                false
            }
            Err(TrySendError::Closed(event)) => {
                self.counters.finish_pending();
                debug!(%event, "Weaver stopped, discarding event");
                false
            }
        }
    }
}

impl EventSink for EventSender {
    fn emit(&self, event: ChangeEvent) {
        self.send(event);
    }
}
