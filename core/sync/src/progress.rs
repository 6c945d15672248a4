//! Progress reporting for sync runs.
//!
//! Page workers never touch the observable state directly. They send
//! [`ProgressEvent`]s over a channel to a single updater task, which is the
//! only writer of the [`ProgressSink`]. Observers read snapshots or
//! subscribe for changes.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::warn;

/// Observable progress of one domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncProgress {
    /// Items processed so far in the current run.
    pub current: u64,
    /// Items the remote reported for the current run.
    pub total: u64,
    /// Whether a run is in progress.
    pub busy: bool,
}

impl SyncProgress {
    /// Completion ratio in `[0, 1]`, or `None` while the total is unknown.
    pub fn fraction(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some((self.current.min(self.total)) as f64 / self.total as f64)
    }
}

/// Messages from a run to its updater task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A run began: mark busy, clear the counter.
    Started,
    /// The probe reported the item total.
    Total(u64),
    /// More items were stored.
    Processed(u64),
    /// The run ended, successfully or not: reset to idle.
    Finished,
}

/// Observable progress state for one domain.
#[derive(Clone)]
pub struct ProgressSink {
    tx: Arc<watch::Sender<SyncProgress>>,
}

impl ProgressSink {
    /// Create an idle sink.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SyncProgress::default());
        Self { tx: Arc::new(tx) }
    }

    /// Current state.
    pub fn snapshot(&self) -> SyncProgress {
        *self.tx.borrow()
    }

    /// Receiver notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<SyncProgress> {
        self.tx.subscribe()
    }

    /// Apply `event` and return the state it replaced.
    fn apply(&self, event: ProgressEvent) -> SyncProgress {
        let mut previous = SyncProgress::default();
        self.tx.send_modify(|state| {
            previous = *state;
            match event {
                ProgressEvent::Started => {
                    state.busy = true;
                    state.current = 0;
                }
                ProgressEvent::Total(total) => {
                    state.total = total;
                }
                ProgressEvent::Processed(n) => {
                    state.current = state.current.saturating_add(n);
                }
                ProgressEvent::Finished => {
                    *state = SyncProgress::default();
                }
            }
        });
        previous
    }
}

impl Default for ProgressSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Sending half handed to page workers.
#[derive(Clone)]
pub struct ProgressReporter {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressReporter {
    pub fn total(&self, total: u64) {
        self.send(ProgressEvent::Total(total));
    }

    pub fn processed(&self, n: u64) {
        if n > 0 {
            self.send(ProgressEvent::Processed(n));
        }
    }

    fn send(&self, event: ProgressEvent) {
        // The updater only stops after `Finished`.
        if self.tx.send(event).is_err() {
            warn!("Progress updater gone, dropped {:?}", event);
        }
    }
}

/// Handle to the updater task of one run.
pub struct ProgressUpdater {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    handle: JoinHandle<SyncProgress>,
}

impl ProgressUpdater {
    /// Spawn the updater task for `sink` and mark the run as started.
    pub fn start(sink: &ProgressSink) -> (ProgressReporter, ProgressUpdater) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = sink.clone();

        let handle = tokio::spawn(async move {
            let mut last = SyncProgress::default();
            while let Some(event) = rx.recv().await {
                let previous = sink.apply(event);
                if event == ProgressEvent::Finished {
                    last = previous;
                    break;
                }
            }
            last
        });

        let reporter = ProgressReporter { tx: tx.clone() };
        reporter.send(ProgressEvent::Started);
        (reporter, ProgressUpdater { tx, handle })
    }

    /// Reset the sink to idle and wait until every queued event is applied.
    ///
    /// Returns the state observers saw last, just before the reset.
    pub async fn finish(self) -> SyncProgress {
        if self.tx.send(ProgressEvent::Finished).is_err() {
            warn!("Progress updater exited early");
        }
        match self.handle.await {
            Ok(last) => last,
            Err(e) => {
                warn!("Progress updater failed: {}", e);
                SyncProgress::default()
            }
        }
    }
}
