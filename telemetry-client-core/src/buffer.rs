//! In-memory buffer of signals waiting for delivery
//!
//! There is no guarantee that signals come out in the order they went in.
//! That is fine: every signal carries `receivedAt`, so the server can reorder.
//!
//! The buffer is backed up to a [`SnapshotStore`] on shutdown and restored on
//! construction, so signals survive an app restart.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::PersistenceError;
use crate::signal::Signal;
use crate::snapshot::SnapshotStore;

/// Maximum number of signals handed out by a single [`EventBuffer::pop`]
pub const MAX_BATCH_SIZE: usize = 100;

/// Thread-safe container of pending signals
///
/// Every mutation goes through one mutex, so concurrent `push`, `pop` and
/// `backup_cache` calls never duplicate or lose a signal.
pub struct EventBuffer {
    signals: Mutex<VecDeque<Signal>>,
    store: Arc<dyn SnapshotStore>,
    show_debug_logs: bool,
}

impl EventBuffer {
    /// Create a buffer, restoring any snapshot left by a previous run
    ///
    /// A restored snapshot is deleted right away so it cannot be loaded twice.
    /// A missing or unreadable snapshot yields an empty buffer.
    pub fn new(store: Arc<dyn SnapshotStore>, show_debug_logs: bool) -> Self {
        let signals = match store.load() {
            Ok(signals) => {
                if let Err(e) = store.delete() {
                    tracing::warn!(error = %e, "Failed to delete restored signal snapshot");
                }
                if show_debug_logs {
                    tracing::info!(count = signals.len(), "Loaded signals from snapshot");
                }
                VecDeque::from(signals)
            }
            Err(PersistenceError::NotFound(path)) => {
                tracing::debug!(path = %path.display(), "No signal snapshot to restore");
                VecDeque::new()
            }
            Err(e) => {
                // Unreadable snapshots would fail again next time; drop them.
                tracing::warn!(error = %e, "Discarding unreadable signal snapshot");
                if let Err(e) = store.delete() {
                    tracing::warn!(error = %e, "Failed to delete unreadable signal snapshot");
                }
                VecDeque::new()
            }
        };

        Self {
            signals: Mutex::new(signals),
            store,
            show_debug_logs,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Signal>> {
        self.signals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a signal
    pub fn push(&self, signal: Signal) {
        self.lock().push_back(signal);
    }

    /// Insert a number of signals, e.g. a batch that failed to send
    pub fn push_all(&self, signals: impl IntoIterator<Item = Signal>) {
        self.lock().extend(signals);
    }

    /// How many signals are buffered
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Whether the buffer holds no signals
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove up to [`MAX_BATCH_SIZE`] signals and return them
    ///
    /// Hold on to the returned signals. If sending them fails, give them back
    /// with [`EventBuffer::push_all`].
    pub fn pop(&self) -> Vec<Signal> {
        let mut signals = self.lock();
        let batch_size = std::cmp::min(MAX_BATCH_SIZE, signals.len());
        signals.drain(..batch_size).collect()
    }

    /// Save the entire buffer to the snapshot store, then clear it
    ///
    /// The lock is held across the write so no signal pushed meanwhile can be
    /// cleared without having been saved. On failure the buffer is untouched.
    /// Returns the number of signals saved.
    ///
    /// This is a blocking call: the store's I/O runs under the buffer lock and
    /// every `push` waits for it. Call it at shutdown, not from an async task
    /// on a hot path (wrap it in `spawn_blocking` if you must).
    pub fn backup_cache(&self) -> Result<usize, PersistenceError> {
        let mut signals = self.lock();
        let snapshot: Vec<Signal> = signals.iter().cloned().collect();

        if let Err(e) = self.store.save(&snapshot) {
            tracing::error!(error = %e, count = snapshot.len(), "Error while saving signal cache");
            return Err(e);
        }

        if self.show_debug_logs {
            tracing::info!(count = snapshot.len(), "Saved signal cache");
        }

        // Clear after saving, otherwise these signals would be merged with the
        // restored snapshot on the next construction.
        signals.clear();
        Ok(snapshot.len())
    }
}

impl std::fmt::Debug for EventBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBuffer")
            .field("count", &self.count())
            .field("show_debug_logs", &self.show_debug_logs)
            .finish()
    }
}
