//! Persist pending signals when the host is about to exit

use std::sync::{Arc, Mutex, PoisonError};

use crate::buffer::EventBuffer;
use crate::error::PersistenceError;

/// Writes the buffer to its snapshot store once, on termination
#[derive(Debug)]
pub struct ShutdownHandler {
    buffer: Arc<EventBuffer>,
    saved: Mutex<bool>,
}

impl ShutdownHandler {
    pub fn new(buffer: Arc<EventBuffer>) -> Self {
        Self {
            buffer,
            saved: Mutex::new(false),
        }
    }

    /// Back up the buffer
    ///
    /// Returns the number of signals saved. Once a backup has succeeded,
    /// later calls return `Ok(0)` and leave the snapshot alone. A write
    /// failure is logged and returned, the signals stay in memory, and the
    /// next call tries again.
    pub fn on_terminate(&self) -> Result<usize, PersistenceError> {
        // Held across the backup so concurrent calls cannot overwrite a
        // fresh snapshot with an empty one.
        let mut done = self.saved.lock().unwrap_or_else(PoisonError::into_inner);
        if *done {
            tracing::debug!("Terminate already handled");
            return Ok(0);
        }

        match self.buffer.backup_cache() {
            Ok(saved) => {
                *done = true;
                tracing::info!(saved, "Signal cache persisted on terminate");
                Ok(saved)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    pending = self.buffer.count(),
                    "Could not persist signal cache on terminate"
                );
                Err(e)
            }
        }
    }

    /// Whether a terminate backup has succeeded
    pub fn has_saved(&self) -> bool {
        *self.saved.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{hash_user, Signal};
    use crate::snapshot::{MemorySnapshotStore, SnapshotStore};
    use uuid::Uuid;

    fn push_signals(buffer: &EventBuffer, n: usize) {
        buffer.push_all((0..n).map(|i| {
            Signal::new(
                Uuid::nil(),
                hash_user("user"),
                "session",
                format!("s-{}", i),
                Vec::new(),
            )
        }));
    }

    #[test]
    fn test_on_terminate_backs_up_once() {
        let store = Arc::new(MemorySnapshotStore::new());
        let buffer = Arc::new(EventBuffer::new(store.clone(), false));
        push_signals(&buffer, 7);

        let handler = ShutdownHandler::new(buffer.clone());
        assert!(!handler.has_saved());
        assert_eq!(handler.on_terminate().unwrap(), 7);
        assert!(handler.has_saved());
        assert!(buffer.is_empty());
        assert_eq!(store.load().unwrap().len(), 7);

        // Later pushes are not saved by a second notification
        push_signals(&buffer, 2);
        assert_eq!(handler.on_terminate().unwrap(), 0);
        assert_eq!(store.load().unwrap().len(), 7);
    }

    #[test]
    fn test_on_terminate_with_empty_buffer() {
        let store = Arc::new(MemorySnapshotStore::new());
        let handler = ShutdownHandler::new(Arc::new(EventBuffer::new(store.clone(), false)));
        assert_eq!(handler.on_terminate().unwrap(), 0);
        assert!(store.is_present());
    }

    #[test]
    fn test_on_terminate_failure_is_returned() {
        let buffer = Arc::new(EventBuffer::new(
            Arc::new(MemorySnapshotStore::failing()),
            false,
        ));
        push_signals(&buffer, 3);

        let handler = ShutdownHandler::new(buffer.clone());
        assert!(matches!(
            handler.on_terminate(),
            Err(PersistenceError::Write(_))
        ));
        assert_eq!(buffer.count(), 3);
        assert!(!handler.has_saved());
    }

    /// Fails the first `save`, then behaves like a memory store
    struct FlakyStore {
        failures_left: Mutex<usize>,
        inner: MemorySnapshotStore,
    }

    impl SnapshotStore for FlakyStore {
        fn save(&self, signals: &[Signal]) -> Result<(), PersistenceError> {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(PersistenceError::Write("disk full".to_string()));
            }
            self.inner.save(signals)
        }

        fn load(&self) -> Result<Vec<Signal>, PersistenceError> {
            self.inner.load()
        }

        fn delete(&self) -> Result<(), PersistenceError> {
            self.inner.delete()
        }
    }

    #[test]
    fn test_on_terminate_retries_after_failure() {
        let store = Arc::new(FlakyStore {
            failures_left: Mutex::new(1),
            inner: MemorySnapshotStore::new(),
        });
        let buffer = Arc::new(EventBuffer::new(store.clone(), false));
        push_signals(&buffer, 3);

        let handler = ShutdownHandler::new(buffer.clone());
        assert!(handler.on_terminate().is_err());
        assert_eq!(buffer.count(), 3);

        assert_eq!(handler.on_terminate().unwrap(), 3);
        assert!(handler.has_saved());
        assert!(buffer.is_empty());
        assert_eq!(store.inner.load().unwrap().len(), 3);
        assert_eq!(handler.on_terminate().unwrap(), 0);
    }
}
