//! Persistent snapshot of buffered signals
//!
//! The buffer is written to a single location on shutdown and read back once
//! on the next start. Writes are plain overwrites; a crash mid-write leaves a
//! corrupt file, which the loader reports as a read failure.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::PersistenceError;
use crate::signal::Signal;

/// Storage boundary for the signal snapshot
pub trait SnapshotStore: Send + Sync {
    /// Replace the snapshot with `signals`
    fn save(&self, signals: &[Signal]) -> Result<(), PersistenceError>;

    /// Read the snapshot
    fn load(&self) -> Result<Vec<Signal>, PersistenceError>;

    /// Remove the snapshot. Removing a missing snapshot is not an error.
    fn delete(&self) -> Result<(), PersistenceError>;
}

/// JSON snapshot stored in one file
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the snapshot file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a snapshot is waiting to be restored
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, signals: &[Signal]) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PersistenceError::Write(format!("{}: {}", parent.display(), e))
            })?;
        }

        let data = serde_json::to_vec(signals)
            .map_err(|e| PersistenceError::Write(format!("encode failed: {}", e)))?;

        std::fs::write(&self.path, data)
            .map_err(|e| PersistenceError::Write(format!("{}: {}", self.path.display(), e)))
    }

    fn load(&self) -> Result<Vec<Signal>, PersistenceError> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PersistenceError::NotFound(self.path.clone()));
            }
            Err(e) => {
                return Err(PersistenceError::Read(format!(
                    "{}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        serde_json::from_slice(&data)
            .map_err(|e| PersistenceError::Read(format!("{}: {}", self.path.display(), e)))
    }

    fn delete(&self) -> Result<(), PersistenceError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PersistenceError::Write(format!(
                "failed to delete {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

/// In-memory snapshot, for tests and hosts without writable storage
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    signals: Mutex<Option<Vec<Signal>>>,
    fail_writes: bool,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose `save` always fails
    pub fn failing() -> Self {
        Self {
            signals: Mutex::new(None),
            fail_writes: true,
        }
    }

    /// Whether a snapshot is currently held
    pub fn is_present(&self) -> bool {
        self.signals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, signals: &[Signal]) -> Result<(), PersistenceError> {
        if self.fail_writes {
            return Err(PersistenceError::Write("store is read-only".to_string()));
        }
        *self.signals.lock().unwrap_or_else(|e| e.into_inner()) = Some(signals.to_vec());
        Ok(())
    }

    fn load(&self) -> Result<Vec<Signal>, PersistenceError> {
        self.signals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| PersistenceError::NotFound(PathBuf::from("<memory>")))
    }

    fn delete(&self) -> Result<(), PersistenceError> {
        self.signals.lock().unwrap_or_else(|e| e.into_inner()).take();
        Ok(())
    }
}
