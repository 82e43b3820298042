//! # telemetry-client-core
//!
//! Core library for telemetry-client - a buffering client for an analytics
//! signal ingestion service.
//!
//! This library provides:
//! - The signal record and its common payload context
//! - A thread-safe in-memory buffer with a persistent snapshot
//! - Periodic batch delivery with at-least-once retry
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Signals move through three stages:
//! - **Buffered:** held in memory by [`EventBuffer`] after `process_signal`
//! - **In flight:** a batch of at most 100 popped by a flush and handed to the
//!   [`Transport`]; on any failure it goes back into the buffer
//! - **Snapshotted:** written to disk on terminate, restored on the next start
//!
//! ## Example
//!
//! ```rust,no_run
//! use telemetry_client_core::{Config, TelemetryManager};
//!
//! # async fn run() -> telemetry_client_core::Result<()> {
//! let config = Config::load()?;
//! let manager = TelemetryManager::init(config)?;
//! manager.start()?;
//!
//! manager.process_signal("appLaunched", None, None);
//!
//! // Before the host exits
//! manager.shutdown().await?;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use buffer::{EventBuffer, MAX_BATCH_SIZE};
pub use config::Config;
pub use delivery::{
    DeliveryScheduler, DeliveryStats, FlushOperation, FlushOutcome, HttpTransport, Transport,
    MINIMUM_WAIT_TIME_BETWEEN_REQUESTS,
};
pub use error::{DeliveryError, Error, PersistenceError, RejectionKind, Result};
pub use manager::{TelemetryManager, NEW_SESSION_SIGNAL};
pub use shutdown::ShutdownHandler;
pub use signal::{CommonContext, Payload, Signal};
pub use snapshot::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};

// Public modules
pub mod buffer;
pub mod config;
pub mod delivery;
pub mod error;
pub mod logging;
pub mod manager;
pub mod shutdown;
pub mod signal;
pub mod snapshot;
