//! Embedding facade tying buffer, delivery and shutdown together

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use uuid::Uuid;

use crate::buffer::EventBuffer;
use crate::config::Config;
use crate::delivery::{
    DeliveryScheduler, DeliveryStats, FlushOperation, FlushOutcome, HttpTransport, Transport,
};
use crate::error::{PersistenceError, Result};
use crate::shutdown::ShutdownHandler;
use crate::signal::{encode_payload, hash_user, CommonContext, Payload, Signal};
use crate::snapshot::{FileSnapshotStore, SnapshotStore};

/// Signal type sent when a session starts
pub const NEW_SESSION_SIGNAL: &str = "newSessionBegan";

/// Owns one client instance: session, buffer, scheduler and shutdown hook
///
/// Host lifecycle maps onto `init()`, `start()`, `stop()` and
/// `on_terminate()`. Signals are enqueued with [`TelemetryManager::process_signal`]
/// from any thread.
pub struct TelemetryManager {
    config: Config,
    app_id: Uuid,
    context: CommonContext,
    session_id: RwLock<String>,
    session_announced: AtomicBool,
    buffer: Arc<EventBuffer>,
    flush: Arc<FlushOperation>,
    scheduler: DeliveryScheduler,
    shutdown: ShutdownHandler,
}

impl TelemetryManager {
    /// Build a manager that posts over HTTP and snapshots to the data dir
    ///
    /// Restores the snapshot of a previous run, if any.
    pub fn init(config: Config) -> Result<Self> {
        config.validate()?;
        let transport = Arc::new(HttpTransport::new(&config.client, &config.delivery)?);
        let store = Arc::new(FileSnapshotStore::new(config.snapshot_path()));
        tracing::debug!(
            endpoint = transport.endpoint(),
            snapshot = %store.path().display(),
            "Initializing telemetry manager"
        );
        Self::with_parts(config, transport, store)
    }

    /// Build a manager from explicit transport and snapshot store
    pub fn with_parts(
        config: Config,
        transport: Arc<dyn Transport>,
        store: Arc<dyn SnapshotStore>,
    ) -> Result<Self> {
        let app_id = config.client.app_uuid()?;
        let show_debug_logs = config.client.show_debug_logs;
        let context = CommonContext::detect(config.client.app_version.as_deref());

        let buffer = Arc::new(EventBuffer::new(store, show_debug_logs));
        let flush = Arc::new(FlushOperation::new(
            Arc::clone(&buffer),
            transport,
            show_debug_logs,
        ));
        let scheduler =
            DeliveryScheduler::new(Arc::clone(&flush), config.delivery.flush_interval());
        let shutdown = ShutdownHandler::new(Arc::clone(&buffer));

        Ok(Self {
            config,
            app_id,
            context,
            session_id: RwLock::new(Uuid::new_v4().to_string()),
            session_announced: AtomicBool::new(false),
            buffer,
            flush,
            scheduler,
            shutdown,
        })
    }

    /// Start periodic delivery
    ///
    /// The first start of a session also enqueues a session-start signal
    /// when configured to. Restarting replaces the schedule and sends
    /// nothing extra.
    pub fn start(&self) -> Result<()> {
        if !self.session_announced.swap(true, Ordering::SeqCst) {
            self.announce_session();
        }
        self.scheduler.start()
    }

    fn announce_session(&self) {
        if self.config.client.send_new_session_began_signal {
            self.process_signal(NEW_SESSION_SIGNAL, None, None);
        }
    }

    /// Stop periodic delivery; buffered signals stay in memory
    pub fn stop(&self) {
        self.scheduler.stop();
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Host is terminating: stop delivery and snapshot what is left
    ///
    /// Only the first call writes a snapshot.
    pub fn on_terminate(&self) -> std::result::Result<usize, PersistenceError> {
        self.scheduler.stop();
        self.shutdown.on_terminate()
    }

    /// Like [`TelemetryManager::on_terminate`], but waits for an in-flight
    /// flush first so its outcome is part of the snapshot
    pub async fn shutdown(&self) -> std::result::Result<usize, PersistenceError> {
        self.scheduler.shutdown().await;
        self.shutdown.on_terminate()
    }

    /// Run one flush outside the schedule
    pub async fn flush_now(&self) -> FlushOutcome {
        self.flush.run().await
    }

    /// Flush batch after batch until the buffer is empty or a send fails
    pub async fn flush_all(&self) -> Vec<FlushOutcome> {
        self.flush.drain().await
    }

    /// Build a signal and add it to the buffer
    ///
    /// `client_user` falls back to the configured default user, then to an
    /// identifier derived from the host. The identifier is hashed before it
    /// leaves this function. Returns `false` when the signal was dropped
    /// because this is a debug build and debug sending is disabled.
    pub fn process_signal(
        &self,
        signal_type: &str,
        client_user: Option<&str>,
        additional_payload: Option<&Payload>,
    ) -> bool {
        if self.context.is_debug && !self.config.client.send_signals_in_debug {
            if self.config.client.show_debug_logs {
                tracing::info!(signal_type, "Debug build, signal not sent");
            }
            return false;
        }

        let user = match client_user.or(self.config.client.default_user.as_deref()) {
            Some(user) => user.to_string(),
            None => self.context.fallback_user(),
        };

        let payload = encode_payload(&self.context.merge(additional_payload));
        let signal = Signal::new(
            self.app_id,
            hash_user(&user),
            self.session_id(),
            signal_type,
            payload,
        );

        if self.config.client.show_debug_logs {
            tracing::info!(
                signal_type,
                session_id = %signal.session_id,
                payload = ?signal.payload,
                "Process signal"
            );
        }

        self.buffer.push(signal);
        true
    }

    /// Start a new session and return its identifier
    pub fn new_session(&self) -> String {
        let session_id = Uuid::new_v4().to_string();
        *self
            .session_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = session_id.clone();
        tracing::debug!(session_id = %session_id, "New session");

        self.session_announced.store(true, Ordering::SeqCst);
        self.announce_session();
        session_id
    }

    pub fn session_id(&self) -> String {
        self.session_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Signals waiting for delivery
    pub fn pending_count(&self) -> usize {
        self.buffer.count()
    }

    pub fn stats(&self) -> DeliveryStats {
        self.flush.stats()
    }

    pub fn buffer(&self) -> &Arc<EventBuffer> {
        &self.buffer
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn context(&self) -> &CommonContext {
        &self.context
    }
}

impl std::fmt::Debug for TelemetryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryManager")
            .field("app_id", &self.app_id)
            .field("session_id", &self.session_id())
            .field("pending", &self.pending_count())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
