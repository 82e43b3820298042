//! Periodic driver for [`FlushOperation`]

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

use super::flush::FlushOperation;

/// Default pause between two flushes
pub const MINIMUM_WAIT_TIME_BETWEEN_REQUESTS: Duration = Duration::from_secs(10);

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Runs one flush right away and then one per interval until stopped
///
/// Restartable: `start()` on a running scheduler replaces the schedule.
pub struct DeliveryScheduler {
    flush: Arc<FlushOperation>,
    interval: Duration,
    running: Mutex<Option<Running>>,
}

impl DeliveryScheduler {
    pub fn new(flush: Arc<FlushOperation>, interval: Duration) -> Self {
        Self {
            flush,
            interval: interval.max(Duration::from_secs(1)),
            running: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn lock(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the schedule
    ///
    /// Cancels any schedule already running. A flush that is in flight at
    /// that moment still runs to completion. Must be called from within a
    /// tokio runtime.
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Runtime(format!("scheduler needs a tokio runtime: {}", e)))?;

        let mut running = self.lock();
        if let Some(previous) = running.take() {
            previous.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        let handle = runtime.spawn(delivery_loop(
            Arc::clone(&self.flush),
            self.interval,
            cancel.clone(),
        ));
        *running = Some(Running { cancel, handle });

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Delivery scheduler started"
        );
        Ok(())
    }

    /// Cancel future ticks
    ///
    /// Returns immediately; a flush already in progress may finish afterwards.
    pub fn stop(&self) {
        if let Some(running) = self.lock().take() {
            running.cancel.cancel();
            tracing::info!("Delivery scheduler stopped");
        }
    }

    /// Cancel future ticks and wait for an in-flight flush to finish
    pub async fn shutdown(&self) {
        let running = self.lock().take();
        if let Some(Running { cancel, handle }) = running {
            cancel.cancel();
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Delivery task ended abnormally");
            }
            tracing::info!("Delivery scheduler shut down");
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|running| !running.cancel.is_cancelled())
    }
}

impl Drop for DeliveryScheduler {
    fn drop(&mut self) {
        if let Some(running) = self
            .running
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            running.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for DeliveryScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryScheduler")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

async fn delivery_loop(flush: Arc<FlushOperation>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    // The first tick completes immediately, which gives the flush on start.
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                flush.run().await;
            }
        }
    }

    tracing::debug!("Delivery loop exited");
}
