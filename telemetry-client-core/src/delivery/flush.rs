//! One delivery attempt: take a batch, send it, put it back on failure

use std::sync::{Arc, Mutex, PoisonError};

use crate::buffer::EventBuffer;
use crate::error::DeliveryError;

use super::transport::Transport;

/// Result of a single [`FlushOperation::run`]
#[derive(Debug, Clone, PartialEq)]
pub enum FlushOutcome {
    /// The buffer was empty; nothing was sent
    Idle,
    /// A batch of this many signals was accepted
    Delivered(usize),
    /// Sending failed and the batch went back into the buffer
    Requeued { count: usize, error: DeliveryError },
}

impl FlushOutcome {
    /// Number of signals that left the buffer for good
    pub fn delivered(&self) -> usize {
        match self {
            FlushOutcome::Delivered(n) => *n,
            _ => 0,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, FlushOutcome::Requeued { .. })
    }
}

/// Running totals across flushes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Batches accepted by the endpoint
    pub batches_sent: usize,
    /// Signals accepted by the endpoint
    pub signals_delivered: usize,
    /// Send attempts that failed
    pub failures: usize,
    /// Signals put back after a failed send, counted per attempt
    pub signals_requeued: usize,
}

impl DeliveryStats {
    fn record(&mut self, outcome: &FlushOutcome) {
        match outcome {
            FlushOutcome::Idle => {}
            FlushOutcome::Delivered(n) => {
                self.batches_sent += 1;
                self.signals_delivered += n;
            }
            FlushOutcome::Requeued { count, .. } => {
                self.failures += 1;
                self.signals_requeued += count;
            }
        }
    }
}

/// Moves one batch from the buffer to the transport
pub struct FlushOperation {
    buffer: Arc<EventBuffer>,
    transport: Arc<dyn Transport>,
    show_debug_logs: bool,
    stats: Mutex<DeliveryStats>,
}

impl FlushOperation {
    pub fn new(
        buffer: Arc<EventBuffer>,
        transport: Arc<dyn Transport>,
        show_debug_logs: bool,
    ) -> Self {
        Self {
            buffer,
            transport,
            show_debug_logs,
            stats: Mutex::new(DeliveryStats::default()),
        }
    }

    /// Pop one batch and send it
    ///
    /// An empty buffer makes no call to the transport. Any failure puts the
    /// whole batch back; it is retried on a later run.
    pub async fn run(&self) -> FlushOutcome {
        if self.show_debug_logs {
            tracing::info!(count = self.buffer.count(), "Current signal cache count");
        }

        let batch = self.buffer.pop();
        if batch.is_empty() {
            return FlushOutcome::Idle;
        }

        if self.show_debug_logs {
            tracing::info!(
                sending = batch.len(),
                remaining = self.buffer.count(),
                "Sending {} signals leaving a cache of {} signals",
                batch.len(),
                self.buffer.count()
            );
        }

        let count = batch.len();
        let outcome = match self.transport.send(&batch).await {
            Ok(()) => {
                tracing::debug!(count, "Batch delivered");
                FlushOutcome::Delivered(count)
            }
            Err(error) => {
                tracing::warn!(error = %error, count, "Failed to send signals, requeueing");
                self.buffer.push_all(batch);
                FlushOutcome::Requeued { count, error }
            }
        };

        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(&outcome);
        outcome
    }

    /// Run until the buffer is empty or a send fails
    pub async fn drain(&self) -> Vec<FlushOutcome> {
        let mut outcomes = Vec::new();
        loop {
            let outcome = self.run().await;
            let done = !matches!(outcome, FlushOutcome::Delivered(_));
            outcomes.push(outcome);
            if done {
                return outcomes;
            }
        }
    }

    pub fn stats(&self) -> DeliveryStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn buffer(&self) -> &Arc<EventBuffer> {
        &self.buffer
    }
}

impl std::fmt::Debug for FlushOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushOperation")
            .field("buffer", &self.buffer)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::testing::ScriptedTransport;
    use crate::error::RejectionKind;
    use crate::signal::{hash_user, Signal};
    use crate::snapshot::MemorySnapshotStore;
    use std::collections::HashSet;
    use uuid::Uuid;

    fn make_signals(n: usize) -> Vec<Signal> {
        (0..n)
            .map(|i| {
                Signal::new(
                    Uuid::nil(),
                    hash_user("user"),
                    "session",
                    format!("s-{}", i),
                    Vec::new(),
                )
            })
            .collect()
    }

    fn setup(
        script: Vec<Result<(), DeliveryError>>,
    ) -> (Arc<EventBuffer>, Arc<ScriptedTransport>, FlushOperation) {
        let buffer = Arc::new(EventBuffer::new(Arc::new(MemorySnapshotStore::new()), true));
        let transport = Arc::new(ScriptedTransport::new(script));
        let flush = FlushOperation::new(buffer.clone(), transport.clone(), true);
        (buffer, transport, flush)
    }

    #[tokio::test]
    async fn test_empty_buffer_makes_no_call() {
        let (_, transport, flush) = setup(Vec::new());
        assert_eq!(flush.run().await, FlushOutcome::Idle);
        assert_eq!(transport.call_count(), 0);
        assert_eq!(flush.stats(), DeliveryStats::default());
    }

    #[tokio::test]
    async fn test_success_empties_batch() {
        let (buffer, transport, flush) = setup(vec![Ok(())]);
        buffer.push_all(make_signals(3));

        assert_eq!(flush.run().await, FlushOutcome::Delivered(3));
        assert!(buffer.is_empty());
        assert_eq!(transport.delivered().len(), 1);
        assert_eq!(transport.delivered()[0].len(), 3);
        assert_eq!(flush.stats().signals_delivered, 3);
    }

    #[tokio::test]
    async fn test_rejection_requeues_batch() {
        let error = DeliveryError::from_status(401);
        let (buffer, transport, flush) = setup(vec![Err(error.clone())]);
        let signals = make_signals(5);
        buffer.push_all(signals.clone());

        let outcome = flush.run().await;
        assert_eq!(outcome, FlushOutcome::Requeued { count: 5, error });
        assert!(outcome.is_failure());
        assert_eq!(transport.call_count(), 1);

        let requeued: HashSet<_> = buffer.pop().into_iter().map(|s| s.signal_type).collect();
        let original: HashSet<_> = signals.into_iter().map(|s| s.signal_type).collect();
        assert_eq!(requeued, original);
    }

    #[tokio::test]
    async fn test_every_failure_kind_requeues() {
        let errors = vec![
            DeliveryError::Transport("timed out".to_string()),
            DeliveryError::from_status(403),
            DeliveryError::from_status(413),
            DeliveryError::from_status(500),
            DeliveryError::Rejected {
                kind: RejectionKind::Unknown,
                status: None,
            },
        ];
        let (buffer, _, flush) = setup(errors.iter().cloned().map(Err).collect());
        buffer.push_all(make_signals(2));

        for _ in &errors {
            assert!(flush.run().await.is_failure());
            assert_eq!(buffer.count(), 2);
        }

        assert_eq!(flush.run().await, FlushOutcome::Delivered(2));
        let stats = flush.stats();
        assert_eq!(stats.failures, errors.len());
        assert_eq!(stats.signals_requeued, 2 * errors.len());
        assert_eq!(stats.batches_sent, 1);
    }

    #[tokio::test]
    async fn test_run_sends_at_most_one_batch() {
        let (buffer, transport, flush) = setup(Vec::new());
        buffer.push_all(make_signals(150));

        assert_eq!(flush.run().await, FlushOutcome::Delivered(100));
        assert_eq!(buffer.count(), 50);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_drain_stops_at_empty() {
        let (buffer, transport, flush) = setup(Vec::new());
        buffer.push_all(make_signals(250));

        let outcomes = flush.drain().await;
        assert_eq!(
            outcomes,
            vec![
                FlushOutcome::Delivered(100),
                FlushOutcome::Delivered(100),
                FlushOutcome::Delivered(50),
                FlushOutcome::Idle,
            ]
        );
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_drain_stops_at_failure() {
        let (buffer, _, flush) = setup(vec![Ok(()), Err(DeliveryError::from_status(500))]);
        buffer.push_all(make_signals(150));

        let outcomes = flush.drain().await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[1].is_failure());
        assert_eq!(buffer.count(), 50);
    }
}
