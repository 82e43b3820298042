//! Batch delivery to the ingestion endpoint
//!
//! ## Architecture
//!
//! ```text
//! DeliveryScheduler ──tick──→ FlushOperation ──pop──→ EventBuffer
//!                                   │   ↑
//!                              send │   │ push_all (on any failure)
//!                                   ↓   │
//!                                 Transport
//! ```
//!
//! Delivery is at-least-once: a batch is either accepted as a whole or put
//! back into the buffer as a whole, and retried on the next tick. There is no
//! per-signal retry counter and no backoff beyond the tick interval.

mod flush;
mod http;
mod scheduler;
mod transport;

pub use flush::{DeliveryStats, FlushOperation, FlushOutcome};
pub use http::HttpTransport;
pub use scheduler::{DeliveryScheduler, MINIMUM_WAIT_TIME_BETWEEN_REQUESTS};
pub use transport::Transport;

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::Transport;
    use crate::error::DeliveryError;
    use crate::signal::Signal;

    /// Transport that replays scripted outcomes and records every batch
    ///
    /// Once the script runs out every send succeeds.
    #[derive(Default)]
    pub struct ScriptedTransport {
        script: Mutex<VecDeque<Result<(), DeliveryError>>>,
        calls: Mutex<Vec<(Vec<Signal>, bool)>>,
    }

    impl ScriptedTransport {
        pub fn new(script: Vec<Result<(), DeliveryError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        /// Batches the transport accepted
        pub fn delivered(&self) -> Vec<Vec<Signal>> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, ok)| *ok)
                .map(|(batch, _)| batch.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, batch: &[Signal]) -> Result<(), DeliveryError> {
            let outcome = self.script.lock().unwrap().pop_front().unwrap_or(Ok(()));
            self.calls
                .lock()
                .unwrap()
                .push((batch.to_vec(), outcome.is_ok()));
            outcome
        }
    }
}
