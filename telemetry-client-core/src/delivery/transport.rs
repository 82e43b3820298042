use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::signal::Signal;

/// Sends one batch of signals and reports whether it was accepted.
///
/// Implementations own their timeouts. The caller never holds the buffer
/// lock while a send is in progress.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, batch: &[Signal]) -> Result<(), DeliveryError>;
}
