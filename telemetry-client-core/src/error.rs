//! Error types for telemetry-client-core

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the telemetry-client-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Snapshot save/load error
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Delivery to the ingestion endpoint failed
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// An async operation was started outside a tokio runtime
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Result type alias for telemetry-client-core
pub type Result<T> = std::result::Result<T, Error>;

/// Failures of the signal snapshot store.
///
/// Write failures surface to whoever asked for the backup. Read failures are
/// routine ("nothing to restore") and are swallowed by the buffer.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// The snapshot could not be written
    #[error("failed to write signal snapshot: {0}")]
    Write(String),

    /// No snapshot exists at the store location
    #[error("no signal snapshot at {}", .0.display())]
    NotFound(PathBuf),

    /// The snapshot exists but could not be read or decoded
    #[error("failed to read signal snapshot: {0}")]
    Read(String),
}

impl PersistenceError {
    /// True for the read-side failures (missing, unreadable, malformed).
    pub fn is_read(&self) -> bool {
        !matches!(self, PersistenceError::Write(_))
    }
}

/// Server-side rejection categories.
///
/// Kept distinct so a future policy can treat permanent rejections
/// differently. Today every kind is requeued the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    Unauthorized,
    Forbidden,
    PayloadTooLarge,
    InvalidStatusCode,
    Unknown,
}

impl RejectionKind {
    /// Classify a non-success HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => RejectionKind::Unauthorized,
            403 => RejectionKind::Forbidden,
            413 => RejectionKind::PayloadTooLarge,
            _ => RejectionKind::InvalidStatusCode,
        }
    }
}

/// Why a batch was not accepted by the ingestion endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// No response at all: connection refused, DNS, timeout
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status
    #[error("{}", describe_rejection(.kind, .status))]
    Rejected {
        kind: RejectionKind,
        status: Option<u16>,
    },
}

impl DeliveryError {
    /// Build a rejection from a non-success HTTP status code
    pub fn from_status(status: u16) -> Self {
        DeliveryError::Rejected {
            kind: RejectionKind::from_status(status),
            status: Some(status),
        }
    }

    /// Rejection kind, if the server responded at all
    pub fn rejection_kind(&self) -> Option<RejectionKind> {
        match self {
            DeliveryError::Transport(_) => None,
            DeliveryError::Rejected { kind, .. } => Some(*kind),
        }
    }
}

fn describe_rejection(kind: &RejectionKind, status: &Option<u16>) -> String {
    match kind {
        RejectionKind::InvalidStatusCode => match status {
            Some(code) => format!("Invalid status code {}", code),
            None => "Invalid status code -1".to_string(),
        },
        RejectionKind::Unauthorized => "Unauthorized (401)".to_string(),
        RejectionKind::Forbidden => "Forbidden (403)".to_string(),
        RejectionKind::PayloadTooLarge => "Payload is too large (413)".to_string(),
        RejectionKind::Unknown => "Unknown Error".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_kind_from_status() {
        assert_eq!(RejectionKind::from_status(401), RejectionKind::Unauthorized);
        assert_eq!(RejectionKind::from_status(403), RejectionKind::Forbidden);
        assert_eq!(
            RejectionKind::from_status(413),
            RejectionKind::PayloadTooLarge
        );
        assert_eq!(
            RejectionKind::from_status(500),
            RejectionKind::InvalidStatusCode
        );
    }

    #[test]
    fn test_delivery_error_messages() {
        assert_eq!(
            DeliveryError::from_status(401).to_string(),
            "Unauthorized (401)"
        );
        assert_eq!(
            DeliveryError::from_status(413).to_string(),
            "Payload is too large (413)"
        );
        assert_eq!(
            DeliveryError::from_status(502).to_string(),
            "Invalid status code 502"
        );
        assert_eq!(
            DeliveryError::Rejected {
                kind: RejectionKind::Unknown,
                status: None
            }
            .to_string(),
            "Unknown Error"
        );
        assert_eq!(
            DeliveryError::Transport("connection refused".to_string()).to_string(),
            "transport error: connection refused"
        );
    }

    #[test]
    fn test_persistence_error_is_read() {
        assert!(!PersistenceError::Write("disk full".to_string()).is_read());
        assert!(PersistenceError::NotFound(PathBuf::from("/tmp/x")).is_read());
        assert!(PersistenceError::Read("bad json".to_string()).is_read());
    }

    #[test]
    fn test_rejection_kind_accessor() {
        assert_eq!(DeliveryError::Transport("x".into()).rejection_kind(), None);
        assert_eq!(
            DeliveryError::from_status(403).rejection_kind(),
            Some(RejectionKind::Forbidden)
        );
    }
}
