//! Listener error handling
//!
//! Errors raised by the multilang bridge and the delivery pipeline.
//!
//! Only `Io`, `Parse` and `Core` end the input loop. A `ProtocolViolation` is
//! logged and the offending action rejected; `Callback` failures are logged
//! and never block the acknowledgment that follows them.

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

use crate::protocol::Action;

/// Result type for listener operations
pub type Result<T> = std::result::Result<T, ListenerError>;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A line from the daemon could not be decoded as an action message.
    #[error("Malformed action message: {0}")]
    Parse(String),

    /// The daemon broke the handshake, e.g. a second processRecords before
    /// the first was acknowledged.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("{action} callback failed: {message}")]
    Callback { action: Action, message: String },

    /// The consumer side of the delivery pipeline is gone.
    #[error("Delivery pipeline closed")]
    PipelineClosed,

    #[error("Bridge is already associated with a delivery pipeline")]
    AlreadyAssociated,

    #[error("Bridge is not associated with a delivery pipeline")]
    NotAssociated,

    #[error("Bridge input loop is already running")]
    AlreadyRunning,

    #[error("Record decode error: {0}")]
    Core(#[from] kinetic_core::Error),

    #[error("Listener task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<serde_json::Error> for ListenerError {
    fn from(e: serde_json::Error) -> Self {
        ListenerError::Parse(e.to_string())
    }
}

impl From<LinesCodecError> for ListenerError {
    fn from(e: LinesCodecError) -> Self {
        match e {
            LinesCodecError::MaxLineLengthExceeded => {
                ListenerError::Parse("line exceeds maximum length".to_string())
            }
            LinesCodecError::Io(e) => ListenerError::Io(e),
        }
    }
}

impl ListenerError {
    /// True for errors after which the input loop cannot continue.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ListenerError::Io(_) | ListenerError::Parse(_) | ListenerError::Core(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ListenerError = json_err.into();
        assert!(matches!(err, ListenerError::Parse(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_line_too_long_is_parse_error() {
        let err: ListenerError = LinesCodecError::MaxLineLengthExceeded.into();
        assert!(matches!(err, ListenerError::Parse(_)));
    }

    #[test]
    fn test_callback_display() {
        let err = ListenerError::Callback {
            action: Action::Checkpoint,
            message: "disk full".to_string(),
        };
        assert_eq!(err.to_string(), "checkpoint callback failed: disk full");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_violation_not_fatal() {
        let err = ListenerError::ProtocolViolation("ack pending".to_string());
        assert!(!err.is_fatal());
    }
}
