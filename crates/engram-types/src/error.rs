//! Shared error taxonomy for the Engram client.
//!
//! Each variant maps to a distinct caller recovery strategy: a
//! [`EngramError::Unsupported`] operation means "switch transport", a
//! [`EngramError::Remote`] failure means "surface to the operator", and a
//! [`EngramError::Validation`] failure means "fix the input". Transports must
//! never blur these together.

use thiserror::Error;

/// Top-level error type for the Engram client access layer.
#[derive(Debug, Error)]
pub enum EngramError {
    /// The transport could not reach the remote service, or an established
    /// connection went away mid-call.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The active transport does not implement this operation. Raised before
    /// any network I/O is attempted.
    #[error("Operation '{operation}' is not supported by the {transport} transport")]
    Unsupported {
        /// Which transport refused the operation.
        transport: &'static str,
        /// The contract operation that was requested.
        operation: &'static str,
    },

    /// Invalid input: missing run scope, wrong address width, connect misuse.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The remote service answered with a non-success status.
    #[error("Remote error {code}: {message}")]
    Remote {
        /// Status code reported by the service (wire error code or HTTP status).
        code: i32,
        /// Human-readable diagnostic from the service.
        message: String,
    },

    /// An I/O error below the wire protocol.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame or body failed to encode/decode.
    #[error("Codec error: {0}")]
    Codec(String),
}

impl EngramError {
    /// Shorthand for an [`EngramError::Unsupported`] result.
    pub fn unsupported<T>(transport: &'static str, operation: &'static str) -> EngramResult<T> {
        Err(EngramError::Unsupported {
            transport,
            operation,
        })
    }
}

impl From<serde_json::Error> for EngramError {
    fn from(e: serde_json::Error) -> Self {
        EngramError::Codec(e.to_string())
    }
}

/// Alias for Result with [`EngramError`].
pub type EngramResult<T> = Result<T, EngramError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_display_names_transport_and_operation() {
        let err: EngramResult<()> = EngramError::unsupported("text", "subscribe");
        let msg = err.unwrap_err().to_string();
        assert!(msg.contains("subscribe"));
        assert!(msg.contains("text"));
    }

    #[test]
    fn test_remote_display_carries_code() {
        let err = EngramError::Remote {
            code: 503,
            message: "index rebuilding".to_string(),
        };
        assert_eq!(err.to_string(), "Remote error 503: index rebuilding");
    }

    #[test]
    fn test_variants_are_distinguishable() {
        // Callers branch on the variant to pick a recovery strategy.
        let errors = [
            EngramError::Connection("refused".into()),
            EngramError::Validation("missing run scope".into()),
            EngramError::Remote {
                code: 500,
                message: "boom".into(),
            },
        ];
        assert!(matches!(errors[0], EngramError::Connection(_)));
        assert!(matches!(errors[1], EngramError::Validation(_)));
        assert!(matches!(errors[2], EngramError::Remote { .. }));
    }
}
