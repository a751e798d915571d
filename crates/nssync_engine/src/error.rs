//! Error types for the sync engine.

use nssync_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Http {
        /// Status code returned by the server.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// The response body was not the expected JSON shape.
    #[error("malformed response: {0}")]
    Decode(String),

    /// A request body could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),

    /// The override cache backend failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The override cache content could not be interpreted.
    #[error("override cache error: {0}")]
    Cache(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    ///
    /// Connection failures and 5xx responses are transient; 4xx responses
    /// and malformed bodies are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Errors raised while assembling configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A required environment variable is unset or empty.
    #[error("Required environment variable {0} is not set.")]
    MissingVar(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection refused").is_retryable());
        assert!(!SyncError::transport_fatal("invalid URL").is_retryable());
        assert!(SyncError::Http {
            status: 502,
            url: "https://ns.example.com".into()
        }
        .is_retryable());
        assert!(!SyncError::Http {
            status: 401,
            url: "https://ns.example.com".into()
        }
        .is_retryable());
        assert!(!SyncError::Decode("expected array".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::Http {
            status: 404,
            url: "https://ns.example.com/api/v1/entries.json".into(),
        };
        assert_eq!(
            err.to_string(),
            "HTTP 404 from https://ns.example.com/api/v1/entries.json"
        );

        let err = ConfigError::MissingVar("SOURCE_NIGHTSCOUT_URL".into());
        assert_eq!(
            err.to_string(),
            "Required environment variable SOURCE_NIGHTSCOUT_URL is not set."
        );
    }
}
