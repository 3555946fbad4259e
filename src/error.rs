//! Error types shared across the crate.

use std::time::Duration;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type ApiResult<T> = Result<T, ApiError>;

/// The single error surface exposed to callers.
///
/// Transport failures are mapped onto [`Permission`](ApiError::Permission),
/// [`NotFound`](ApiError::NotFound) or the generic
/// [`Remote`](ApiError::Remote) variant by status code, so callers branch on
/// the variant rather than re-parsing status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Input rejected before any remote call was made.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The remote service rejected or failed the call.
    #[error("remote call failed with status {status}: {message}")]
    Remote { status: u16, message: String },

    /// The authenticated principal lacks access to the resource.
    #[error("permission denied (status {status}): {message}")]
    Permission { status: u16, message: String },

    /// The addressed resource does not exist.
    #[error("not found (status {status}): {message}")]
    NotFound { status: u16, message: String },

    /// A remote payload could not be interpreted as the expected entity.
    #[error("failed to decode remote payload: {0}")]
    Decode(String),

    /// A task did not complete within its deadline.
    #[error("task timed out after {0:?}")]
    Timeout(Duration),

    /// The task was cancelled before it started.
    #[error("task cancelled")]
    Cancelled,

    /// The bridge shut down before the task could run.
    #[error("execution bridge shut down")]
    Shutdown,

    /// A batch failed; `index` is the position of the failing input item.
    #[error("batch item {index} failed: {source}")]
    Batch {
        index: usize,
        #[source]
        source: Box<ApiError>,
    },

    /// Invariant violation inside the client itself, including task panics.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Builds a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Builds a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Maps a raw remote failure onto the error taxonomy by status code.
    pub fn from_remote(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            403 => Self::Permission { status, message },
            404 => Self::NotFound { status, message },
            _ => Self::Remote { status, message },
        }
    }
}

impl From<RemoteError> for ApiError {
    fn from(err: RemoteError) -> Self {
        Self::from_remote(err.status, err.message)
    }
}

/// Raw failure from the synchronous transport, before taxonomy mapping.
#[derive(Debug, Clone, Error)]
#[error("status {status}: {message}")]
pub struct RemoteError {
    /// HTTP-style status code reported by the service.
    pub status: u16,
    /// Human-readable message from the service error envelope.
    pub message: String,
}

impl RemoteError {
    /// Creates a raw remote error.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Whether this failure indicates an expired credential session.
    ///
    /// Such failures are retried exactly once after a forced credential
    /// refresh; all other failures surface immediately.
    pub fn is_auth_expired(&self) -> bool {
        self.status == 401
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_403_maps_to_permission() {
        let err = ApiError::from_remote(403, "forbidden");
        assert!(matches!(err, ApiError::Permission { status: 403, .. }));
    }

    #[test]
    fn status_404_maps_to_not_found() {
        let err = ApiError::from_remote(404, "no such event");
        assert!(matches!(err, ApiError::NotFound { status: 404, .. }));
    }

    #[test]
    fn other_statuses_map_to_remote() {
        for status in [400, 401, 429, 500, 503] {
            let err = ApiError::from_remote(status, "oops");
            assert!(matches!(err, ApiError::Remote { .. }), "status {status}");
        }
    }

    #[test]
    fn auth_expiry_is_exactly_401() {
        assert!(RemoteError::new(401, "expired").is_auth_expired());
        assert!(!RemoteError::new(403, "forbidden").is_auth_expired());
        assert!(!RemoteError::new(500, "broken").is_auth_expired());
    }

    #[test]
    fn batch_error_carries_index_and_source() {
        let err = ApiError::Batch {
            index: 3,
            source: Box::new(ApiError::from_remote(404, "gone")),
        };
        let text = err.to_string();
        assert!(text.contains("batch item 3"));
        assert!(text.contains("not found"));
    }
}
