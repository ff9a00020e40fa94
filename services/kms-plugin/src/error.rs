//! Error taxonomy for key operations.
//!
//! Every failure of the key-operation backend is expressed as one
//! [`KmsError`] variant. The service converts it into a [`tonic::Status`]
//! whose message is the error's `Display` output, unmodified.

use std::time::Duration;

use kms_common::Retryable;
use thiserror::Error;
use tonic::{Code, Status};

/// Failures surfaced by a key-operation backend.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KmsError {
    /// The caller cancelled the request
    #[error("request cancelled")]
    Cancelled,

    /// The request deadline elapsed before the key service answered
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The key service could not be reached or failed server-side
    #[error("key service unavailable: {reason}")]
    Unavailable {
        /// Transport or server failure description
        reason: String,
    },

    /// No usable credential, or the key service rejected it
    #[error("key service authentication failed: {reason}")]
    Unauthenticated {
        /// Description of the authentication failure
        reason: String,
    },

    /// The credential lacks permission for the key operation
    #[error("key service denied access: {reason}")]
    PermissionDenied {
        /// Description returned by the key service
        reason: String,
    },

    /// The key service throttled the request
    #[error("key service throttled the request")]
    Throttled {
        /// Server-suggested wait before retrying
        retry_after: Option<Duration>,
    },

    /// The configured key does not exist
    #[error("key not found: {key}")]
    KeyNotFound {
        /// Key identifier that was not found
        key: String,
    },

    /// The request payload cannot be sent to the key service
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// Why the payload was refused
        reason: String,
    },

    /// The key service rejected the request for another reason
    #[error("key service rejected the request ({status} {code}): {message}")]
    Rejected {
        /// HTTP status returned by the key service
        status: u16,
        /// Service-specific error code
        code: String,
        /// Service-provided message
        message: String,
    },

    /// The key service answered with something that could not be decoded
    #[error("invalid key service response: {reason}")]
    InvalidResponse {
        /// Decoding failure description
        reason: String,
    },

    /// Anything else
    #[error("internal error: {0}")]
    Internal(String),
}

impl KmsError {
    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Create an authentication error.
    #[must_use]
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::Unauthenticated {
            reason: reason.into(),
        }
    }

    /// Create a permission error.
    #[must_use]
    pub fn permission_denied(reason: impl Into<String>) -> Self {
        Self::PermissionDenied {
            reason: reason.into(),
        }
    }

    /// Create a key-not-found error.
    #[must_use]
    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    /// Create an invalid-request error.
    #[must_use]
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Create an invalid-response error.
    #[must_use]
    pub fn invalid_response(reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            reason: reason.into(),
        }
    }

    /// Whether the error originates from the caller's context rather than
    /// the key service.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// gRPC status code used when this error is returned to the host.
    #[must_use]
    pub const fn grpc_code(&self) -> Code {
        match self {
            Self::Cancelled => Code::Cancelled,
            Self::DeadlineExceeded => Code::DeadlineExceeded,
            Self::Unavailable { .. } => Code::Unavailable,
            Self::Unauthenticated { .. } => Code::Unauthenticated,
            Self::PermissionDenied { .. } => Code::PermissionDenied,
            Self::Throttled { .. } => Code::ResourceExhausted,
            Self::KeyNotFound { .. } => Code::NotFound,
            Self::InvalidRequest { .. } => Code::InvalidArgument,
            Self::Rejected { .. } => Code::FailedPrecondition,
            Self::InvalidResponse { .. } | Self::Internal(_) => Code::Internal,
        }
    }
}

impl Retryable for KmsError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Throttled { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Throttled { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<KmsError> for Status {
    fn from(err: KmsError) -> Self {
        Status::new(err.grpc_code(), err.to_string())
    }
}

impl From<reqwest::Error> for KmsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::unavailable("request to key service timed out")
        } else if err.is_connect() {
            Self::unavailable(format!("cannot connect to key service: {err}"))
        } else if err.is_decode() {
            Self::invalid_response(err.to_string())
        } else {
            Self::unavailable(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_carries_error_message_verbatim() {
        let err = KmsError::unavailable("connection reset by peer");
        let status = Status::from(err.clone());
        assert_eq!(status.code(), Code::Unavailable);
        assert_eq!(status.message(), err.to_string());
        assert_eq!(status.message(), "key service unavailable: connection reset by peer");
    }

    #[test]
    fn test_cancellation_classification() {
        assert!(KmsError::Cancelled.is_cancellation());
        assert!(KmsError::DeadlineExceeded.is_cancellation());
        assert!(!KmsError::key_not_found("k").is_cancellation());
        assert!(!KmsError::unavailable("down").is_cancellation());
    }

    #[test]
    fn test_grpc_codes() {
        assert_eq!(KmsError::Cancelled.grpc_code(), Code::Cancelled);
        assert_eq!(KmsError::DeadlineExceeded.grpc_code(), Code::DeadlineExceeded);
        assert_eq!(KmsError::Throttled { retry_after: None }.grpc_code(), Code::ResourceExhausted);
        assert_eq!(KmsError::key_not_found("k").grpc_code(), Code::NotFound);
        assert_eq!(KmsError::unauthenticated("x").grpc_code(), Code::Unauthenticated);
        assert_eq!(KmsError::invalid_request("x").grpc_code(), Code::InvalidArgument);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(KmsError::unavailable("503").is_retryable());
        assert!(KmsError::Throttled { retry_after: None }.is_retryable());
        assert!(!KmsError::Cancelled.is_retryable());
        assert!(!KmsError::DeadlineExceeded.is_retryable());
        assert!(!KmsError::permission_denied("denied").is_retryable());
        assert!(!KmsError::key_not_found("k").is_retryable());
    }

    #[test]
    fn test_retry_after_hint() {
        let err = KmsError::Throttled {
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(KmsError::unavailable("x").retry_after(), None);
    }
}
