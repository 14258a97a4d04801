//! Error types for the query cache
//!
//! Provides unified error handling using thiserror.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the query cache.
///
/// Errors only carry strings so they can be cloned onto the failure
/// notification channel.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    /// Caller supplied an invalid argument (empty key, empty entity-set name)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Transport or connection failure, including operation timeouts
    #[error("Backing store unavailable: {0}")]
    Unavailable(String),

    /// Server-side script or command failure
    #[error("Script failure: {0}")]
    Script(String),

    /// Stored entry could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(String),

    /// Lock acquisition exceeded its wait budget
    #[error("Lock unavailable for {resources:?} after {waited:?}")]
    LockUnavailable {
        resources: Vec<String>,
        waited: Duration,
    },

    /// Every attempt of a retried operation failed
    #[error("{operation} failed after {} attempts: {}", .failures.len(), summarize(.failures))]
    RetriesExhausted {
        operation: &'static str,
        failures: Vec<CacheError>,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CacheError {
    /// Returns true for failures worth retrying. Codec errors are
    /// deterministic and fail the same way on every attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, CacheError::Unavailable(_) | CacheError::Script(_))
    }
}

fn summarize(failures: &[CacheError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// == Conversions ==
impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_timeout()
        {
            CacheError::Unavailable(err.to_string())
        } else {
            CacheError::Script(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Codec(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            CacheError::Unavailable(_) | CacheError::RetriesExhausted { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CacheError::LockUnavailable { .. } => StatusCode::LOCKED,
            CacheError::Script(_) | CacheError::Codec(_) | CacheError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the query cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(CacheError::Unavailable("down".into()).is_transient());
        assert!(CacheError::Script("ERR".into()).is_transient());
        assert!(!CacheError::Codec("bad json".into()).is_transient());
        assert!(!CacheError::InvalidArgument("empty".into()).is_transient());
        assert!(!CacheError::LockUnavailable {
            resources: vec!["orders".into()],
            waited: Duration::from_millis(10),
        }
        .is_transient());
    }

    #[test]
    fn test_retries_exhausted_lists_every_failure() {
        let err = CacheError::RetriesExhausted {
            operation: "invalidate_item",
            failures: vec![
                CacheError::Unavailable("first".into()),
                CacheError::Script("second".into()),
            ],
        };

        let message = err.to_string();
        assert!(message.starts_with("invalidate_item failed after 2 attempts"));
        assert!(message.contains("first"));
        assert!(message.contains("second"));
    }

    #[test]
    fn test_status_codes() {
        let response = CacheError::InvalidArgument("x".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = CacheError::Unavailable("x".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = CacheError::LockUnavailable {
            resources: vec![],
            waited: Duration::ZERO,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::LOCKED);
    }
}
