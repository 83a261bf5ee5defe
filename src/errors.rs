// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for resource store operations
//!
//! The core returns structured error values only. Mapping them onto HTTP
//! status codes is the job of [`crate::boundary`].

use thiserror::Error;

use crate::event_store::StoreError;
use crate::query::QueryError;
use crate::state_machine::TransitionError;

/// Coarse classification used by callers to decide on retries and status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed payload, token or command; never retried
    Client,
    /// Expected sequence number did not match the durable one
    ConcurrencyConflict,
    /// A subscribed command or event handler failed
    Handler,
    /// Persistence layer failure; retryable
    Storage,
    /// Identity could not be established
    Unauthorized,
    /// Identity established but the policy denied the action
    Forbidden,
    /// The request context was cancelled
    Cancelled,
    /// Invalid process configuration
    Configuration,
}

/// Errors that can occur in the resource store core
#[derive(Debug, Error)]
pub enum CoreError {
    /// Body could not be parsed against the expected shape
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// A concurrency token was present but not of the form `<id>.<seq>`
    #[error("Malformed concurrency token: {0}")]
    MalformedToken(String),

    /// Command could not be resolved or is missing required metadata
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Resource already exists and the caller asked for a strict create
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Resource does not exist on the write side
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Concurrency token does not match the durable sequence number
    #[error("Precondition failed for {resource_id}: expected sequence {expected}, found {actual}")]
    PreconditionFailed {
        resource_id: String,
        expected: u64,
        actual: u64,
    },

    /// A command or event handler failed
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// Persistence layer error
    #[error("Storage error: {0}")]
    Storage(StoreError),

    /// Invalid list query
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Write-path state machine rejected a step
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Identity validation failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Policy enforcer denied the action
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Request context cancelled before completion
    #[error("Request cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidPayload(_)
            | CoreError::MalformedToken(_)
            | CoreError::InvalidCommand(_)
            | CoreError::AlreadyExists(_)
            | CoreError::NotFound(_)
            | CoreError::Query(_)
            | CoreError::Transition(_)
            | CoreError::Serialization(_) => ErrorKind::Client,
            CoreError::PreconditionFailed { .. } => ErrorKind::ConcurrencyConflict,
            CoreError::Handler(HandlerError::Cancelled { .. }) => ErrorKind::Cancelled,
            CoreError::Handler(_) => ErrorKind::Handler,
            CoreError::Storage(_) => ErrorKind::Storage,
            CoreError::Unauthorized(_) => ErrorKind::Unauthorized,
            CoreError::Forbidden(_) => ErrorKind::Forbidden,
            CoreError::Cancelled => ErrorKind::Cancelled,
            CoreError::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Storage)
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SequenceConflict {
                resource_id,
                expected,
                actual,
            } => CoreError::PreconditionFailed {
                resource_id,
                expected,
                actual,
            },
            other => CoreError::Storage(other),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

/// Result type for resource store operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Failure of a single handler invocation during a fan-out
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// Handler returned an error
    #[error("Handler {handler} failed: {message}")]
    Failed { handler: String, message: String },

    /// Handler panicked; the panic was contained to its own task
    #[error("Handler {handler} panicked: {message}")]
    Panicked { handler: String, message: String },

    /// Handler observed cancellation of the request context
    #[error("Handler {handler} cancelled")]
    Cancelled { handler: String },
}

impl HandlerError {
    /// Build a failure for the named handler
    pub fn failed(handler: impl Into<String>, message: impl Into<String>) -> Self {
        HandlerError::Failed {
            handler: handler.into(),
            message: message.into(),
        }
    }

    /// Name of the handler that produced this error
    pub fn handler(&self) -> &str {
        match self {
            HandlerError::Failed { handler, .. }
            | HandlerError::Panicked { handler, .. }
            | HandlerError::Cancelled { handler } => handler,
        }
    }
}

/// Result type returned by command and event handlers
pub type HandlerResult<T> = Result<T, HandlerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_conflict_maps_to_precondition_failed() {
        let err: CoreError = StoreError::SequenceConflict {
            resource_id: "/blogs/1".to_string(),
            expected: 2,
            actual: 3,
        }
        .into();

        assert_eq!(err.kind(), ErrorKind::ConcurrencyConflict);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_storage_errors_are_retryable() {
        let err: CoreError = StoreError::Unavailable("connection reset".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_handler_error_reports_handler_name() {
        let err = HandlerError::failed("projection", "boom");
        assert_eq!(err.handler(), "projection");
        assert_eq!(err.to_string(), "Handler projection failed: boom");

        let cancelled: CoreError = HandlerError::Cancelled {
            handler: "slow".to_string(),
        }
        .into();
        assert_eq!(cancelled.kind(), ErrorKind::Cancelled);
    }
}
