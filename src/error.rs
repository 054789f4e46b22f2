//! Error taxonomy for the dispatch core.
//!
//! Handlers, subscribers and pipeline behaviors all fail with
//! [`HandlerError`]. The dispatchers wrap it with dispatch context
//! ([`DispatchError`]) or aggregate it per event ([`PublishError`]).
//! Registration problems surface as [`RegistryError`] at wiring time.

use std::error::Error;
use std::fmt;

use thiserror::Error;

use crate::message::RequestKind;

/// Boxed error accepted by [`HandlerError::Other`].
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Error type returned by command handlers, query handlers, event
/// subscribers and pipeline behaviors.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Business logic rejected the request (invariant violation, conflict).
    #[error("rejected: {0}")]
    Rejected(String),
    /// Aggregate or resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Input validation failed.
    #[error("validation failed: {0}")]
    Validation(String),
    /// The dispatch was cancelled through its cancellation signal.
    #[error("cancelled")]
    Cancelled,
    /// A subscriber panicked while handling an event.
    #[error("panicked: {0}")]
    Panicked(String),
    /// Other error.
    #[error("handler error: {0}")]
    Other(#[source] BoxError),
}

impl HandlerError {
    /// Wrap any error as [`HandlerError::Other`].
    pub fn other(err: impl Into<BoxError>) -> Self {
        HandlerError::Other(err.into())
    }
}

/// Configuration error raised while registering handlers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A command or query type already has its single handler bound.
    #[error("{kind} {request_type} already has a registered handler")]
    DuplicateHandler {
        kind: RequestKind,
        request_type: &'static str,
    },
}

/// Failure of a command or query dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No handler is bound to the request type.
    #[error("no handler registered for {request_type}")]
    NoHandler { request_type: &'static str },
    /// The bound handler (or a pipeline behavior around it) failed.
    #[error("{request_type} failed: {source}")]
    HandlerExecution {
        request_type: &'static str,
        #[source]
        source: HandlerError,
    },
    /// A behavior short-circuited with a response of the wrong type.
    #[error("pipeline for {request_type} produced a response of the wrong type")]
    UnexpectedResponse { request_type: &'static str },
}

impl DispatchError {
    /// The request type this dispatch was for.
    pub fn request_type(&self) -> &'static str {
        match self {
            DispatchError::NoHandler { request_type }
            | DispatchError::HandlerExecution { request_type, .. }
            | DispatchError::UnexpectedResponse { request_type } => request_type,
        }
    }

    /// The handler's own error, if the handler ran and failed.
    pub fn handler_error(&self) -> Option<&HandlerError> {
        match self {
            DispatchError::HandlerExecution { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// One subscriber's failure while handling an event.
#[derive(Debug)]
pub struct SubscriberFailure {
    /// Name the subscriber was registered under.
    pub subscriber: String,
    pub error: HandlerError,
}

impl fmt::Display for SubscriberFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.subscriber, self.error)
    }
}

/// Aggregated subscriber failures for a single published event.
///
/// Reported after every subscriber has been attempted. Never propagated into
/// the result of the command that recorded the event.
#[derive(Debug, Error)]
#[error("{} subscriber(s) failed handling {event_type}: {}", .failures.len(), summarize(.failures))]
pub struct PublishError {
    pub event_type: String,
    /// Failures in subscriber registration order.
    pub failures: Vec<SubscriberFailure>,
}

impl PublishError {
    /// Names of the subscribers that failed.
    pub fn failed_subscribers(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.subscriber.as_str()).collect()
    }
}

fn summarize(failures: &[SubscriberFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure to encode or decode an event payload.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("failed to encode payload: {0}")]
    Encode(#[source] bitcode::Error),
    #[error("failed to decode payload: {0}")]
    Decode(#[source] bitcode::Error),
}
