//! Error taxonomy for the agent invocation core
//!
//! This module defines the closed set of error kinds produced by every
//! external surface of the core (`Adapter`, `StreamReader`, `StreamProcessor`),
//! plus the classifier that maps low-level transport/remote failures onto
//! that taxonomy. User-visible messages are stable and operator-targeted;
//! the raw cause is attached via `#[source]` for logging/telemetry only and
//! is never substituted for the message itself.

use std::fmt;
use thiserror::Error;

/// Closed set of domain error kinds.
///
/// Retryability is fixed per kind and is never decided ad hoc at a call
/// site -- `ErrorKind::default_retryable` is the single source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Remote throttling (e.g. too-many-requests).
    RateLimit,
    /// Remote-side fault. Retryable when it stems from remote unavailability
    /// or a 5xx response; non-retryable for unclassified remote failures.
    ServiceError,
    /// Deadline exceeded on a request or chunk.
    Timeout,
    /// Caller cancellation or unrecoverable transport failure.
    NetworkError,
    /// Credentials/authorization failure.
    Unauthorized,
    /// Validation failure or remote rejection of parameters.
    InvalidInput,
    /// Event from the remote stream that cannot be parsed as a recognized frame.
    MalformedStream,
}

impl ErrorKind {
    /// The fixed retryability for a kind that carries only one possible
    /// classification. `ServiceError` is variable (see `AgentError::service_error`)
    /// and is intentionally excluded here.
    fn default_retryable(self) -> bool {
        match self {
            ErrorKind::RateLimit => true,
            ErrorKind::ServiceError => false,
            ErrorKind::Timeout => true,
            ErrorKind::NetworkError => false,
            ErrorKind::Unauthorized => false,
            ErrorKind::InvalidInput => false,
            ErrorKind::MalformedStream => false,
        }
    }

    /// Short machine-readable tag, used in log lines and test assertions.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::RateLimit => "RATE_LIMIT",
            ErrorKind::ServiceError => "SERVICE_ERROR",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::MalformedStream => "MALFORMED_STREAM",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A domain error drawn from the closed taxonomy.
///
/// Carries an operator-facing `message` (never the raw remote SDK text as
/// the sole message), the fixed `retryable` flag for its `kind`, the
/// `request_id` extracted from the underlying failure when available, and
/// an optional `cause` kept only for logging/telemetry.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AgentError {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
    pub request_id: String,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl AgentError {
    fn build(kind: ErrorKind, message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.default_retryable(),
            request_id: request_id.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn rate_limit(message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::build(ErrorKind::RateLimit, message, request_id)
    }

    /// `retryable` is explicit here: a `ServiceError` from remote
    /// unavailability/5xx is retryable, but an unclassified remote error is not.
    pub fn service_error(
        message: impl Into<String>,
        request_id: impl Into<String>,
        retryable: bool,
    ) -> Self {
        let mut err = Self::build(ErrorKind::ServiceError, message, request_id);
        err.retryable = retryable;
        err
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Timeout, message, "")
    }

    pub fn network_error(message: impl Into<String>) -> Self {
        Self::build(ErrorKind::NetworkError, message, "")
    }

    pub fn unauthorized(message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::build(ErrorKind::Unauthorized, message, request_id)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::build(ErrorKind::InvalidInput, message, "")
    }

    pub fn malformed_stream(message: impl Into<String>) -> Self {
        Self::build(ErrorKind::MalformedStream, message, "")
    }

    /// The cancellation-specific `NetworkError` produced when the ambient
    /// token fires mid-call. Kept as a named constructor since every
    /// component (`Adapter`, `StreamReader`, `StreamProcessor`) needs it.
    pub fn cancelled() -> Self {
        Self::network_error("request cancelled")
    }
}

/// Low-level failure surfaced by a [`crate::remote::RemoteClient`], before
/// classification into the domain taxonomy. Kept separate from
/// [`AgentError`] because the same low-level failure can classify
/// differently depending on context (e.g. a decode failure mid-stream is
/// `MalformedStream`, not `ServiceError`).
#[derive(Debug, Error)]
pub enum LowLevelError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode remote event: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("caller cancelled the request")]
    Cancelled,

    #[error("ambient deadline exceeded")]
    DeadlineExceeded,

    #[error("authorization rejected: {0}")]
    Unauthorized(String),

    #[error("remote throttled the request: {0}")]
    Throttled(String),

    #[error("remote reported a fault: {0}")]
    RemoteFault {
        message: String,
        /// Whether this fault stems from known remote unavailability/5xx
        /// (retryable) vs. an unclassified remote error code (not).
        retryable: bool,
    },

    #[error("remote rejected the request parameters: {0}")]
    InvalidInput(String),

    /// The event parsed as valid JSON but carried no recognizable variant
    /// tag at all -- distinct from `Decode` (a syntax error) and from a
    /// recognized-but-unsupported variant (treated as opaque trace data).
    #[error("remote event carried no recognizable type tag: {0}")]
    MalformedEvent(String),
}

impl LowLevelError {
    /// Best-effort request id extracted from the underlying failure, empty
    /// when the transport never surfaced one.
    pub fn request_id(&self) -> String {
        String::new()
    }
}

/// Classifies a low-level failure into the closed domain taxonomy.
///
/// Caller-cancellation always maps to `NetworkError` (non-retryable);
/// ambient-deadline-exceeded always maps to `Timeout` (retryable); an
/// unknown/unclassified remote error code maps to `ServiceError`,
/// non-retryable.
pub fn classify(err: LowLevelError) -> AgentError {
    let request_id = err.request_id();
    match err {
        LowLevelError::Cancelled => AgentError::cancelled(),
        LowLevelError::DeadlineExceeded => AgentError::timeout("deadline exceeded"),
        LowLevelError::Unauthorized(msg) => AgentError::unauthorized(msg, request_id),
        LowLevelError::Throttled(msg) => AgentError::rate_limit(msg, request_id),
        LowLevelError::RemoteFault { message, retryable } => {
            AgentError::service_error(message, request_id, retryable)
        }
        LowLevelError::InvalidInput(msg) => AgentError::invalid_input(msg),
        LowLevelError::Decode(e) => {
            AgentError::malformed_stream(format!("could not decode remote event: {e}"))
        }
        LowLevelError::MalformedEvent(msg) => AgentError::malformed_stream(msg),
        LowLevelError::Http(e) => classify_reqwest_error(e),
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> AgentError {
    if err.is_timeout() {
        return AgentError::timeout("remote request timed out").with_cause(err);
    }
    if let Some(status) = err.status() {
        let message = format!("remote returned HTTP {status}");
        let classified = match status.as_u16() {
            429 => AgentError::rate_limit(message, ""),
            401 | 403 => AgentError::unauthorized(message, ""),
            400 | 422 => AgentError::invalid_input(message),
            500..=599 => AgentError::service_error(message, "", true),
            _ => AgentError::service_error(message, "", false),
        };
        return classified.with_cause(err);
    }
    AgentError::network_error("transport failure contacting remote service").with_cause(err)
}
