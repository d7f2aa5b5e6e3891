//! # Error Handling Module
//!
//! Error taxonomy for the resolution engine. These are the errors that can
//! arise from registry lookups, pipeline dispatch, plugin execution, and
//! streaming strategies. The HTTP-facing crate (`playdar-daemon`) wraps
//! these in its own error type and maps them to status codes.

use thiserror::Error;

/// Errors raised by the resolution engine (registry, pipeline, plugins).
#[derive(Error, Debug)]
pub enum ResolverError {
    /// A qid or sid was not found, or has been evicted.
    #[error("not found: {0}")]
    NotFound(String),

    /// An explicit qid was supplied to `dispatch` but is already live.
    #[error("query already exists: {0}")]
    AlreadyExists(String),

    /// A caller-supplied query or item failed validation.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A plugin panicked or returned an error while resolving.
    #[error("plugin error in {plugin}: {message}")]
    PluginError { plugin: String, message: String },

    /// A streaming strategy failed.
    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Errors raised while pulling bytes from a [`crate::streaming::StreamingStrategy`].
///
/// Connection failure, unexpected EOF, and cancellation are all surfaced
/// through this single type with a `kind` tag — bytes already delivered to
/// the consumer before the error remain valid; the consumer decides whether
/// to truncate or propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorKind {
    Connect,
    Truncated,
    Cancelled,
    Io,
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream error ({:?}): {}", self.kind, self.message)
    }
}

/// A streaming failure with a classification tag and a human-readable message.
#[derive(Debug, Clone)]
pub struct StreamError {
    pub kind: StreamErrorKind,
    pub message: String,
}

impl StreamError {
    pub fn new(kind: StreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(StreamErrorKind::Connect, message)
    }

    pub fn truncated(message: impl Into<String>) -> Self {
        Self::new(StreamErrorKind::Truncated, message)
    }

    pub fn cancelled() -> Self {
        Self::new(StreamErrorKind::Cancelled, "stream cancelled")
    }

    pub fn io(err: impl std::fmt::Display) -> Self {
        Self::new(StreamErrorKind::Io, err.to_string())
    }
}

impl std::error::Error for StreamError {}
