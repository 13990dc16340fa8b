//! Error types for the core engine.

use thiserror::Error;

/// Errors surfaced by the capture store.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The underlying store is closed or the write could not be persisted.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors produced while encoding or decoding stored payloads.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The record was written by a format this build does not understand.
    #[error("unsupported payload format version {0}")]
    UnsupportedVersion(u8),

    /// The record is shorter than its envelope claims.
    #[error("payload truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// The record carries bytes past the end of its envelope.
    #[error("payload has {0} trailing bytes")]
    TrailingBytes(usize),

    /// The payload body failed type checks.
    #[error("payload serialization: {0}")]
    Serialization(#[from] bincode::Error),
}

/// Errors produced by the external middleware process.
#[derive(Debug, Error)]
pub enum MiddlewareError {
    /// The middleware executable could not be started or its pipes failed.
    #[error("failed to run middleware: {0}")]
    Spawn(#[from] std::io::Error),

    /// The middleware exited with a non-zero status.
    #[error("middleware exited with status {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    /// The middleware wrote something other than a JSON payload to stdout.
    #[error("middleware produced invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Core error type.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The upstream service could not be reached.
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(#[source] reqwest::Error),

    /// A response body could not be read to completion.
    #[error("failed to read body: {0}")]
    BodyRead(#[source] reqwest::Error),

    /// Capture store failure.
    #[error(transparent)]
    Store(#[from] CacheError),

    /// Stored payload could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Middleware invocation failure.
    #[error(transparent)]
    Middleware(#[from] MiddlewareError),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A stored payload could not be turned back into an HTTP message.
    #[error("failed to rebuild message: {0}")]
    Reconstruct(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
