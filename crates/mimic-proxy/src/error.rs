//! Error types for the proxy frontend.

use thiserror::Error;

/// Proxy error type.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// CA certificate error.
    #[error("CA error: {0}")]
    Ca(#[from] CaManagerError),

    /// Engine error.
    #[error("engine error: {0}")]
    Core(#[from] mimic_core::CoreError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Proxy server error.
    #[error("proxy error: {0}")]
    Proxy(String),
}

/// CA manager error type.
#[derive(Debug, Error)]
pub enum CaManagerError {
    /// Failed to generate CA certificate.
    #[error("failed to generate CA: {0}")]
    Generation(String),

    /// Failed to read CA certificate.
    #[error("failed to read CA: {0}")]
    Read(#[from] std::io::Error),

    /// Failed to parse CA certificate.
    #[error("failed to parse CA: {0}")]
    Parse(String),

    /// Failed to write CA certificate.
    #[error("failed to write CA: {0}")]
    Write(String),
}

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;
