//! Admin API response bodies.

use serde::Serialize;

/// Body of `GET /api/health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Body of `GET /api/state`.
#[derive(Debug, Serialize)]
pub struct StateResponse {
    /// Active processing mode.
    pub mode: String,
    /// Destination pattern gating interception.
    pub destination: String,
    /// Whether a middleware command is configured.
    pub middleware: bool,
    /// Upstream endpoint override, if any.
    pub endpoint: Option<String>,
}

/// Body of `GET /api/records/count`.
#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: u64,
}

/// Body of `DELETE /api/records`.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}
