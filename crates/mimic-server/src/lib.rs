//! Mimic Server - admin HTTP surface.
//!
//! A small out-of-band API for inspecting a running proxy.
//!
//! ## Endpoints
//!
//! - `GET /api/health` - liveness probe
//! - `GET /api/state` - active mode and configuration summary
//! - `GET /api/records/count` - number of captured exchanges
//! - `DELETE /api/records` - wipe the capture store

pub mod error;
mod handlers;
pub mod models;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{delete, get};
use axum::Router;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use mimic_core::{Cache, Settings};

pub use error::{ApiError, Result};
pub use state::AppState;

/// Default admin port.
pub const DEFAULT_ADMIN_PORT: u16 = 8888;

/// Default admin host (localhost only).
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Admin server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1).
    pub host: String,
    /// Port to bind to (default: 8888).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_ADMIN_PORT,
        }
    }
}

impl ServerConfig {
    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Admin server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    Bind(SocketAddr, std::io::Error),

    /// Server runtime error.
    #[error("server error: {0}")]
    Runtime(String),
}

/// The admin HTTP server.
pub struct Server {
    router: Router,
    addr: SocketAddr,
}

impl Server {
    /// Creates a server over the shared store and settings.
    pub fn new(
        config: ServerConfig,
        cache: Arc<dyn Cache>,
        settings: Arc<Settings>,
    ) -> std::result::Result<Self, ServerError> {
        let state = AppState::new(cache, settings);

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let router = router(state).layer(cors);

        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| ServerError::Runtime(format!("invalid address: {e}")))?;

        Ok(Self { router, addr })
    }

    /// Returns the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs the server until shutdown.
    pub async fn run(self) -> std::result::Result<(), ServerError> {
        info!("Starting admin server on {}", self.addr);

        // SO_REUSEADDR lets a restart grab the port while old sockets linger.
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| ServerError::Bind(self.addr, e))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| ServerError::Bind(self.addr, e))?;
        socket
            .bind(&self.addr.into())
            .map_err(|e| ServerError::Bind(self.addr, e))?;
        socket
            .listen(128)
            .map_err(|e| ServerError::Bind(self.addr, e))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| ServerError::Bind(self.addr, e))?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = tokio::net::TcpListener::from_std(std_listener)
            .map_err(|e| ServerError::Bind(self.addr, e))?;

        axum::serve(listener, self.router)
            .await
            .map_err(|e| ServerError::Runtime(e.to_string()))?;

        Ok(())
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/state", get(handlers::get_state))
        .route("/api/records/count", get(handlers::count_records))
        .route("/api/records", delete(handlers::delete_records))
        .with_state(state)
}
