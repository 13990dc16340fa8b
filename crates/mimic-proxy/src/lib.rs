//! Mimic Proxy - the HTTP(S) interception frontend.
//!
//! This crate puts the traffic engine on the wire:
//!
//! - Generates a root CA on first run and signs per-domain certificates
//! - Decrypts CONNECT tunnels to destinations matching the configured
//!   pattern; everything else is tunneled transparently byte-for-byte
//! - Hijacks plaintext tunnels into a raw message relay
//! - Buffers every intercepted request and hands it to the engine
//! - Rewrites direct (non-proxied) requests to the configured endpoint
//!
//! ## Architecture
//!
//! ```text
//! Client ── CONNECT ──► destination match? ── no ──► transparent tunnel
//!                            │ yes
//!                ┌───────────┴───────────┐
//!                │ port 443              │ other port
//!                ▼                       ▼
//!            TLS MITM               hijack relay
//!                │
//!                ▼
//!         buffered request ──► traffic engine ──► response to client
//! ```

mod ca;
mod error;
mod handler;
mod proxy;
mod relay;

pub use ca::{CaManager, CaManagerError};
pub use error::{ProxyError, Result};
pub use handler::ProxyHandler;
pub use proxy::{ProxyConfig, ProxyHandle, ProxyServer};
pub use relay::relay;

/// Default proxy port.
pub const DEFAULT_PROXY_PORT: u16 = 8500;
