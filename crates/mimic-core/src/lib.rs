//! Mimic Core - capture/replay engine for the mimic proxy.
//!
//! This crate holds everything between the proxy frontend and the embedded
//! store: the canonical request/response model, fingerprinting, the stored
//! payload codec, the external middleware contract, message reconstruction,
//! and the traffic engine that ties the four processing modes together.
//!
//! ## Modules
//!
//! - [`model`] - RequestDetails / RecordedResponse / Payload and header maps
//! - [`fingerprint`] - stable content hash over the five canonical fields
//! - [`codec`] - versioned binary encoding of stored payloads
//! - [`cache`] - the seam the embedded store plugs into
//! - [`middleware`] - JSON-over-stdio contract with external transforms
//! - [`constructor`] - rebuilding HTTP messages from payloads
//! - [`engine`] - per-request dispatch for the four processing modes
//! - [`settings`] - immutable runtime configuration

pub mod cache;
pub mod codec;
pub mod constructor;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod middleware;
pub mod model;
pub mod settings;

pub use cache::Cache;
pub use constructor::Constructor;
pub use engine::{TrafficEngine, TRANSIT_HEADER, TRANSIT_VALUE};
pub use error::{CacheError, CodecError, CoreError, MiddlewareError, Result};
pub use model::{headers_to_map, map_to_headers, HeaderValues, Payload, RecordedResponse, RequestDetails};
pub use settings::{Mode, Settings};
