//! Mimic Storage - embedded persistence for captured exchanges.
//!
//! A thin rusqlite layer exposing exactly the contract the engine consumes:
//! opaque keys, opaque values, atomic upserts. One file on disk, one bucket
//! inside it, opened at process start and released at exit.

mod error;
mod schema;
mod store;

pub use error::{Result, StorageError};
pub use store::CaptureStore;
