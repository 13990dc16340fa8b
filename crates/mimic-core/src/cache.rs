//! Capture store seam.
//!
//! The engine treats keys and values as opaque bytes; the concrete embedded
//! store lives in its own crate and plugs in through this trait. A missing
//! key is `Ok(None)`, not an error; only a closed or failing store raises
//! [`CacheError`].

use crate::error::CacheError;

/// Keyed byte-blob store with atomic single-key upserts.
///
/// Implementations are shared across concurrent request tasks and must be
/// safe to call from any of them. Writes are last-writer-wins.
pub trait Cache: Send + Sync {
    /// Upserts a value under a key.
    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), CacheError>;

    /// Fetches the value stored under a key, if any.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CacheError>;

    /// Returns the number of stored records.
    fn len(&self) -> Result<u64, CacheError>;

    /// Removes every stored record.
    fn clear(&self) -> Result<(), CacheError>;
}
