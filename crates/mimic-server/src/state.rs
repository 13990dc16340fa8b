//! Shared application state for admin handlers.

use std::sync::Arc;

use mimic_core::{Cache, Settings};

/// State threaded through every admin route.
#[derive(Clone)]
pub struct AppState {
    /// The capture store behind the proxy.
    pub cache: Arc<dyn Cache>,
    /// Runtime settings (read-only).
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Creates admin state around the shared store and settings.
    pub fn new(cache: Arc<dyn Cache>, settings: Arc<Settings>) -> Self {
        Self { cache, settings }
    }
}
