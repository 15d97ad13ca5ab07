//! assetstamp library: content-addressed asset publishing.
//!
//! Uploaded files are renamed after the SHA-256 of their content, written
//! to a CDN-backed asset container, and optionally bound to a logical key
//! so clients can look up the current URL of, say, `logo`. A small API key
//! facility controls who may upload.

use std::sync::Arc;

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod ingest;
pub mod keys;
pub mod metadata;
pub mod metrics;
pub mod server;
pub mod storage;

use crate::config::Config;
use crate::ingest::AssetIngestor;
use crate::metadata::store::MetadataStore;
use crate::storage::backend::StorageBackend;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Asset names and API keys.
    pub metadata: Arc<dyn MetadataStore>,
    /// Upload pipeline over the asset container and `metadata`.
    pub ingestor: AssetIngestor,
}

impl AppState {
    pub fn new(
        config: Config,
        metadata: Arc<dyn MetadataStore>,
        storage: Arc<dyn StorageBackend>,
    ) -> Self {
        let ingestor = AssetIngestor::new(storage, Arc::clone(&metadata));
        Self {
            config,
            metadata,
            ingestor,
        }
    }
}
