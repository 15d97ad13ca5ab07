//! Metadata storage layer.
//!
//! The metadata store keeps the logical-key-to-URL mapping for named
//! assets and the set of issued API keys.  The [`store::MetadataStore`]
//! trait defines the interface; [`sqlite::SqliteMetadataStore`] is the
//! default implementation.

pub mod memory;
pub mod sqlite;
pub mod store;

use std::sync::Arc;

use tracing::info;

use crate::config::MetadataConfig;
use store::MetadataStore;

/// Build the metadata store selected by `config.engine`.
pub fn from_config(config: &MetadataConfig) -> anyhow::Result<Arc<dyn MetadataStore>> {
    match config.engine.as_str() {
        "memory" => {
            info!("In-memory metadata store initialized");
            Ok(Arc::new(memory::MemoryMetadataStore::new()))
        }
        "sqlite" => {
            let path = &config.sqlite.path;
            if let Some(parent) = std::path::Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            let store = sqlite::SqliteMetadataStore::new(path)?;
            info!("SQLite metadata store initialized at {}", path);
            Ok(Arc::new(store))
        }
        other => anyhow::bail!("Unknown metadata engine: {other}"),
    }
}
