//! In-memory storage backend.
//!
//! Objects are held in a `tokio::sync::RwLock<HashMap<...>>`.  Nothing is
//! persisted; useful for tests and throwaway deployments.  Object URLs use
//! a `memory://` scheme unless a CDN base URI is configured.

use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use super::backend::{normalize_base_uri, PutOptions, StorageBackend};

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Bytes,
    content_type: String,
    public_read: bool,
}

/// In-memory storage backend.
pub struct MemoryBackend {
    /// storage_key -> object.
    objects: tokio::sync::RwLock<HashMap<String, MemoryObject>>,
    cdn_base_uri: String,
}

impl MemoryBackend {
    /// Create a backend for `container`. Without an explicit
    /// `cdn_base_uri`, URLs take the form `memory://{container}/{name}`.
    pub fn new(container: &str, cdn_base_uri: Option<&str>) -> Self {
        let cdn_base_uri = match cdn_base_uri {
            Some(uri) => normalize_base_uri(uri),
            None => format!("memory://{container}"),
        };
        Self {
            objects: tokio::sync::RwLock::new(HashMap::new()),
            cdn_base_uri,
        }
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Whether the backend holds no objects.
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Whether the object at `storage_key` was written publicly readable.
    pub async fn is_public(&self, storage_key: &str) -> Option<bool> {
        self.objects
            .read()
            .await
            .get(storage_key)
            .map(|o| o.public_read)
    }

    /// Bytes and content type of the object at `storage_key`.
    pub async fn object(&self, storage_key: &str) -> Option<(Bytes, String)> {
        self.objects
            .read()
            .await
            .get(storage_key)
            .map(|o| (o.data.clone(), o.content_type.clone()))
    }
}

impl StorageBackend for MemoryBackend {
    fn put(
        &self,
        storage_key: &str,
        data: Bytes,
        options: PutOptions,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let storage_key = storage_key.to_string();
        Box::pin(async move {
            let object = MemoryObject {
                data,
                content_type: options.content_type,
                public_read: options.public_read,
            };
            self.objects.write().await.insert(storage_key, object);
            Ok(())
        })
    }

    fn cdn_base_uri(&self) -> &str {
        &self.cdn_base_uri
    }
}
