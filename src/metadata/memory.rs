//! In-memory metadata store.
//!
//! Stores all metadata in memory with no persistence. Useful for testing
//! and ephemeral deployments. Uses `RwLock<HashMap>` for thread-safe access.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

use super::store::{ApiKeyRecord, AssetNameRecord, MetadataStore};

#[derive(Debug, Default)]
struct Inner {
    asset_names: HashMap<String, AssetNameRecord>,
    api_keys: HashMap<String, ApiKeyRecord>,
}

pub struct MemoryMetadataStore {
    inner: RwLock<Inner>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for MemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn upsert_asset_name(
        &self,
        record: AssetNameRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.inner.write().expect("rwlock poisoned");
            inner.asset_names.insert(record.key.clone(), record);
            Ok(())
        })
    }

    fn get_asset_name(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<AssetNameRecord>>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let inner = self.inner.read().expect("rwlock poisoned");
            Ok(inner.asset_names.get(&key).cloned())
        })
    }

    fn count_asset_names(
        &self,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + '_>> {
        Box::pin(async move {
            let inner = self.inner.read().expect("rwlock poisoned");
            Ok(inner.asset_names.len() as u64)
        })
    }

    fn insert_api_key(
        &self,
        record: ApiKeyRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.inner.write().expect("rwlock poisoned");
            if inner.api_keys.contains_key(&record.apikey) {
                anyhow::bail!("API key already exists");
            }
            inner.api_keys.insert(record.apikey.clone(), record);
            Ok(())
        })
    }

    fn get_api_key(
        &self,
        apikey: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ApiKeyRecord>>> + Send + '_>> {
        let apikey = apikey.to_string();
        Box::pin(async move {
            let inner = self.inner.read().expect("rwlock poisoned");
            Ok(inner.api_keys.get(&apikey).cloned())
        })
    }

    fn delete_api_key(
        &self,
        apikey: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        let apikey = apikey.to_string();
        Box::pin(async move {
            let mut inner = self.inner.write().expect("rwlock poisoned");
            Ok(inner.api_keys.remove(&apikey).is_some())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(key: &str, url: &str) -> AssetNameRecord {
        AssetNameRecord {
            key: key.into(),
            public_url: url.into(),
            updated_at: String::new(),
        }
    }

    #[tokio::test]
    async fn test_upsert_last_write_wins() {
        let store = MemoryMetadataStore::new();
        store.upsert_asset_name(name("css", "u1")).await.unwrap();
        store.upsert_asset_name(name("css", "u2")).await.unwrap();
        assert_eq!(store.count_asset_names().await.unwrap(), 1);
        assert_eq!(
            store.get_asset_name("css").await.unwrap().unwrap().public_url,
            "u2"
        );
    }

    #[tokio::test]
    async fn test_api_key_lifecycle() {
        let store = MemoryMetadataStore::new();
        let record = ApiKeyRecord {
            name: "someone".into(),
            apikey: "abc".into(),
            created_at: String::new(),
        };
        store.insert_api_key(record.clone()).await.unwrap();
        assert!(store.insert_api_key(record).await.is_err());
        assert_eq!(
            store.get_api_key("abc").await.unwrap().unwrap().name,
            "someone"
        );
        assert!(store.delete_api_key("abc").await.unwrap());
        assert!(!store.delete_api_key("abc").await.unwrap());
    }
}
