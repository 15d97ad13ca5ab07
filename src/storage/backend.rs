//! Abstract storage backend trait.
//!
//! Every asset container backend must implement [`StorageBackend`].  The
//! trait works in terms of whole byte payloads so callers do not need to
//! know the underlying medium.

use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;

/// Write options applied to a published object.
#[derive(Debug, Clone)]
pub struct PutOptions {
    /// MIME content type stored with the object.
    pub content_type: String,
    /// Whether the object is readable by anonymous clients.
    pub public_read: bool,
}

impl PutOptions {
    /// Options for a publicly readable asset of the given type.
    pub fn public(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            public_read: true,
        }
    }
}

/// Async object storage contract.
pub trait StorageBackend: Send + Sync + 'static {
    /// Write `data` to `storage_key` in a single logical write. The object
    /// must not be addressable under `storage_key` unless this returns `Ok`.
    fn put(
        &self,
        storage_key: &str,
        data: Bytes,
        options: PutOptions,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Public, CDN-facing prefix under which objects written by this backend
    /// are reachable. Never ends with `/`.
    fn cdn_base_uri(&self) -> &str;
}

/// Strip trailing slashes from a configured base URI.
pub(crate) fn normalize_base_uri(uri: &str) -> String {
    uri.trim_end_matches('/').to_string()
}
