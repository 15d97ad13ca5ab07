//! Abstract metadata store trait.
//!
//! Any metadata backend must implement [`MetadataStore`].  The trait
//! uses `async_trait`-style methods (manual desugaring with pinned
//! futures) so it can be used with both SQLite and remote stores.

use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

// ── Record types ───────────────────────────────────────────────────

/// The current public URL for a logical asset key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetNameRecord {
    /// Caller-assigned logical key (unique).
    pub key: String,
    /// Public URL of the most recently named asset for this key.
    #[serde(rename = "publicURL")]
    pub public_url: String,
    /// RFC 3339 timestamp of the last upsert.
    #[serde(skip)]
    pub updated_at: String,
}

/// An issued API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyRecord {
    /// Human-readable name of the key holder.
    pub name: String,
    /// The key itself (unique).
    pub apikey: String,
    /// RFC 3339 issue timestamp.
    pub created_at: String,
}

// ── Trait ───────────────────────────────────────────────────────────

/// Async metadata store contract.
pub trait MetadataStore: Send + Sync + 'static {
    // ── Asset names ─────────────────────────────────────────────────

    /// Insert or replace the record for `record.key`. Last write wins.
    fn upsert_asset_name(
        &self,
        record: AssetNameRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Look up the record for a logical key.
    fn get_asset_name(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<AssetNameRecord>>> + Send + '_>>;

    /// Number of logical keys currently bound. Reported at startup so an
    /// operator can see which store the server came up against.
    fn count_asset_names(
        &self,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + '_>>;

    // ── API keys ────────────────────────────────────────────────────

    /// Store a newly issued key. Fails if the key already exists.
    fn insert_api_key(
        &self,
        record: ApiKeyRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Look up an issued key.
    fn get_api_key(
        &self,
        apikey: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ApiKeyRecord>>> + Send + '_>>;

    /// Remove an issued key. Returns whether a record was removed.
    fn delete_api_key(
        &self,
        apikey: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>>;
}

/// Current time as an RFC 3339 string with millisecond precision.
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
