//! Binding logical asset keys to published URLs.

use metrics::counter;
use tracing::debug;

use super::{IngestError, PublishedAsset};
use crate::metadata::store::{now_rfc3339, AssetNameRecord, MetadataStore};
use crate::metrics::ASSETS_NAMED_TOTAL;

/// Upsert the `key -> public_url` record for a published asset.
pub async fn name(metadata: &dyn MetadataStore, published: &PublishedAsset) -> Result<(), IngestError> {
    debug!(
        "Naming asset [{}] as [{}].",
        published.asset.original_name, published.asset.key
    );

    let record = AssetNameRecord {
        key: published.asset.key.clone(),
        public_url: published.public_url.clone(),
        updated_at: now_rfc3339(),
    };

    metadata
        .upsert_asset_name(record)
        .await
        .map_err(|source| IngestError::Name {
            key: published.asset.key.clone(),
            source,
        })?;

    counter!(ASSETS_NAMED_TOTAL).increment(1);
    Ok(())
}
