//! Publishing fingerprinted assets to the asset container.

use metrics::counter;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::debug;

use super::{FingerprintedAsset, IngestError, PublishedAsset};
use crate::metrics::{ASSETS_PUBLISHED_TOTAL, ASSET_BYTES_PUBLISHED_TOTAL};
use crate::storage::backend::{PutOptions, StorageBackend};

/// Characters left unescaped in a URL path component, matching the
/// `encodeURIComponent` set browsers and CDNs agree on.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Write `asset` to `storage` under its fingerprinted name and return it
/// with its public URL. No retry.
pub async fn publish(
    storage: &dyn StorageBackend,
    asset: FingerprintedAsset,
) -> Result<PublishedAsset, IngestError> {
    let body = asset.to_bytes();
    let size = body.len();

    storage
        .put(
            &asset.fingerprinted_name,
            body,
            PutOptions::public(asset.content_type.clone()),
        )
        .await
        .map_err(|source| IngestError::Publish {
            name: asset.original_name.clone(),
            source,
        })?;

    debug!("Successfully uploaded asset [{}].", asset.fingerprinted_name);
    counter!(ASSETS_PUBLISHED_TOTAL).increment(1);
    counter!(ASSET_BYTES_PUBLISHED_TOTAL).increment(size as u64);

    let public_url = public_url(storage.cdn_base_uri(), &asset.fingerprinted_name);
    Ok(PublishedAsset { asset, public_url })
}

/// `{cdn_base_uri}/{encoded name}`.
pub fn public_url(cdn_base_uri: &str, fingerprinted_name: &str) -> String {
    format!(
        "{}/{}",
        cdn_base_uri.trim_end_matches('/'),
        utf8_percent_encode(fingerprinted_name, URI_COMPONENT)
    )
}
