//! API key issue and revocation.

use metrics::counter;
use rand::RngCore;
use tracing::{info, warn};

use crate::auth::Caller;
use crate::errors::ApiError;
use crate::metadata::store::{now_rfc3339, ApiKeyRecord, MetadataStore};
use crate::metrics::{API_KEYS_ISSUED_TOTAL, API_KEYS_REVOKED_TOTAL};

/// Random bytes per key. Keys are hex encoded, so twice this many characters.
pub const KEY_BYTES: usize = 128;

/// Validated input for issuing a key.
#[derive(Debug, garde::Validate)]
pub struct IssueKeyInput {
    /// Name of the key holder.
    #[garde(length(min = 1, max = 256))]
    pub name: String,
}

/// Fresh random key as lowercase hex.
pub fn generate_key() -> String {
    let mut buf = [0u8; KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Issue a new key for `named` and return it.
pub async fn issue(metadata: &dyn MetadataStore, named: Option<&str>) -> Result<String, ApiError> {
    let name = match named.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => {
            warn!("Attempt to issue an API key without a name.");
            return Err(ApiError::MissingParameter {
                message: "You must specify a name for the API key".to_string(),
            });
        }
    };

    let input = IssueKeyInput { name };
    garde::Validate::validate(&input).map_err(|report| ApiError::InvalidArgument {
        message: format!("Invalid API key name: {report}"),
    })?;

    info!("Issuing an API key for [{}]", input.name);

    let apikey = generate_key();
    metadata
        .insert_api_key(ApiKeyRecord {
            name: input.name,
            apikey: apikey.clone(),
            created_at: now_rfc3339(),
        })
        .await?;

    counter!(API_KEYS_ISSUED_TOTAL).increment(1);
    Ok(apikey)
}

/// Revoke `key`. Revoking an unknown key succeeds; revoking the key the
/// caller authenticated with does not.
pub async fn revoke(
    metadata: &dyn MetadataStore,
    caller: &Caller,
    key: &str,
) -> Result<(), ApiError> {
    if caller.apikey == key {
        warn!("({}) Attempt to revoke the caller's own API key.", caller.name);
        return Err(ApiError::InvalidArgument {
            message: "You cannot revoke your own API key.".to_string(),
        });
    }

    info!("({}) Revoking an API key.", caller.name);

    if metadata.delete_api_key(key).await? {
        counter!(API_KEYS_REVOKED_TOTAL).increment(1);
    } else {
        info!("API key to revoke was not on record");
    }
    Ok(())
}
