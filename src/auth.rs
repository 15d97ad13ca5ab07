//! API key authentication.
//!
//! Callers present a key in the `Authorization` header in one of two forms:
//!
//! ```text
//! Authorization: <scheme> apikey="<key>"
//! Authorization: Bearer <key>
//! ```
//!
//! The configured admin key authenticates as the administrator; any other
//! key must have been issued through `POST /keys`.

use subtle::ConstantTimeEq;

use crate::errors::ApiError;
use crate::metadata::store::MetadataStore;

/// Name reported for the configured admin key.
pub const ADMIN_NAME: &str = "administrator";

/// Authenticated identity attached to each request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Key holder name, used in logs and error messages.
    pub name: String,
    /// The key the request was made with.
    pub apikey: String,
    pub is_admin: bool,
}

impl Caller {
    /// Reject non-administrators.
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(ApiError::NotAuthorized)
        }
    }
}

// ── Header parsing ──────────────────────────────────────────────────

/// Extract the API key from an `Authorization` header value.
///
/// Returns `None` when the header is not in a recognized form or carries an
/// empty key.
pub fn parse_authorization_header(header: &str) -> Option<&str> {
    let (scheme, rest) = header.trim().split_once(char::is_whitespace)?;
    let rest = rest.trim();

    let key = if scheme.eq_ignore_ascii_case("bearer") {
        rest
    } else {
        let value = rest.strip_prefix("apikey=")?;
        value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value)
    };

    if key.is_empty() || key.contains(char::is_whitespace) {
        None
    } else {
        Some(key)
    }
}

/// Compare two keys in constant time.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

// ── Verification ────────────────────────────────────────────────────

/// Resolve the caller for a request's `Authorization` header.
pub async fn authenticate(
    authorization: Option<&str>,
    admin_apikey: &str,
    metadata: &dyn MetadataStore,
) -> Result<Caller, ApiError> {
    let apikey = authorization
        .and_then(parse_authorization_header)
        .ok_or(ApiError::InvalidCredentials)?;

    if constant_time_eq(apikey, admin_apikey) {
        return Ok(Caller {
            name: ADMIN_NAME.to_string(),
            apikey: apikey.to_string(),
            is_admin: true,
        });
    }

    match metadata.get_api_key(apikey).await? {
        Some(record) => Ok(Caller {
            name: record.name,
            apikey: record.apikey,
            is_admin: false,
        }),
        None => Err(ApiError::InvalidCredentials),
    }
}
