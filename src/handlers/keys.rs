//! API key handlers. Both routes are admin-only.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::auth::Caller;
use crate::errors::ApiError;
use crate::keys;
use crate::AppState;

/// `POST /keys?named=<name>` -- issue a key.
#[utoipa::path(
    post,
    path = "/keys",
    tag = "Keys",
    operation_id = "IssueApiKey",
    params(("named" = String, Query, description = "Name of the key holder")),
    responses(
        (status = 200, description = "The new key, as {\"apikey\": ...}"),
        (status = 403, description = "Caller is not an administrator"),
        (status = 409, description = "No name given")
    )
)]
pub async fn issue_key(
    state: Arc<AppState>,
    caller: &Caller,
    query: &HashMap<String, String>,
) -> Result<Response, ApiError> {
    caller.require_admin()?;

    let apikey = keys::issue(
        state.metadata.as_ref(),
        query.get("named").map(String::as_str),
    )
    .await?;

    Ok((StatusCode::OK, Json(json!({ "apikey": apikey }))).into_response())
}

/// `DELETE /keys/{key}` -- revoke a key.
#[utoipa::path(
    delete,
    path = "/keys/{key}",
    tag = "Keys",
    operation_id = "RevokeApiKey",
    params(("key" = String, Path, description = "Key to revoke")),
    responses(
        (status = 204, description = "Key revoked"),
        (status = 403, description = "Caller is not an administrator"),
        (status = 409, description = "Attempt to revoke the caller's own key")
    )
)]
pub async fn revoke_key(
    state: Arc<AppState>,
    caller: &Caller,
    key: &str,
) -> Result<Response, ApiError> {
    caller.require_admin()?;
    keys::revoke(state.metadata.as_ref(), caller, key).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
