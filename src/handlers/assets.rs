//! Asset upload and lookup handlers.

use axum::extract::multipart::Field;
use axum::extract::Multipart;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::{NamedTempFile, TempPath};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, Instrument};

use crate::auth::Caller;
use crate::errors::ApiError;
use crate::ingest::UploadedFile;
use crate::AppState;

/// Content type recorded when a part does not declare one.
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// `POST /assets` -- fingerprint, publish and optionally name every file
/// part in a `multipart/form-data` body. Each part's field name is its
/// logical key.
#[utoipa::path(
    post,
    path = "/assets",
    tag = "Assets",
    operation_id = "UploadAssets",
    params(
        ("named" = Option<String>, Query, description = "Bind each part name to its new URL unless false, 0, no or off")
    ),
    responses(
        (status = 200, description = "Map of original file names to public URLs"),
        (status = 400, description = "Malformed multipart body"),
        (status = 401, description = "Missing or unknown API key"),
        (status = 500, description = "One or more assets failed")
    )
)]
pub async fn upload_assets(
    state: Arc<AppState>,
    caller: &Caller,
    query: &HashMap<String, String>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let should_name = named_flag(query);

    // Spool files live until the batch is done; dropping the guards deletes them.
    let mut spooled: Vec<TempPath> = Vec::new();
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidContent {
            message: format!("Unable to read multipart body: {e}"),
        })?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            debug!("Skipping non-file multipart field {:?}", field.name());
            continue;
        };
        let key = field.name().unwrap_or(file_name.as_str()).to_string();
        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let path = spool_field(field, state.config.server.spool_dir.as_deref()).await?;
        files.push(UploadedFile::from_path(
            file_name,
            key,
            content_type,
            path.to_path_buf(),
        ));
        spooled.push(path);
    }

    info!("({}) Accepting {} asset(s).", caller.name, files.len());

    let span = tracing::info_span!("ingest", caller = %caller.name);
    let summary = state
        .ingestor
        .ingest(files, should_name)
        .instrument(span)
        .await
        .map_err(|e| {
            error!("({}) Unable to process an asset: {}", caller.name, e);
            ApiError::UploadFailed {
                caller: caller.name.clone(),
            }
        })?;

    debug!(
        "({}) All assets have been processed successfully: {:?}",
        caller.name, summary
    );

    Ok(Json(summary).into_response())
}

/// `GET /assets/{key}` -- current public URL for a logical key.
#[utoipa::path(
    get,
    path = "/assets/{key}",
    tag = "Assets",
    operation_id = "GetAssetName",
    params(("key" = String, Path, description = "Logical asset key")),
    responses(
        (status = 200, description = "Key and its public URL"),
        (status = 404, description = "No asset has been named with this key")
    )
)]
pub async fn get_asset(state: Arc<AppState>, key: &str) -> Result<Response, ApiError> {
    match state.metadata.get_asset_name(key).await? {
        Some(record) => Ok(Json(record).into_response()),
        None => Err(ApiError::ResourceNotFound {
            message: format!("No asset is named [{key}]"),
        }),
    }
}

/// Whether `?named` asks for naming. Present with any value other than an
/// explicit false means yes.
fn named_flag(query: &HashMap<String, String>) -> bool {
    match query.get("named") {
        None => false,
        Some(value) => !matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "false" | "0" | "no" | "off"
        ),
    }
}

/// Stream one multipart part into a temp file.
async fn spool_field(mut field: Field<'_>, spool_dir: Option<&str>) -> Result<TempPath, ApiError> {
    let tmp = match spool_dir {
        Some(dir) => NamedTempFile::new_in(dir),
        None => NamedTempFile::new(),
    }
    .map_err(|e| anyhow::anyhow!("failed to create spool file: {e}"))?;

    let (file, path) = tmp.into_parts();
    let mut file = tokio::fs::File::from_std(file);

    while let Some(chunk) = field.chunk().await.map_err(|e| ApiError::InvalidContent {
        message: format!("Unable to read multipart body: {e}"),
    })? {
        file.write_all(&chunk)
            .await
            .map_err(|e| anyhow::anyhow!("failed to spool upload: {e}"))?;
    }
    file.flush()
        .await
        .map_err(|e| anyhow::anyhow!("failed to spool upload: {e}"))?;

    Ok(path)
}
