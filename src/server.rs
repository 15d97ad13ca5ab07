//! Axum router construction and route mapping.
//!
//! The [`app`] function wires every endpoint to its handler and returns a
//! ready-to-serve [`axum::Router`]. Every route except `/health`,
//! `/metrics` and `/openapi.json` requires an API key; the auth middleware
//! resolves it to a [`Caller`] that handlers read from request extensions.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, RawQuery, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::debug;
use utoipa::OpenApi;

use crate::auth::{self, Caller};
use crate::errors::{generate_request_id, ApiError};
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

// -- OpenAPI document ----------------------------------------------------------

/// OpenAPI documentation for the assetstamp API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "assetstamp API",
        version = "0.1.0",
        description = "Content-addressed asset publishing"
    ),
    paths(
        health_check,
        crate::handlers::assets::upload_assets,
        crate::handlers::assets::get_asset,
        crate::handlers::keys::issue_key,
        crate::handlers::keys::revoke_key,
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Assets", description = "Asset upload and naming"),
        (name = "Keys", description = "API key administration"),
    )
)]
pub struct ApiDoc;

/// Build the axum [`Router`] with all routes.
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    let body_limit = state.config.server.max_upload_size;

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(openapi_json))
        .route("/assets", post(handle_post_assets))
        .route("/assets/:key", get(handle_get_asset))
        .route("/keys", post(handle_post_keys))
        .route("/keys/:key", delete(handle_delete_key))
        .with_state(state.clone())
        // Layer ordering: inner layers run first, outer layers wrap them.
        // auth_middleware is innermost (closest to handlers, after routing).
        .layer(middleware::from_fn_with_state(state, auth_middleware))
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(TraceLayer::new_for_http())
        // metrics_middleware is outer (captures full request lifecycle).
        .layer(middleware::from_fn(metrics_middleware))
        .layer(DefaultBodyLimit::max(body_limit))
}

// -- Common headers middleware -----------------------------------------------

/// Adds `x-request-id`, `date` and `server` to every response.
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if !headers.contains_key("x-request-id") {
        if let Ok(value) = HeaderValue::from_str(&generate_request_id()) {
            headers.insert("x-request-id", value);
        }
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    if let Ok(value) = HeaderValue::from_str(&date) {
        headers.insert("date", value);
    }
    headers.insert("server", HeaderValue::from_static("assetstamp"));

    response
}

// -- Auth middleware ---------------------------------------------------------

/// Paths that bypass authentication.
const AUTH_SKIP_PATHS: &[&str] = &["/health", "/metrics", "/openapi.json"];

/// API key authentication middleware.
///
/// Resolves the `Authorization` header to a [`Caller`] and stores it in the
/// request extensions. Returns `InvalidCredentials` when the key is missing
/// or unknown.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if AUTH_SKIP_PATHS.contains(&req.uri().path()) {
        return Ok(next.run(req).await);
    }

    let authorization = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let caller = auth::authenticate(
        authorization.as_deref(),
        &state.config.auth.admin_apikey,
        state.metadata.as_ref(),
    )
    .await?;

    debug!("Authenticated request from ({})", caller.name);
    req.extensions_mut().insert(caller);

    Ok(next.run(req).await)
}

// -- Health check ------------------------------------------------------------

/// `GET /health` -- Returns `{"status": "ok"}` with 200 OK.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Health check OK")
    )
)]
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

/// `GET /openapi.json`
async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// -- Query parameter parsing helper ------------------------------------------

/// Parse raw query string into a HashMap.
fn parse_query(raw: Option<String>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if let Some(qs) = raw {
        for part in qs.split('&') {
            let (k, v) = part.split_once('=').unwrap_or((part, ""));
            if k.is_empty() {
                continue;
            }
            map.insert(decode_component(k), decode_component(v));
        }
    }
    map
}

/// Percent-decode a query component, treating `+` as a space.
fn decode_component(s: &str) -> String {
    let s = s.replace('+', " ");
    percent_encoding::percent_decode_str(&s)
        .decode_utf8_lossy()
        .into_owned()
}

// -- Dispatch ----------------------------------------------------------------

/// `POST /assets` -- UploadAssets
async fn handle_post_assets(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    RawQuery(raw_query): RawQuery,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let query = parse_query(raw_query);
    crate::handlers::assets::upload_assets(state, &caller, &query, multipart).await
}

/// `GET /assets/:key` -- GetAssetName
async fn handle_get_asset(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    crate::handlers::assets::get_asset(state, &key).await
}

/// `POST /keys` -- IssueApiKey
async fn handle_post_keys(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    RawQuery(raw_query): RawQuery,
) -> Result<Response, ApiError> {
    let query = parse_query(raw_query);
    crate::handlers::keys::issue_key(state, &caller, &query).await
}

/// `DELETE /keys/:key` -- RevokeApiKey
async fn handle_delete_key(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    crate::handlers::keys::revoke_key(state, &caller, &key).await
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::metadata::memory::MemoryMetadataStore;
    use crate::metadata::store::{ApiKeyRecord, MetadataStore};
    use crate::storage::backend::{PutOptions, StorageBackend};
    use crate::storage::memory::MemoryBackend;
    use axum::body::{to_bytes, Body, Bytes};
    use std::future::Future;
    use std::pin::Pin;
    use tower::ServiceExt;

    const ADMIN_AUTH: &str = r#"deconst apikey="12345""#;
    const USER_AUTH: &str = r#"deconst apikey="54321""#;
    const BOUNDARY: &str = "assetstampboundary";
    const HELLO_DIGEST: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    struct TestApp {
        router: Router,
        storage: Arc<MemoryBackend>,
        metadata: Arc<MemoryMetadataStore>,
    }

    /// Refuses writes to keys starting with `bad`, stores everything else.
    struct RejectingBackend {
        inner: MemoryBackend,
    }

    impl StorageBackend for RejectingBackend {
        fn put(
            &self,
            storage_key: &str,
            data: Bytes,
            options: PutOptions,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
            if storage_key.starts_with("bad") {
                let storage_key = storage_key.to_string();
                return Box::pin(async move {
                    Err::<(), _>(anyhow::anyhow!("write refused for {storage_key}"))
                });
            }
            self.inner.put(storage_key, data, options)
        }

        fn cdn_base_uri(&self) -> &str {
            self.inner.cdn_base_uri()
        }
    }

    async fn build_router(storage: Arc<dyn StorageBackend>) -> (Router, Arc<MemoryMetadataStore>) {
        let mut config = Config::default();
        config.auth.admin_apikey = "12345".into();

        let metadata = Arc::new(MemoryMetadataStore::new());
        metadata
            .insert_api_key(ApiKeyRecord {
                name: "someone".into(),
                apikey: "54321".into(),
                created_at: String::new(),
            })
            .await
            .unwrap();

        let state = Arc::new(AppState::new(config, metadata.clone(), storage));
        (app(state), metadata)
    }

    async fn test_app() -> TestApp {
        let storage = Arc::new(MemoryBackend::new("assets", Some("https://cdn.example.com")));
        let (router, metadata) = build_router(storage.clone()).await;
        TestApp {
            router,
            storage,
            metadata,
        }
    }

    /// Build a multipart body from (field name, file name, bytes) parts.
    fn multipart_body(parts: &[(&str, &str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (field, file_name, data) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(uri: &str, auth: &str, parts: &[(&str, &str, &[u8])]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("authorization", auth)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_parse_query() {
        let q = parse_query(Some("named=true&other=a%20b&flag&x=1+2".to_string()));
        assert_eq!(q["named"], "true");
        assert_eq!(q["other"], "a b");
        assert_eq!(q["flag"], "");
        assert_eq!(q["x"], "1 2");
        assert!(parse_query(None).is_empty());
    }

    #[tokio::test]
    async fn test_health_needs_no_auth() {
        let t = test_app().await;
        let response = t
            .router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["server"], "assetstamp");
        assert!(response.headers().contains_key("x-request-id"));
        assert!(response.headers().contains_key("date"));
    }

    #[tokio::test]
    async fn test_openapi_document() {
        let t = test_app().await;
        let response = t
            .router
            .oneshot(Request::get("/openapi.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let doc = json_body(response).await;
        assert!(doc["paths"]["/assets"].is_object());
        assert!(doc["paths"]["/keys/{key}"].is_object());
    }

    #[tokio::test]
    async fn test_upload_requires_key() {
        let t = test_app().await;
        let response = t
            .router
            .oneshot(upload_request(
                "/assets",
                r#"deconst apikey="wrong""#,
                &[("logo", "logo.png", b"hello world")],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["code"], "InvalidCredentials");
        assert!(t.storage.is_empty().await);
    }

    #[tokio::test]
    async fn test_upload_and_name_logo() {
        let t = test_app().await;
        let response = t
            .router
            .clone()
            .oneshot(upload_request(
                "/assets?named=true",
                USER_AUTH,
                &[("logo", "logo.png", b"hello world")],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let expected_url = format!("https://cdn.example.com/logo-{HELLO_DIGEST}.png");
        let body = json_body(response).await;
        assert_eq!(body, serde_json::json!({ "logo.png": expected_url }));

        let (stored, content_type) = t
            .storage
            .object(&format!("logo-{HELLO_DIGEST}.png"))
            .await
            .unwrap();
        assert_eq!(&stored[..], b"hello world");
        assert_eq!(content_type, "application/octet-stream");

        let response = t
            .router
            .oneshot(
                Request::get("/assets/logo")
                    .header("authorization", USER_AUTH)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["key"], "logo");
        assert_eq!(body["publicURL"], expected_url);
    }

    #[tokio::test]
    async fn test_upload_without_named_skips_naming() {
        let t = test_app().await;
        let response = t
            .router
            .oneshot(upload_request(
                "/assets",
                ADMIN_AUTH,
                &[("css", "site.css", b"body{}"), ("js", "app.js", b"run()")],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body.as_object().unwrap().len(), 2);
        assert_eq!(t.storage.len().await, 2);
        assert_eq!(t.metadata.count_asset_names().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upload_failure_names_nothing() {
        let storage = Arc::new(RejectingBackend {
            inner: MemoryBackend::new("assets", Some("https://cdn.example.com")),
        });
        let (router, metadata) = build_router(storage.clone()).await;
        let response = router
            .oneshot(upload_request(
                "/assets?named=true",
                ADMIN_AUTH,
                &[("css", "good.css", b"body{}"), ("js", "bad.js", b"run()")],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({ "error": "(administrator) Unable to upload one or more assets!" })
        );
        assert_eq!(metadata.count_asset_names().await.unwrap(), 0);
        assert!(metadata.get_asset_name("css").await.unwrap().is_none());
        assert_eq!(storage.inner.len().await, 1);
    }

    #[tokio::test]
    async fn test_upload_empty_form() {
        let t = test_app().await;
        let response = t
            .router
            .oneshot(upload_request("/assets?named=true", ADMIN_AUTH, &[]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_get_unknown_asset() {
        let t = test_app().await;
        let response = t
            .router
            .oneshot(
                Request::get("/assets/missing")
                    .header("authorization", ADMIN_AUTH)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["code"], "ResourceNotFound");
    }

    #[tokio::test]
    async fn test_issue_key() {
        let t = test_app().await;
        let response = t
            .router
            .oneshot(
                Request::post("/keys?named=someone")
                    .header("authorization", ADMIN_AUTH)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        let apikey = body["apikey"].as_str().unwrap();
        assert_eq!(apikey.len(), 256);
        let record = t.metadata.get_api_key(apikey).await.unwrap().unwrap();
        assert_eq!(record.name, "someone");
    }

    #[tokio::test]
    async fn test_issue_key_without_name() {
        let t = test_app().await;
        let response = t
            .router
            .oneshot(
                Request::post("/keys")
                    .header("authorization", ADMIN_AUTH)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = json_body(response).await;
        assert_eq!(body["code"], "MissingParameter");
        assert_eq!(body["message"], "You must specify a name for the API key");
    }

    #[tokio::test]
    async fn test_issue_key_requires_admin() {
        let t = test_app().await;
        let response = t
            .router
            .oneshot(
                Request::post("/keys?named=other")
                    .header("authorization", USER_AUTH)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_revoke_key() {
        let t = test_app().await;
        let response = t
            .router
            .oneshot(
                Request::delete("/keys/54321")
                    .header("authorization", ADMIN_AUTH)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(t.metadata.get_api_key("54321").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke_own_key() {
        let t = test_app().await;
        let response = t
            .router
            .oneshot(
                Request::delete("/keys/12345")
                    .header("authorization", ADMIN_AUTH)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = json_body(response).await;
        assert_eq!(body["code"], "InvalidArgument");
        assert_eq!(body["message"], "You cannot revoke your own API key.");
    }
}
