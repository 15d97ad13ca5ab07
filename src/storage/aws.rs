//! AWS S3 storage backend.
//!
//! Publishes assets into a single S3 (or S3-compatible) bucket, the asset
//! container.  Object keys are `{prefix}{name}`.
//!
//! Credentials are resolved via the standard AWS credential chain
//! (env vars, `~/.aws/credentials`, IAM role, etc.) unless explicit keys
//! are configured.

use aws_sdk_s3::types::{CorsConfiguration, CorsRule, ObjectCannedAcl};
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info};

use super::backend::{normalize_base_uri, PutOptions, StorageBackend};
use crate::config::AwsStorageConfig;

/// Backend that writes assets to an S3 bucket.
pub struct AwsGatewayBackend {
    /// AWS S3 SDK client.
    client: Client,
    /// The asset container bucket.
    bucket: String,
    /// Key prefix for all objects in the bucket.
    prefix: String,
    cdn_base_uri: String,
}

impl AwsGatewayBackend {
    /// Create a new S3 backend for `bucket`.
    ///
    /// When `cdn_base_uri` is `None` the public URL prefix is derived from
    /// the bucket endpoint (see [`derive_cdn_base_uri`]).
    pub async fn new(
        bucket: String,
        config: &AwsStorageConfig,
        cdn_base_uri: Option<&str>,
    ) -> anyhow::Result<Self> {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        if !config.endpoint_url.is_empty() {
            config_loader = config_loader.endpoint_url(&config.endpoint_url);
        }

        if !config.access_key_id.is_empty() && !config.secret_access_key.is_empty() {
            let creds = aws_sdk_s3::config::Credentials::new(
                &config.access_key_id,
                &config.secret_access_key,
                None, // session_token
                None, // expiry
                "assetstamp-config",
            );
            config_loader = config_loader.credentials_provider(creds);
        }

        let sdk_config = config_loader.load().await;

        let s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.use_path_style);

        let client = Client::from_conf(s3_config_builder.build());

        let cdn_base_uri = match cdn_base_uri {
            Some(uri) => normalize_base_uri(uri),
            None => derive_cdn_base_uri(
                &bucket,
                &config.region,
                &config.prefix,
                &config.endpoint_url,
                config.use_path_style,
            ),
        };

        info!(
            "S3 asset backend initialized: bucket={} prefix='{}' cdn={}",
            bucket, config.prefix, cdn_base_uri
        );

        Ok(Self {
            client,
            bucket,
            prefix: normalize_prefix(&config.prefix),
            cdn_base_uri,
        })
    }

    /// Allow browsers on any origin to GET published assets.
    pub async fn configure_public_cors(&self) -> anyhow::Result<()> {
        let rule = CorsRule::builder()
            .allowed_methods("GET")
            .allowed_methods("HEAD")
            .allowed_origins("*")
            .max_age_seconds(3000)
            .build()?;
        let cors = CorsConfiguration::builder().cors_rules(rule).build()?;

        self.client
            .put_bucket_cors()
            .bucket(&self.bucket)
            .cors_configuration(cors)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error("put_bucket_cors", e))?;

        info!("Applied public CORS rule to bucket {}", self.bucket);
        Ok(())
    }

    /// Map an asset name to an S3 key.
    fn s3_key(&self, storage_key: &str) -> String {
        format!("{}{}", self.prefix, storage_key)
    }

    /// Map an AWS SDK error to an anyhow error with context.
    fn map_sdk_error(context: &str, err: impl std::fmt::Display) -> anyhow::Error {
        anyhow::anyhow!("AWS S3 {context}: {err}")
    }
}

/// `a/b` and `/a/b/` both become `a/b/`; empty stays empty.
fn normalize_prefix(prefix: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        String::new()
    } else {
        format!("{prefix}/")
    }
}

/// Public URL prefix for objects in `bucket` when no CDN is configured.
///
/// Custom endpoints (MinIO, LocalStack) and path-style addressing yield
/// `{endpoint}/{bucket}`; otherwise the virtual-hosted S3 URL is used.
/// A non-empty key prefix is appended so that `{base}/{name}` addresses
/// the object.
pub fn derive_cdn_base_uri(
    bucket: &str,
    region: &str,
    prefix: &str,
    endpoint_url: &str,
    use_path_style: bool,
) -> String {
    let base = if !endpoint_url.is_empty() {
        format!("{}/{}", endpoint_url.trim_end_matches('/'), bucket)
    } else if use_path_style {
        format!("https://s3.{region}.amazonaws.com/{bucket}")
    } else {
        format!("https://{bucket}.s3.{region}.amazonaws.com")
    };

    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        base
    } else {
        format!("{base}/{prefix}")
    }
}

impl StorageBackend for AwsGatewayBackend {
    fn put(
        &self,
        storage_key: &str,
        data: Bytes,
        options: PutOptions,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let storage_key = storage_key.to_string();
        Box::pin(async move {
            let s3_key = self.s3_key(&storage_key);

            debug!(
                "AWS put_object: bucket={} key={} size={}",
                self.bucket,
                s3_key,
                data.len()
            );

            let mut request = self
                .client
                .put_object()
                .bucket(&self.bucket)
                .key(&s3_key)
                .content_type(&options.content_type)
                .body(aws_sdk_s3::primitives::ByteStream::from(data));

            if options.public_read {
                request = request.acl(ObjectCannedAcl::PublicRead);
            }

            // S3 PutObject is atomic: the key is not visible until the
            // upload completes.
            request
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("put_object", e))?;

            Ok(())
        })
    }

    fn cdn_base_uri(&self) -> &str {
        &self.cdn_base_uri
    }
}
