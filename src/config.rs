//! Configuration loading and types for assetstamp.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Each subsection governs a different part of the
//! system: networking, authentication, name/key persistence, the asset
//! container, logging, and metrics.

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Authentication settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Metadata store settings (asset names and API keys).
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Asset container settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum request body size in bytes for asset uploads.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,

    /// Directory used to spool multipart parts. Defaults to the system
    /// temp directory.
    #[serde(default)]
    pub spool_dir: Option<String>,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_size: default_max_upload_size(),
            spool_dir: None,
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

/// Authentication settings.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthConfig {
    /// The administrator's API key. Required.
    #[serde(alias = "admin_key", default)]
    pub admin_apikey: String,
}

/// Metadata store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataConfig {
    /// Backend type: `sqlite` or `memory`.
    #[serde(default = "default_metadata_engine")]
    pub engine: String,

    /// SQLite-specific configuration.
    #[serde(default)]
    pub sqlite: SqliteConfig,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            engine: default_metadata_engine(),
            sqlite: SqliteConfig::default(),
        }
    }
}

/// SQLite-specific metadata configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_metadata_path")]
    pub path: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: default_metadata_path(),
        }
    }
}

/// Asset container configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend type: `memory`, `local`, or `aws`.
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Name of the container (bucket) that published assets land in.
    #[serde(default = "default_container")]
    pub container: String,

    /// Public CDN prefix for published assets. When unset, the backend
    /// derives one from its own endpoint.
    #[serde(default)]
    pub cdn_base_uri: Option<String>,

    /// Local storage configuration.
    #[serde(default)]
    pub local: LocalStorageConfig,

    /// AWS S3 configuration.
    #[serde(default)]
    pub aws: Option<AwsStorageConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            container: default_container(),
            cdn_base_uri: None,
            local: LocalStorageConfig::default(),
            aws: None,
        }
    }
}

/// Local filesystem storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalStorageConfig {
    /// Root directory; the container is a subdirectory of it.
    #[serde(default = "default_storage_root")]
    pub root_dir: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_storage_root(),
        }
    }
}

/// AWS S3 configuration. The bucket is `storage.container`.
#[derive(Debug, Clone, Deserialize)]
pub struct AwsStorageConfig {
    /// AWS region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Key prefix in the bucket.
    #[serde(default)]
    pub prefix: String,
    /// Custom S3-compatible endpoint (e.g. MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: String,
    /// Force path-style URL addressing.
    #[serde(default)]
    pub use_path_style: bool,
    /// Explicit AWS access key (falls back to env/credential chain).
    #[serde(default)]
    pub access_key_id: String,
    /// Explicit AWS secret key (falls back to env/credential chain).
    #[serde(default)]
    pub secret_access_key: String,
    /// Apply a GET-from-any-origin CORS rule to the bucket at startup.
    #[serde(default = "default_true")]
    pub configure_cors: bool,
}

impl Config {
    /// Reject configurations the service cannot start with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.auth.admin_apikey.trim().is_empty() {
            anyhow::bail!("auth.admin_apikey must be set");
        }
        if self.storage.container.trim().is_empty() {
            anyhow::bail!("storage.container must not be empty");
        }
        if self.storage.backend == "aws" && self.storage.aws.is_none() {
            anyhow::bail!("storage.backend is 'aws' but storage.aws config section is missing");
        }
        Ok(())
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9012
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_metadata_engine() -> String {
    "sqlite".to_string()
}

fn default_metadata_path() -> String {
    "./data/assetstamp.db".to_string()
}

fn default_storage_backend() -> String {
    "local".to_string()
}

fn default_container() -> String {
    "assets".to_string()
}

fn default_storage_root() -> String {
    "./data/containers".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_upload_size() -> usize {
    100 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    parse_config(&contents)
}

/// Parse configuration from YAML text.
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config("auth:\n  admin_apikey: \"12345\"\n").unwrap();
        assert_eq!(config.server.port, 9012);
        assert_eq!(config.metadata.engine, "sqlite");
        assert_eq!(config.storage.backend, "local");
        assert_eq!(config.storage.container, "assets");
        assert!(config.storage.cdn_base_uri.is_none());
        assert!(config.observability.metrics);
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_admin_key_is_rejected() {
        let config = parse_config("server:\n  port: 8080\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_aws_section_required_for_aws_backend() {
        let yaml = "auth:\n  admin_apikey: k\nstorage:\n  backend: aws\n";
        let config = parse_config(yaml).unwrap();
        assert!(config.validate().is_err());

        let yaml = "auth:\n  admin_apikey: k\nstorage:\n  backend: aws\n  container: cdn-assets\n  aws:\n    region: eu-west-1\n";
        let config = parse_config(yaml).unwrap();
        config.validate().unwrap();
        let aws = config.storage.aws.unwrap();
        assert_eq!(aws.region, "eu-west-1");
        assert!(aws.configure_cors);
    }

    #[test]
    fn test_admin_key_alias() {
        let config = parse_config("auth:\n  admin_key: abc\n").unwrap();
        assert_eq!(config.auth.admin_apikey, "abc");
    }
}
