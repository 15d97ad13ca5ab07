//! Asset container backends.
//!
//! The [`backend::StorageBackend`] trait abstracts over where published
//! bytes physically live.  Implementations cover memory, local disk, and
//! AWS S3 (or any S3-compatible store).

pub mod aws;
pub mod backend;
pub mod local;
pub mod memory;

use std::sync::Arc;

use tracing::info;

use crate::config::StorageConfig;
use backend::StorageBackend;

/// Build the storage backend selected by `config.backend`.
pub async fn from_config(config: &StorageConfig) -> anyhow::Result<Arc<dyn StorageBackend>> {
    let cdn = config.cdn_base_uri.as_deref();
    let backend: Arc<dyn StorageBackend> = match config.backend.as_str() {
        "memory" => {
            info!("Memory storage backend initialized for container {}", config.container);
            Arc::new(memory::MemoryBackend::new(&config.container, cdn))
        }
        "local" => {
            let cdn = cdn.ok_or_else(|| {
                anyhow::anyhow!("storage.backend is 'local' but storage.cdn_base_uri is not set")
            })?;
            let backend = local::LocalBackend::new(&config.local.root_dir, &config.container, cdn)?;
            info!(
                "Local storage backend initialized at {}/{}",
                config.local.root_dir, config.container
            );
            Arc::new(backend)
        }
        "aws" => {
            let aws_config = config.aws.as_ref().ok_or_else(|| {
                anyhow::anyhow!("storage.backend is 'aws' but storage.aws config section is missing")
            })?;
            let backend =
                aws::AwsGatewayBackend::new(config.container.clone(), aws_config, cdn).await?;
            if aws_config.configure_cors {
                backend.configure_public_cors().await?;
            }
            Arc::new(backend)
        }
        other => anyhow::bail!("Unknown storage backend: {other}"),
    };
    Ok(backend)
}
