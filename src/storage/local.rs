//! Local filesystem storage backend.
//!
//! Objects are stored as flat files under `{root}/{container}/`.  The
//! directory is expected to be fronted by a static file server or CDN,
//! which is why a CDN base URI must be configured for this backend.  The
//! content type is left to that server.
//!
//! All writes follow crash-only design: write to temp file, fsync, rename.
//! A reader can never observe a half-written asset under its final name.

use bytes::Bytes;
use std::future::Future;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;

use super::backend::{normalize_base_uri, PutOptions, StorageBackend};

/// Stores objects on the local filesystem.
pub struct LocalBackend {
    /// Directory holding the container's objects.
    dir: PathBuf,
    /// Temp directory on the same filesystem, for atomic renames.
    tmp_dir: PathBuf,
    cdn_base_uri: String,
}

impl LocalBackend {
    /// Create a new `LocalBackend` for `container` under `root`.
    ///
    /// The directories will be created if they do not exist.
    pub fn new(
        root: impl Into<PathBuf>,
        container: &str,
        cdn_base_uri: &str,
    ) -> anyhow::Result<Self> {
        let root = root.into();
        if container.contains('/') || container == ".." || container == "." {
            anyhow::bail!("Invalid container name for local storage: {container}");
        }
        let dir = root.join(container);
        let tmp_dir = root.join(".tmp");
        std::fs::create_dir_all(&dir)?;
        std::fs::create_dir_all(&tmp_dir)?;
        Ok(Self {
            dir,
            tmp_dir,
            cdn_base_uri: normalize_base_uri(cdn_base_uri),
        })
    }

    /// Resolve a storage key to a file path, rejecting anything that could
    /// escape the container directory.
    fn resolve(&self, storage_key: &str) -> anyhow::Result<PathBuf> {
        let mut components = Path::new(storage_key).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.dir.join(storage_key)),
            _ => anyhow::bail!("Invalid storage key: {storage_key}"),
        }
    }

    /// Generate a temp file path for atomic writes.
    fn temp_path(&self) -> PathBuf {
        let id = uuid::Uuid::new_v4();
        self.tmp_dir.join(format!("tmp-{id}"))
    }
}

impl StorageBackend for LocalBackend {
    fn put(
        &self,
        storage_key: &str,
        data: Bytes,
        _options: PutOptions,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let storage_key = storage_key.to_string();
        Box::pin(async move {
            let final_path = self.resolve(&storage_key)?;
            let tmp_path = self.temp_path();

            let written = (|| -> std::io::Result<()> {
                let mut file = std::fs::File::create(&tmp_path)?;
                file.write_all(&data)?;
                file.sync_all()?;
                std::fs::rename(&tmp_path, &final_path)
            })();

            if let Err(e) = written {
                let _ = std::fs::remove_file(&tmp_path);
                return Err(e.into());
            }
            Ok(())
        })
    }

    fn cdn_base_uri(&self) -> &str {
        &self.cdn_base_uri
    }
}

// ── Tests ───────────────────────────────────────────────────────────
