//! Asset ingestion pipeline.
//!
//! Every uploaded file goes through three stages:
//!
//! 1. [`fingerprint::fingerprint`] reads the upload once and derives its
//!    content-addressed name.
//! 2. [`publish::publish`] writes the bytes to the asset container and
//!    computes the public URL.
//! 3. [`name::name`] binds the caller's logical key to that URL.
//!
//! Files are processed concurrently. Naming only starts once every file in
//! the batch has been published, so a batch with any failed upload never
//! moves a logical key. Assets that were published before the failure stay
//! in the container; there is no rollback.

pub mod fingerprint;
pub mod name;
pub mod publish;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use metrics::counter;
use tokio::io::AsyncRead;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, Instrument, Span};

use crate::metadata::store::MetadataStore;
use crate::metrics::ASSET_INGEST_FAILURES_TOTAL;
use crate::storage::backend::StorageBackend;

// ── Pipeline values ────────────────────────────────────────────────

/// Where an upload's bytes come from.
enum ByteSource {
    /// A spooled file on local disk, opened on first read.
    Path(PathBuf),
    /// An already-open stream.
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl ByteSource {
    async fn open(self) -> std::io::Result<Box<dyn AsyncRead + Send + Unpin>> {
        match self {
            ByteSource::Path(path) => Ok(Box::new(tokio::fs::File::open(path).await?)),
            ByteSource::Reader(reader) => Ok(reader),
        }
    }
}

/// One file received in an upload request.
pub struct UploadedFile {
    /// Client-supplied file name.
    pub name: String,
    /// Logical key the caller wants bound to this file.
    pub key: String,
    /// MIME type declared by the client.
    pub content_type: String,
    source: ByteSource,
}

impl UploadedFile {
    /// An upload whose bytes were spooled to `path`.
    pub fn from_path(
        name: impl Into<String>,
        key: impl Into<String>,
        content_type: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            content_type: content_type.into(),
            source: ByteSource::Path(path.into()),
        }
    }

    /// An upload read from an open stream.
    pub fn from_reader<R>(
        name: impl Into<String>,
        key: impl Into<String>,
        content_type: impl Into<String>,
        reader: R,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            name: name.into(),
            key: key.into(),
            content_type: content_type.into(),
            source: ByteSource::Reader(Box::new(reader)),
        }
    }
}

impl std::fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedFile")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// An upload after hashing, with its content buffered in read order.
#[derive(Debug, Clone)]
pub struct FingerprintedAsset {
    pub key: String,
    pub original_name: String,
    pub content_type: String,
    /// `{basename}-{sha256 hex}{ext}`.
    pub fingerprinted_name: String,
    pub chunks: Vec<Bytes>,
}

impl FingerprintedAsset {
    /// Total content length.
    pub fn len(&self) -> usize {
        self.chunks.iter().map(Bytes::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The content as one contiguous buffer.
    pub fn to_bytes(&self) -> Bytes {
        match self.chunks.as_slice() {
            [] => Bytes::new(),
            [only] => only.clone(),
            chunks => {
                let mut buf = BytesMut::with_capacity(self.len());
                for chunk in chunks {
                    buf.extend_from_slice(chunk);
                }
                buf.freeze()
            }
        }
    }
}

/// An asset that is live in the asset container.
#[derive(Debug, Clone)]
pub struct PublishedAsset {
    pub asset: FingerprintedAsset,
    pub public_url: String,
}

// ── Errors ─────────────────────────────────────────────────────────

/// Failure of one stage for one file.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to read asset [{name}]: {source}")]
    Fingerprint {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to publish asset [{name}]: {source}")]
    Publish {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to name asset [{key}]: {source}")]
    Name {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("ingest task aborted: {0}")]
    Task(#[from] JoinError),
}

impl IngestError {
    /// Pipeline stage label used in metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            IngestError::Fingerprint { .. } => "fingerprint",
            IngestError::Publish { .. } => "publish",
            IngestError::Name { .. } => "name",
            IngestError::Task(_) => "task",
        }
    }
}

// ── Orchestrator ───────────────────────────────────────────────────

/// Runs upload batches through fingerprint, publish and name.
#[derive(Clone)]
pub struct AssetIngestor {
    storage: Arc<dyn StorageBackend>,
    metadata: Arc<dyn MetadataStore>,
}

impl AssetIngestor {
    pub fn new(storage: Arc<dyn StorageBackend>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self { storage, metadata }
    }

    /// Ingest a batch. On success, returns the public URL of every file
    /// keyed by its original name. When `should_name` is false no
    /// naming record is touched. The first failure aborts the batch result;
    /// tasks already in flight run to completion.
    pub async fn ingest(
        &self,
        files: Vec<UploadedFile>,
        should_name: bool,
    ) -> Result<BTreeMap<String, String>, IngestError> {
        if files.is_empty() {
            return Ok(BTreeMap::new());
        }

        let published = self.publish_all(files).await?;

        if should_name {
            self.name_all(&published).await?;
        }

        Ok(published
            .into_iter()
            .map(|p| (p.asset.original_name, p.public_url))
            .collect())
    }

    /// Fingerprint and publish every file concurrently. Waits for all of
    /// them before reporting the first error.
    async fn publish_all(
        &self,
        files: Vec<UploadedFile>,
    ) -> Result<Vec<PublishedAsset>, IngestError> {
        let mut tasks = JoinSet::new();
        for file in files {
            let storage = Arc::clone(&self.storage);
            tasks.spawn(
                async move {
                    let asset = fingerprint::fingerprint(file).await?;
                    publish::publish(storage.as_ref(), asset).await
                }
                .instrument(Span::current()),
            );
        }

        let mut published = Vec::with_capacity(tasks.len());
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined.map_err(IngestError::from).and_then(|r| r) {
                Ok(asset) => published.push(asset),
                Err(e) => record_failure(&mut first_error, e),
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(published),
        }
    }

    /// Upsert a naming record for each published asset concurrently.
    async fn name_all(&self, published: &[PublishedAsset]) -> Result<(), IngestError> {
        let mut tasks = JoinSet::new();
        for asset in published.iter().cloned() {
            let metadata = Arc::clone(&self.metadata);
            tasks.spawn(
                async move { name::name(metadata.as_ref(), &asset).await }
                    .instrument(Span::current()),
            );
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined.map_err(IngestError::from).and_then(|r| r) {
                record_failure(&mut first_error, e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn record_failure(first: &mut Option<IngestError>, err: IngestError) {
    counter!(ASSET_INGEST_FAILURES_TOTAL, "stage" => err.stage()).increment(1);
    match first {
        None => *first = Some(err),
        Some(_) => debug!("Additional ingest failure: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::memory::MemoryMetadataStore;
    use crate::storage::backend::PutOptions;
    use crate::storage::memory::MemoryBackend;
    use std::future::Future;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    const HELLO_DIGEST: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    struct BrokenReader;

    impl AsyncRead for BrokenReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::other("disk went away")))
        }
    }

    /// Rejects every write.
    struct FailingBackend;

    impl StorageBackend for FailingBackend {
        fn put(
            &self,
            _storage_key: &str,
            _data: Bytes,
            _options: PutOptions,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
            Box::pin(async { Err::<(), _>(anyhow::anyhow!("container unavailable")) })
        }

        fn cdn_base_uri(&self) -> &str {
            "https://cdn"
        }
    }

    fn upload(name: &str, key: &str, data: &'static [u8]) -> UploadedFile {
        UploadedFile::from_reader(name, key, "application/octet-stream", io::Cursor::new(data))
    }

    fn setup() -> (Arc<MemoryBackend>, Arc<MemoryMetadataStore>, AssetIngestor) {
        let storage = Arc::new(MemoryBackend::new("assets", Some("https://cdn")));
        let metadata = Arc::new(MemoryMetadataStore::new());
        let ingestor = AssetIngestor::new(storage.clone(), metadata.clone());
        (storage, metadata, ingestor)
    }

    #[tokio::test]
    async fn test_single_file_named() {
        let (storage, metadata, ingestor) = setup();
        let result = ingestor
            .ingest(vec![upload("logo.png", "logo", b"hello world")], true)
            .await
            .unwrap();

        let expected = format!("logo-{HELLO_DIGEST}.png");
        assert_eq!(result.len(), 1);
        assert_eq!(result["logo.png"], format!("https://cdn/{expected}"));

        let (stored, _) = storage.object(&expected).await.unwrap();
        assert_eq!(stored, Bytes::from_static(b"hello world"));

        let record = metadata.get_asset_name("logo").await.unwrap().unwrap();
        assert_eq!(record.public_url, format!("https://cdn/{expected}"));
    }

    #[tokio::test]
    async fn test_unnamed_batch_leaves_names_alone() {
        let (storage, metadata, ingestor) = setup();
        let result = ingestor
            .ingest(
                vec![
                    upload("a.css", "css", b"body{}"),
                    upload("b.js", "js", b"run()"),
                ],
                false,
            )
            .await
            .unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(storage.len().await, 2);
        assert_eq!(metadata.count_asset_names().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let (storage, metadata, ingestor) = setup();
        let result = ingestor.ingest(Vec::new(), true).await.unwrap();
        assert!(result.is_empty());
        assert!(storage.is_empty().await);
        assert_eq!(metadata.count_asset_names().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_read_blocks_naming_for_whole_batch() {
        let (storage, metadata, ingestor) = setup();
        let files = vec![
            upload("good.css", "css", b"body{}"),
            UploadedFile::from_reader("bad.js", "js", "text/javascript", BrokenReader),
        ];

        let err = ingestor.ingest(files, true).await.unwrap_err();
        assert!(matches!(err, IngestError::Fingerprint { ref name, .. } if name == "bad.js"));
        assert_eq!(err.stage(), "fingerprint");

        // The good file may have been published, but nothing was named.
        assert!(storage.len().await <= 1);
        assert_eq!(metadata.count_asset_names().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_publish_failure() {
        let metadata = Arc::new(MemoryMetadataStore::new());
        let ingestor = AssetIngestor::new(Arc::new(FailingBackend), metadata.clone());

        let err = ingestor
            .ingest(vec![upload("logo.png", "logo", b"x")], true)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Publish { .. }));
        assert_eq!(metadata.count_asset_names().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_renaming_moves_key_to_newest_url() {
        let (_storage, metadata, ingestor) = setup();
        ingestor
            .ingest(vec![upload("site.css", "css", b"v1")], true)
            .await
            .unwrap();
        let second = ingestor
            .ingest(vec![upload("site.css", "css", b"v2")], true)
            .await
            .unwrap();

        let record = metadata.get_asset_name("css").await.unwrap().unwrap();
        assert_eq!(record.public_url, second["site.css"]);
        assert_eq!(metadata.count_asset_names().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_identical_content_is_idempotent() {
        let (storage, _metadata, ingestor) = setup();
        let first = ingestor
            .ingest(vec![upload("logo.png", "logo", b"same")], true)
            .await
            .unwrap();
        let second = ingestor
            .ingest(vec![upload("logo.png", "logo", b"same")], true)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(storage.len().await, 1);
    }

    #[test]
    fn test_to_bytes_joins_chunks() {
        let asset = FingerprintedAsset {
            key: "k".into(),
            original_name: "n".into(),
            content_type: "text/plain".into(),
            fingerprinted_name: "n-x".into(),
            chunks: vec![Bytes::from_static(b"ab"), Bytes::from_static(b"cd")],
        };
        assert_eq!(asset.len(), 4);
        assert!(!asset.is_empty());
        assert_eq!(asset.to_bytes(), Bytes::from_static(b"abcd"));
    }
}
