//! Content fingerprinting.
//!
//! Reads an upload exactly once, hashing each chunk with SHA-256 while
//! keeping the chunk for the publish step.

use bytes::{Bytes, BytesMut};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::debug;

use super::{FingerprintedAsset, IngestError, UploadedFile};

/// Read size for a single chunk.
const CHUNK_SIZE: usize = 64 * 1024;

/// Hash and buffer `file`, producing its content-addressed name.
pub async fn fingerprint(file: UploadedFile) -> Result<FingerprintedAsset, IngestError> {
    let UploadedFile {
        name,
        key,
        content_type,
        source,
    } = file;

    let fail = |source: std::io::Error| IngestError::Fingerprint {
        name: name.clone(),
        source,
    };

    let mut reader = source.open().await.map_err(fail)?;
    let mut hasher = Sha256::new();
    let mut chunks: Vec<Bytes> = Vec::new();

    loop {
        let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
        let n = reader.read_buf(&mut buf).await.map_err(fail)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf);
        chunks.push(buf.freeze());
    }

    let digest = hex::encode(hasher.finalize());
    let fingerprinted_name = fingerprinted_name(&name, &digest);

    debug!("Fingerprinted asset [{}] as [{}].", name, fingerprinted_name);

    Ok(FingerprintedAsset {
        key,
        original_name: name,
        content_type,
        fingerprinted_name,
        chunks,
    })
}

/// `{basename}-{digest}{ext}` for an uploaded file name.
pub fn fingerprinted_name(original: &str, digest: &str) -> String {
    let (stem, ext) = split_extension(base_name(original));
    format!("{stem}-{digest}{ext}")
}

/// Last path component; clients occasionally send full paths.
fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Split `name` at its last dot; the extension keeps the dot. Dotfiles
/// (`.htaccess`) and `..` have no extension, but `..htaccess` does.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && name != ".." => name.split_at(idx),
        _ => (name, ""),
    }
}
