//! Artifact persistence: atomic file writes behind a pluggable codec.

use crate::error::AgriError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::io;
use std::path::Path;

/// Write `data` to a `.tmp` sibling and rename it over `path`, creating the
/// parent directories first. Readers see the old file or the new one, never a
/// partial write.
pub async fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Hex SHA-256 of a byte slice.
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Serialization format for persisted artifacts.
pub trait ArtifactCodec: Send + Sync {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, AgriError>;
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, AgriError>;
}

/// Pretty-printed JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ArtifactCodec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, AgriError> {
        Ok(serde_json::to_vec_pretty(value)?)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, AgriError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Saves and loads typed artifacts with a codec.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore<C: ArtifactCodec = JsonCodec> {
    codec: C,
}

impl<C: ArtifactCodec> ArtifactStore<C> {
    pub fn new(codec: C) -> Self {
        Self { codec }
    }

    /// Encode and atomically write `value`. Returns the SHA-256 of the bytes
    /// written.
    pub async fn save<T: Serialize>(&self, path: &Path, value: &T) -> Result<String, AgriError> {
        let bytes = self.codec.encode(value)?;
        atomic_write(path, &bytes).await?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "artifact written");
        Ok(sha256_hex(&bytes))
    }

    /// Read and decode an artifact. A missing file is `NotFound`.
    pub async fn load<T: DeserializeOwned>(&self, path: &Path) -> Result<T, AgriError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(AgriError::not_found(format!(
                    "artifact {} does not exist",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        self.codec.decode(&bytes)
    }
}
