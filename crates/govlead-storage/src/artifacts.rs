use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use govlead_core::ContractSource;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub content_hash: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
    pub deduplicated: bool,
}

#[derive(Debug, Serialize)]
struct QuarantineRecord<'a> {
    source: ContractSource,
    item_key: &'a str,
    reason: &'a str,
    captured_at: DateTime<Utc>,
    content_hash: &'a str,
    byte_size: usize,
}

/// Hash-addressed store for raw source payloads that could not be turned into
/// contracts, so an acknowledged item is never lost.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    pub fn artifact_relative_path(
        &self,
        captured_at: DateTime<Utc>,
        source: ContractSource,
        content_hash: &str,
        extension: &str,
    ) -> PathBuf {
        let day = captured_at.format("%Y%m%d").to_string();
        let ext = extension.trim_start_matches('.').trim();
        let ext = if ext.is_empty() { "bin" } else { ext };
        PathBuf::from(source.as_str())
            .join(day)
            .join(format!("{content_hash}.{ext}"))
    }

    /// Store bytes immutably using a hash-addressed path and atomic temp-file rename.
    pub async fn store_bytes(
        &self,
        captured_at: DateTime<Utc>,
        source: ContractSource,
        extension: &str,
        bytes: &[u8],
    ) -> anyhow::Result<StoredArtifact> {
        let content_hash = Self::sha256_hex(bytes);
        let relative_path = self.artifact_relative_path(captured_at, source, &content_hash, extension);
        let absolute_path = self.root.join(&relative_path);
        let parent = absolute_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("creating artifact directory {}", parent.display()))?;

        let stored = |deduplicated| StoredArtifact {
            content_hash: content_hash.clone(),
            relative_path: relative_path.clone(),
            absolute_path: absolute_path.clone(),
            byte_size: bytes.len(),
            deduplicated,
        };

        if fs::try_exists(&absolute_path)
            .await
            .with_context(|| format!("checking artifact path {}", absolute_path.display()))?
        {
            return Ok(stored(true));
        }

        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        write_new_file(&temp_path, bytes).await?;

        match fs::rename(&temp_path, &absolute_path).await {
            Ok(()) => Ok(stored(false)),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                let _ = fs::remove_file(&temp_path).await;
                Ok(stored(true))
            }
            Err(err) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(err).with_context(|| {
                    format!(
                        "atomically renaming temp artifact {} -> {}",
                        temp_path.display(),
                        absolute_path.display()
                    )
                })
            }
        }
    }

    /// Stores an unparseable payload plus a JSON sidecar describing why it was rejected.
    pub async fn quarantine(
        &self,
        captured_at: DateTime<Utc>,
        source: ContractSource,
        item_key: &str,
        reason: &str,
        extension: &str,
        bytes: &[u8],
    ) -> anyhow::Result<StoredArtifact> {
        let artifact = self.store_bytes(captured_at, source, extension, bytes).await?;
        let sidecar = artifact.absolute_path.with_extension("json");
        let record = QuarantineRecord {
            source,
            item_key,
            reason,
            captured_at,
            content_hash: &artifact.content_hash,
            byte_size: artifact.byte_size,
        };
        let json = serde_json::to_vec_pretty(&record).context("serializing quarantine record")?;
        fs::write(&sidecar, json)
            .await
            .with_context(|| format!("writing {}", sidecar.display()))?;
        Ok(artifact)
    }
}

async fn write_new_file(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(path)
        .await
        .with_context(|| format!("opening temp artifact file {}", path.display()))?;
    file.write_all(bytes)
        .await
        .with_context(|| format!("writing temp artifact file {}", path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing temp artifact file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn captured_at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-21T12:00:00Z")
            .expect("ts")
            .with_timezone(&Utc)
    }

    #[test]
    fn artifact_hashing_is_stable() {
        let hash = ArtifactStore::sha256_hex(b"hello world");
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn identical_payloads_deduplicate_by_hash_path() {
        let dir = tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path());

        let first = store
            .store_bytes(captured_at(), ContractSource::StateEmail, "html", b"<p>same</p>")
            .await
            .expect("first store");
        let second = store
            .store_bytes(captured_at(), ContractSource::StateEmail, "html", b"<p>same</p>")
            .await
            .expect("second store");

        assert!(!first.deduplicated);
        assert!(second.deduplicated);
        assert_eq!(first.relative_path, second.relative_path);
        assert!(first.relative_path.starts_with("state-email/20260121"));
        assert!(first.absolute_path.exists());
    }

    #[tokio::test]
    async fn quarantine_writes_reason_sidecar() {
        let dir = tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path());

        let artifact = store
            .quarantine(
                captured_at(),
                ContractSource::StateEmail,
                "msg-17",
                "no bid identifier",
                "html",
                b"<p>Weekly digest</p>",
            )
            .await
            .expect("quarantine");

        let sidecar = std::fs::read_to_string(artifact.absolute_path.with_extension("json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&sidecar).unwrap();
        assert_eq!(value["item_key"], "msg-17");
        assert_eq!(value["reason"], "no bid identifier");
        assert_eq!(value["source"], "state-email");
    }
}
