//! The upload metadata side-table (§6 glossary: "Upload token ::
//! `{token, localPath, mime, bytes, createdAt, expiresAt}`").
//!
//! `orbit-auth`'s `upload_tokens` table only tracks whether a token is
//! still valid (single-use, TTL-bounded); it knows nothing about the file
//! a token is attached to. This store fills that gap the same way
//! [`crate::title_store::TitleStore`] fills in for thread titles: a JSON
//! file under an advisory lock, read-modify-write made atomic with a
//! `.tmp` + rename.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{RelayError, RelayResult};

const LOCK_WAIT: Duration = Duration::from_secs(2);
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// One minted upload's declared shape and on-disk location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRecord {
    /// Where the uploaded bytes live, relative to the upload directory.
    pub local_path: PathBuf,
    /// The content-type declared at mint time and enforced on `PUT`.
    pub mime: String,
    /// Size in bytes once the body has actually landed (`None` until
    /// the `PUT` completes).
    pub bytes: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RecordFile {
    #[serde(default)]
    records: HashMap<String, UploadRecord>,
}

/// A handle to the on-disk upload-metadata map, keyed by token hash.
#[derive(Clone)]
pub struct UploadStore {
    path: PathBuf,
}

impl UploadStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Record a freshly-minted token's declared shape.
    pub async fn insert(&self, token_hash: &str, record: UploadRecord) -> RelayResult<()> {
        self.mutate(move |file| {
            file.records.insert(token_hash.to_string(), record);
        })
        .await
    }

    /// The record for a token, if one was minted and hasn't been pruned.
    pub async fn get(&self, token_hash: &str) -> RelayResult<Option<UploadRecord>> {
        let path = self.path.clone();
        let token_hash = token_hash.to_string();
        run_blocking(move || Ok(read_file(&path)?.records.get(&token_hash).cloned())).await
    }

    /// Fill in the uploaded size once a `PUT` lands.
    pub async fn mark_uploaded(&self, token_hash: &str, bytes: u64) -> RelayResult<()> {
        self.mutate(move |file| {
            if let Some(record) = file.records.get_mut(token_hash) {
                record.bytes = Some(bytes);
            }
        })
        .await
    }

    /// Remove a record, returning it so the caller can delete the
    /// underlying file.
    pub async fn remove(&self, token_hash: &str) -> RelayResult<Option<UploadRecord>> {
        let path = self.path.clone();
        let token_hash = token_hash.to_string();
        run_blocking(move || {
            let _guard = acquire_lock(&path, LOCK_WAIT)?;
            let mut file = read_file(&path)?;
            let removed = file.records.remove(&token_hash);
            write_file_atomic(&path, &file)?;
            Ok(removed)
        })
        .await
    }

    /// Every `(token_hash, record)` pair whose `expires_at` is before
    /// `cutoff` — the prune sweep's candidate list.
    pub async fn expired_before(&self, cutoff: DateTime<Utc>) -> RelayResult<Vec<(String, UploadRecord)>> {
        let path = self.path.clone();
        run_blocking(move || {
            Ok(read_file(&path)?.records.into_iter().filter(|(_, record)| record.expires_at < cutoff).collect())
        })
        .await
    }

    async fn mutate(&self, f: impl FnOnce(&mut RecordFile) + Send + 'static) -> RelayResult<()> {
        let path = self.path.clone();
        run_blocking(move || {
            let _guard = acquire_lock(&path, LOCK_WAIT)?;
            let mut file = read_file(&path)?;
            f(&mut file);
            write_file_atomic(&path, &file)
        })
        .await
    }
}

async fn run_blocking<T: Send + 'static>(f: impl FnOnce() -> RelayResult<T> + Send + 'static) -> RelayResult<T> {
    tokio::task::spawn_blocking(f).await.map_err(|err| RelayError::BadRequest(format!("upload store task panicked: {err}")))?
}

fn read_file(path: &Path) -> RelayResult<RecordFile> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            serde_json::from_str(&contents).map_err(|err| RelayError::BadRequest(format!("corrupt upload store: {err}")))
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(RecordFile::default()),
        Err(err) => Err(RelayError::Io(err)),
    }
}

fn write_file_atomic(path: &Path, file: &RecordFile) -> RelayResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    let contents = serde_json::to_string_pretty(file)?;
    std::io::Write::write_all(&mut tmp, contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| RelayError::Io(err.error))?;
    Ok(())
}

struct LockGuard(std::fs::File);

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(err) = self.0.unlock() {
            warn!(error = %err, "failed to release upload store file lock");
        }
    }
}

fn acquire_lock(path: &Path, wait: Duration) -> RelayResult<LockGuard> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut lock_path = path.as_os_str().to_owned();
    lock_path.push(".lock");
    let file = std::fs::OpenOptions::new().create(true).write(true).truncate(false).open(PathBuf::from(lock_path))?;

    let deadline = Instant::now() + wait;
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(LockGuard(file)),
            Err(_) if Instant::now() < deadline => std::thread::sleep(LOCK_POLL_INTERVAL),
            Err(err) => return Err(RelayError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> UploadRecord {
        UploadRecord {
            local_path: PathBuf::from("ab/cd.bin"),
            mime: "image/png".to_string(),
            bytes: None,
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::minutes(15),
        }
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().join("uploads.json"));
        store.insert("hash1", record()).await.unwrap();
        let got = store.get("hash1").await.unwrap().unwrap();
        assert_eq!(got.mime, "image/png");
        assert_eq!(got.bytes, None);
    }

    #[tokio::test]
    async fn mark_uploaded_fills_in_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().join("uploads.json"));
        store.insert("hash1", record()).await.unwrap();
        store.mark_uploaded("hash1", 1024).await.unwrap();
        assert_eq!(store.get("hash1").await.unwrap().unwrap().bytes, Some(1024));
    }

    #[tokio::test]
    async fn expired_before_filters_by_cutoff() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().join("uploads.json"));
        let mut expired = record();
        expired.expires_at = Utc::now() - chrono::Duration::minutes(1);
        store.insert("expired", expired).await.unwrap();
        store.insert("fresh", record()).await.unwrap();

        let candidates = store.expired_before(Utc::now()).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].0, "expired");
    }

    #[tokio::test]
    async fn remove_returns_and_deletes_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().join("uploads.json"));
        store.insert("hash1", record()).await.unwrap();
        let removed = store.remove("hash1").await.unwrap();
        assert!(removed.is_some());
        assert!(store.get("hash1").await.unwrap().is_none());
    }
}
