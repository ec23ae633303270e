//! The external user-defined thread-title store (§4.5 step 1, §5 shared
//! resource policy): a JSON file edited under an advisory file lock with a
//! 2-second wait, read-modify-write made atomic with a `.tmp` + rename —
//! the same pattern `astrid-plugins`' lockfile module uses for its own
//! `plugins.lock`, generalized from TOML to a flat JSON title map.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{RelayError, RelayResult};

/// How long [`TitleStore::set_title`] waits to acquire the advisory lock
/// before giving up.
const LOCK_WAIT: Duration = Duration::from_secs(2);
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Default, Serialize, Deserialize)]
struct TitleFile {
    #[serde(default)]
    titles: HashMap<String, String>,
}

/// A handle to the on-disk title map.
#[derive(Clone)]
pub struct TitleStore {
    path: PathBuf,
}

impl TitleStore {
    /// A store backed by `path`. The file is created lazily on first
    /// write; reads of a missing file return an empty map.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The user-defined title for `thread_id`, if one has been set.
    pub async fn get_title(&self, thread_id: &str) -> RelayResult<Option<String>> {
        let path = self.path.clone();
        let thread_id = thread_id.to_string();
        tokio::task::spawn_blocking(move || {
            let file = read_file(&path)?;
            Ok(file.titles.get(&thread_id).cloned())
        })
        .await
        .map_err(|err| RelayError::BadRequest(format!("title store task panicked: {err}")))?
    }

    /// Set (or clear, with `None`) the user-defined title for `thread_id`.
    pub async fn set_title(&self, thread_id: &str, title: Option<String>) -> RelayResult<()> {
        let path = self.path.clone();
        let thread_id = thread_id.to_string();
        tokio::task::spawn_blocking(move || {
            let _guard = acquire_lock(&path, LOCK_WAIT)?;
            let mut file = read_file(&path)?;
            match title {
                Some(title) => file.titles.insert(thread_id, title),
                None => file.titles.remove(&thread_id),
            };
            write_file_atomic(&path, &file)
        })
        .await
        .map_err(|err| RelayError::BadRequest(format!("title store task panicked: {err}")))?
    }

    /// Merge this store's titles into `payload`'s thread entries without
    /// overwriting a non-empty `title` already present (§4.5 anchor-message
    /// enrichment step 1). `thread_id_of` extracts each entry's thread id.
    pub async fn merge_title(&self, thread_id: &str, existing_title: Option<&str>) -> RelayResult<Option<String>> {
        if existing_title.is_some_and(|t| !t.is_empty()) {
            return Ok(existing_title.map(str::to_string));
        }
        self.get_title(thread_id).await
    }
}

fn read_file(path: &Path) -> RelayResult<TitleFile> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            serde_json::from_str(&contents).map_err(|err| RelayError::BadRequest(format!("corrupt title store: {err}")))
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(TitleFile::default()),
        Err(err) => Err(RelayError::Io(err)),
    }
}

fn write_file_atomic(path: &Path, file: &TitleFile) -> RelayResult<()> {
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

/// RAII advisory-lock guard; unlocks (and the file closes) on drop.
struct LockGuard(std::fs::File);

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(err) = self.0.unlock() {
            warn!(error = %err, "failed to release title store file lock");
        }
    }
}

fn acquire_lock(path: &Path, wait: Duration) -> RelayResult<LockGuard> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let lock_path = lock_file_path(path);
    let file = std::fs::OpenOptions::new().create(true).write(true).truncate(false).open(&lock_path)?;

    let deadline = Instant::now() + wait;
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(LockGuard(file)),
            Err(_) if Instant::now() < deadline => std::thread::sleep(LOCK_POLL_INTERVAL),
            Err(err) => return Err(RelayError::Io(err)),
        }
    }
}

fn lock_file_path(path: &Path) -> PathBuf {
    let mut lock_path = path.as_os_str().to_owned();
    lock_path.push(".lock");
    PathBuf::from(lock_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = TitleStore::new(dir.path().join("titles.json"));

        store.set_title("codex:t1", Some("Fix the bug".to_string())).await.unwrap();
        assert_eq!(store.get_title("codex:t1").await.unwrap(), Some("Fix the bug".to_string()));
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TitleStore::new(dir.path().join("titles.json"));
        assert_eq!(store.get_title("codex:t1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn merge_title_never_overwrites_a_non_empty_existing_title() {
        let dir = tempfile::tempdir().unwrap();
        let store = TitleStore::new(dir.path().join("titles.json"));
        store.set_title("codex:t1", Some("Stored title".to_string())).await.unwrap();

        let merged = store.merge_title("codex:t1", Some("Provider title")).await.unwrap();
        assert_eq!(merged.as_deref(), Some("Provider title"));

        let merged_empty = store.merge_title("codex:t1", Some("")).await.unwrap();
        assert_eq!(merged_empty.as_deref(), Some("Stored title"));
    }

    #[tokio::test]
    async fn clearing_a_title_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = TitleStore::new(dir.path().join("titles.json"));
        store.set_title("codex:t1", Some("Title".to_string())).await.unwrap();
        store.set_title("codex:t1", None).await.unwrap();
        assert_eq!(store.get_title("codex:t1").await.unwrap(), None);
    }
}
