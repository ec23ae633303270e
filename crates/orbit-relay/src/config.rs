//! Relay-facing configuration: the subset of the daemon's full config
//! (§6 "Config file") that the relay itself needs, assembled by
//! `orbit-server` from the layered CLI/env/file/default config and handed
//! to [`crate::state::RelayState::new`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use orbit_auth::RateLimitConfig;
use serde::{Deserialize, Serialize};

/// Per-scope rate limit configuration (§4.8: "configurable per scope").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSettings {
    /// `admin/pair/new` bucket.
    #[serde(default = "default_pair_rate_limit")]
    pub pair_new: RateLimitSetting,
    /// `uploads/new` bucket.
    #[serde(default = "default_uploads_rate_limit")]
    pub uploads_new: RateLimitSetting,
}

/// One scope's `(maxRequests, windowSeconds)` pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSetting {
    /// Admitted requests per window.
    pub max_requests: u32,
    /// Window length, in seconds.
    pub window_secs: u64,
}

impl RateLimitSetting {
    /// Convert to the `orbit-auth` config type.
    #[must_use]
    pub fn to_config(self) -> RateLimitConfig {
        RateLimitConfig::new(self.max_requests, Duration::from_secs(self.window_secs))
    }
}

fn default_pair_rate_limit() -> RateLimitSetting {
    RateLimitSetting { max_requests: 5, window_secs: 60 }
}

fn default_uploads_rate_limit() -> RateLimitSetting {
    RateLimitSetting { max_requests: 10, window_secs: 60 }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self { pair_new: default_pair_rate_limit(), uploads_new: default_uploads_rate_limit() }
    }
}

/// Upload surface configuration (`/uploads/new`, `/uploads/:token`, `/u/:token`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSettings {
    /// Directory uploaded files are stored under.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Days an uploaded file is retained before `pruneUploads` removes it.
    #[serde(default = "default_upload_retention_days")]
    pub retention_days: i64,
    /// How often the background prune sweep runs.
    #[serde(default = "default_prune_interval_hours")]
    pub prune_interval_hours: u64,
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_upload_retention_days() -> i64 {
    7
}

fn default_prune_interval_hours() -> u64 {
    6
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            retention_days: default_upload_retention_days(),
            prune_interval_hours: default_prune_interval_hours(),
        }
    }
}

/// One provider's launch parameters (§6 config file: `providers.<id>.{enabled,
/// executablePath, apiKey?, model?, timeout?}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default)]
    pub enabled: bool,
    pub executable_path: Option<PathBuf>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    #[serde(rename = "timeout")]
    pub timeout_secs: Option<u64>,
}

/// The relay's full configuration slice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Path to the external thread-title JSON store.
    #[serde(default = "default_title_store_path")]
    pub title_store_path: PathBuf,
    /// Per-scope rate limits.
    #[serde(default)]
    pub rate_limits: RateLimitSettings,
    /// Upload surface settings.
    #[serde(default)]
    pub uploads: UploadSettings,
    /// Commands `POST /admin/cli/run` is allowed to invoke, by name.
    #[serde(default)]
    pub cli_allow_list: Vec<String>,
    /// Base URL used to render the pairing QR code (`/admin/pair/qr.svg`).
    #[serde(default = "default_pair_base_url")]
    pub pair_base_url: String,
    /// Event store retention window, applied by the periodic prune sweep
    /// (§4.7: "scheduled every 6 hours").
    #[serde(default = "default_event_retention_days")]
    pub event_retention_days: i64,
    /// Per-provider launch parameters, keyed by provider id.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Path to the full on-disk daemon config file, so `/api/config/providers`
    /// can merge-write just the `providers` key without this crate needing
    /// to model the daemon's entire schema. `None` when nothing backs this
    /// config on disk (tests, or a config assembled purely from CLI/env).
    #[serde(skip)]
    pub config_file_path: Option<PathBuf>,
}

fn default_title_store_path() -> PathBuf {
    PathBuf::from("titles.json")
}

fn default_pair_base_url() -> String {
    "http://localhost:8787".to_string()
}

fn default_event_retention_days() -> i64 {
    90
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            title_store_path: default_title_store_path(),
            rate_limits: RateLimitSettings::default(),
            uploads: UploadSettings::default(),
            cli_allow_list: Vec::new(),
            pair_base_url: default_pair_base_url(),
            event_retention_days: default_event_retention_days(),
            providers: HashMap::new(),
            config_file_path: None,
        }
    }
}

/// Merge `providers` into the `providers` key of the JSON config file at
/// `path`, leaving every other key (`token`, `host`, `port`, `db`, …)
/// untouched — this crate only owns the `providers` slice of the
/// daemon's config, not its full schema. Written under an advisory lock
/// with the same `.tmp` + rename pattern [`crate::title_store::TitleStore`]
/// uses, since the file is shared with whatever process manages the rest
/// of the daemon's config.
///
/// # Errors
///
/// Returns [`RelayError::Io`] on a read/write failure, or
/// [`RelayError::BadRequest`] if the existing file is not a JSON object.
pub fn merge_providers_into_file(path: &std::path::Path, providers: &HashMap<String, ProviderConfig>) -> crate::error::RelayResult<()> {
    use std::io::Write;

    use fs2::FileExt;

    use crate::error::RelayError;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut lock_path = path.as_os_str().to_owned();
    lock_path.push(".lock");
    let lock_file = std::fs::OpenOptions::new().create(true).write(true).truncate(false).open(&lock_path)?;
    lock_file.lock_exclusive()?;

    let mut doc: serde_json::Value = match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).map_err(|err| RelayError::BadRequest(format!("corrupt config file: {err}")))?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => serde_json::json!({}),
        Err(err) => return Err(RelayError::Io(err)),
    };
    let obj = doc.as_object_mut().ok_or_else(|| RelayError::BadRequest("config file is not a JSON object".to_string()))?;
    obj.insert("providers".to_string(), serde_json::to_value(providers)?);

    let parent = path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(serde_json::to_string_pretty(&doc)?.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| RelayError::Io(err.error))?;

    let _ = lock_file.unlock();
    Ok(())
}
