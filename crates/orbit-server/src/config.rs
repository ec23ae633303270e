//! Layered configuration: CLI flags > environment variables > JSON config
//! file > built-in defaults (§1 process model), mirroring the precedence
//! order `astrid-config::loader` uses for its own multi-file merge, scaled
//! down to this daemon's single JSON file (§6 "Config file").

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use orbit_relay::{ProviderConfig, RateLimitSettings, RelayConfig};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::logging::LogFormat;

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_db_path() -> PathBuf {
    data_dir().join("orbit.db")
}

fn default_upload_dir() -> PathBuf {
    data_dir().join("uploads")
}

fn default_upload_retention_days() -> i64 {
    7
}

fn default_upload_prune_interval_hours() -> u64 {
    6
}

fn default_event_retention_days() -> i64 {
    90
}

fn default_pair_base_url() -> String {
    format!("http://{}:{}", default_host(), default_port())
}

fn default_title_store_path() -> PathBuf {
    data_dir().join("titles.json")
}

/// The per-user data directory this daemon's files live under by default,
/// resolved the way `astralis-gateway::config_bridge::default_state_dir`
/// resolves its own state directory.
fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "orbit").map_or_else(|| PathBuf::from(".orbit"), |dirs| dirs.data_dir().to_path_buf())
}

/// Default path to the JSON config file, absent `--config`/`ORBIT_CONFIG`.
#[must_use]
pub fn default_config_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "orbit").map_or_else(|| PathBuf::from(".orbit/config.json"), |dirs| dirs.config_dir().join("config.json"))
}

/// The full on-disk schema (§6 config file keys, plus the relay-internal
/// extras `orbit-relay::RelayConfig` already models — `cliAllowList`,
/// `pairBaseUrl`, `titleStorePath`, `rateLimits` — which aren't in the
/// spec's minimal key list but need somewhere to live once a config file
/// exists at all).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonConfig {
    /// The legacy bootstrap token. Required; a missing token is a fatal
    /// configuration error (§6 exit code 1).
    pub token: Option<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub db: PathBuf,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_upload_retention_days")]
    pub upload_retention_days: i64,
    #[serde(default = "default_upload_prune_interval_hours")]
    pub upload_prune_interval_hours: u64,
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub rate_limits: RateLimitSettings,
    #[serde(default)]
    pub cli_allow_list: Vec<String>,
    #[serde(default = "default_pair_base_url")]
    pub pair_base_url: String,
    #[serde(default = "default_event_retention_days")]
    pub event_retention_days: i64,
    #[serde(default = "default_title_store_path")]
    pub title_store_path: PathBuf,
    /// Log output mode; `pretty` unless overridden (§2 ambient logging).
    #[serde(default)]
    pub log_format: LogFormat,
    /// The path this config was loaded from, so `/api/config/providers`
    /// can merge-write back into it. Not itself a config key.
    #[serde(skip)]
    pub loaded_from: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            token: None,
            host: default_host(),
            port: default_port(),
            db: default_db_path(),
            upload_dir: default_upload_dir(),
            upload_retention_days: default_upload_retention_days(),
            upload_prune_interval_hours: default_upload_prune_interval_hours(),
            providers: HashMap::new(),
            rate_limits: RateLimitSettings::default(),
            cli_allow_list: Vec::new(),
            pair_base_url: default_pair_base_url(),
            event_retention_days: default_event_retention_days(),
            title_store_path: default_title_store_path(),
            log_format: LogFormat::default(),
            loaded_from: None,
        }
    }
}

impl DaemonConfig {
    /// Project this daemon config into the slice `orbit-relay::RelayState`
    /// actually needs.
    #[must_use]
    pub fn to_relay_config(&self) -> RelayConfig {
        RelayConfig {
            title_store_path: self.title_store_path.clone(),
            rate_limits: self.rate_limits.clone(),
            uploads: orbit_relay::UploadSettings {
                upload_dir: self.upload_dir.clone(),
                retention_days: self.upload_retention_days,
                prune_interval_hours: self.upload_prune_interval_hours,
            },
            cli_allow_list: self.cli_allow_list.clone(),
            pair_base_url: self.pair_base_url.clone(),
            event_retention_days: self.event_retention_days,
            providers: self.providers.clone(),
            config_file_path: self.loaded_from.clone(),
        }
    }
}

/// CLI overrides, applied last (highest precedence). Left as plain
/// `Option`s rather than a `clap::Parser` struct itself so [`load`] stays
/// testable without constructing a full CLI invocation.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub token: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub db: Option<PathBuf>,
    pub log_format: Option<LogFormat>,
}

/// Load the daemon config: defaults, then the JSON file (if present),
/// then environment variables, then `overrides` (§1: "CLI flags >
/// environment variables > JSON config file > built-in defaults").
///
/// # Errors
///
/// Returns an error if the config file exists but is not valid JSON, or
/// if `ORBIT_PORT` is set to a non-numeric value.
pub fn load(overrides: &CliOverrides) -> anyhow::Result<DaemonConfig> {
    let config_path = overrides.config_path.clone().or_else(|| std::env::var_os("ORBIT_CONFIG").map(PathBuf::from)).unwrap_or_else(default_config_path);

    let mut config = if config_path.exists() {
        let contents = std::fs::read_to_string(&config_path).with_context(|| format!("reading config file {}", config_path.display()))?;
        let config: DaemonConfig = serde_json::from_str(&contents).with_context(|| format!("parsing config file {}", config_path.display()))?;
        info!(path = %config_path.display(), "loaded config file");
        config
    } else {
        DaemonConfig::default()
    };
    config.loaded_from = Some(config_path);

    apply_env(&mut config).context("applying environment overrides")?;
    apply_overrides(&mut config, overrides);

    Ok(config)
}

fn apply_env(config: &mut DaemonConfig) -> anyhow::Result<()> {
    if let Ok(token) = std::env::var("ORBIT_TOKEN") {
        config.token = Some(token);
    }
    if let Ok(host) = std::env::var("ORBIT_HOST") {
        config.host = host;
    }
    if let Ok(port) = std::env::var("ORBIT_PORT") {
        config.port = port.parse().context("ORBIT_PORT must be a valid port number")?;
    }
    if let Some(db) = std::env::var_os("ORBIT_DB") {
        config.db = PathBuf::from(db);
    }
    Ok(())
}

fn apply_overrides(config: &mut DaemonConfig, overrides: &CliOverrides) {
    if let Some(token) = &overrides.token {
        config.token = Some(token.clone());
    }
    if let Some(host) = &overrides.host {
        config.host = host.clone();
    }
    if let Some(port) = overrides.port {
        config.port = port;
    }
    if let Some(db) = &overrides.db {
        config.db = db.clone();
    }
    if let Some(format) = overrides.log_format {
        config.log_format = format;
    }
}

/// Directory a relative `db`/`uploadDir`/`titleStorePath` path should be
/// created under before first use.
pub fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_no_token() {
        let config = DaemonConfig::default();
        assert!(config.token.is_none());
        assert_eq!(config.port, 8787);
    }

    #[test]
    fn loads_from_a_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"token": "secret", "port": 9000}"#).unwrap();

        let overrides = CliOverrides { config_path: Some(path), ..CliOverrides::default() };
        let config = load(&overrides).unwrap();
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn cli_overrides_win_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"token": "secret", "port": 9000}"#).unwrap();

        let overrides = CliOverrides { config_path: Some(path), port: Some(1234), ..CliOverrides::default() };
        let config = load(&overrides).unwrap();
        assert_eq!(config.port, 1234);
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let overrides = CliOverrides { config_path: Some(PathBuf::from("/nonexistent/orbit-config.json")), ..CliOverrides::default() };
        let config = load(&overrides).unwrap();
        assert_eq!(config.host, default_host());
    }
}
