//! Configuration file – reads/writes `~/.spine/config.toml`.

use serde::{Deserialize, Serialize};
use spine_runtime::{AdapterMode, PipelineConfig};
use spine_types::ClusterType;
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted user configuration stored in `~/.spine/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// SQLite file the ledger is archived to after every `spine run`.
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,

    /// Reject intents whose deadline exceeds this many seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_deadline_seconds: Option<f64>,

    /// Require an `AUTHORITY user:` statement on every intent.
    #[serde(default)]
    pub require_user_authority: bool,

    /// `simulated` runs any cluster; `registry` only those in `clusters`.
    #[serde(default)]
    pub adapter_mode: AdapterMode,

    /// Cluster types given an adapter in `registry` mode.
    #[serde(default = "default_clusters")]
    pub clusters: Vec<ClusterType>,
}

fn default_ledger_path() -> PathBuf {
    spine_dir(&home_dir()).join("ledger.db")
}

fn default_clusters() -> Vec<ClusterType> {
    ClusterType::KNOWN.to_vec()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ledger_path: default_ledger_path(),
            max_deadline_seconds: None,
            require_user_authority: false,
            adapter_mode: AdapterMode::default(),
            clusters: default_clusters(),
        }
    }
}

impl Config {
    /// Library settings for [`spine_runtime::Pipeline::with_ledger`].
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            adapter_mode: self.adapter_mode,
            clusters: self.clusters.clone(),
            max_deadline_seconds: self.max_deadline_seconds,
            require_user_authority: self.require_user_authority,
        }
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

fn spine_dir(home: &str) -> PathBuf {
    PathBuf::from(home).join(".spine")
}

/// Return the path to `~/.spine/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    spine_dir(home).join("config.toml")
}

/// Load the config from `path` and apply `SPINE_*` overrides.
pub fn load(path: &Path) -> Result<Config, String> {
    let mut cfg = load_from(path)?;
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config from `path`, falling back to defaults when the file
/// does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))
}

/// Apply `SPINE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SPINE_LEDGER_PATH` | `ledger_path` |
/// | `SPINE_MAX_DEADLINE` | `max_deadline_seconds` |
/// | `SPINE_ADAPTER_MODE` | `adapter_mode` (`simulated` / `registry`) |
/// | `SPINE_CLUSTERS` | `clusters` (comma-separated) |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SPINE_LEDGER_PATH") {
        cfg.ledger_path = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("SPINE_MAX_DEADLINE")
        && let Ok(seconds) = v.parse::<f64>()
        && seconds > 0.0
    {
        cfg.max_deadline_seconds = Some(seconds);
    }
    if let Ok(v) = std::env::var("SPINE_ADAPTER_MODE") {
        match v.to_ascii_lowercase().as_str() {
            "simulated" => cfg.adapter_mode = AdapterMode::Simulated,
            "registry" => cfg.adapter_mode = AdapterMode::Registry,
            _ => {}
        }
    }
    if let Ok(v) = std::env::var("SPINE_CLUSTERS") {
        let clusters: Vec<ClusterType> = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| ClusterType::from(s.to_string()))
            .collect();
        if !clusters.is_empty() {
            cfg.clusters = clusters;
        }
    }
}

/// Create the directory that will hold `path`.
///
/// Only a directory created here is restricted to `0o700`; an existing
/// parent keeps its mode. A bare file name needs no directory.
fn prepare_parent(path: &Path) -> Result<(), String> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    if parent.exists() {
        return Ok(());
    }
    fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
            .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
    }
    Ok(())
}

/// Save the config to `path`, creating its directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    prepare_parent(path)?;
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
