//! Application-level configuration loading, including the avatar palette and
//! session policy knobs.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "PREDICT_PARTY_CONFIG_PATH";

const DEFAULT_CAPACITY: usize = 5;
const DEFAULT_REAPER_INTERVAL_SECS: u64 = 60;
const DEFAULT_INACTIVITY_TTL_SECS: u64 = 120;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Cyclic palette used to derive avatar tags from join order.
    pub avatar_palette: Vec<String>,
    /// Predictor slots allocated when a create request does not specify one.
    pub default_capacity: usize,
    /// Whether joins past capacity are admitted as read-only spectators.
    /// When disabled, a full session rejects further joins outright.
    pub allow_spectators: bool,
    /// Period between inactivity sweeps.
    pub reaper_interval: Duration,
    /// Age past which an unsubmitted predictor is evicted.
    pub inactivity_ttl: Duration,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        palette = config.avatar_palette.len(),
                        capacity = config.default_capacity,
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            avatar_palette: default_palette(),
            default_capacity: DEFAULT_CAPACITY,
            allow_spectators: true,
            reaper_interval: Duration::from_secs(DEFAULT_REAPER_INTERVAL_SECS),
            inactivity_ttl: Duration::from_secs(DEFAULT_INACTIVITY_TTL_SECS),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    avatar_palette: Option<Vec<String>>,
    default_capacity: Option<usize>,
    allow_spectators: Option<bool>,
    reaper_interval_secs: Option<u64>,
    inactivity_ttl_secs: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            avatar_palette: value
                .avatar_palette
                .filter(|palette| !palette.is_empty())
                .unwrap_or(defaults.avatar_palette),
            default_capacity: value
                .default_capacity
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.default_capacity),
            allow_spectators: value.allow_spectators.unwrap_or(defaults.allow_spectators),
            reaper_interval: value
                .reaper_interval_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.reaper_interval),
            inactivity_ttl: value
                .inactivity_ttl_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.inactivity_ttl),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in avatar palette shipped with the binary.
fn default_palette() -> Vec<String> {
    ["#007bff", "#28a745", "#dc3545", "#ffc107", "#17a2b8"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}
