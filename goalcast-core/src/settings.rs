//! Application settings for Goalcast.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> `MLFLOW_TRACKING_URI` -> `GOALCAST_` environment.

use crate::error::SettingsError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the workspace-level settings file.
pub const WORKSPACE_SETTINGS_FILE: &str = "goalcast.toml";

/// Top-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub tracking: TrackingSettings,
    #[serde(default)]
    pub batch: BatchSettings,
    #[serde(default)]
    pub bridge: BridgeSettings,
}

/// Connection settings for the MLflow tracking server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingSettings {
    /// Base URI of the tracking server, e.g. `http://localhost:5000`.
    #[serde(default = "default_tracking_uri")]
    pub uri: String,
    /// Total request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// TCP connect timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            uri: default_tracking_uri(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl TrackingSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_tracking_uri() -> String {
    "http://localhost:5000".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    5
}

/// How each configuration of a batch is isolated from the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    /// A spawned task per run; panics are contained by the runtime.
    #[default]
    InProcess,
    /// A child `goalcast run <config>` process per run.
    Subprocess,
}

/// Batch runner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Directory holding the experiment configuration files.
    #[serde(default = "default_configs_dir")]
    pub configs_dir: PathBuf,
    /// Reserved index file that is never treated as an experiment.
    #[serde(default = "default_index_file")]
    pub index_file: String,
    /// Pause between consecutive runs in seconds.
    #[serde(default = "default_pause_secs")]
    pub pause_secs: u64,
    #[serde(default)]
    pub isolation: Isolation,
    /// Upper bound on one configuration's run; unset means no limit.
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            configs_dir: default_configs_dir(),
            index_file: default_index_file(),
            pause_secs: default_pause_secs(),
            isolation: Isolation::default(),
            run_timeout_secs: None,
        }
    }
}

impl BatchSettings {
    pub fn pause(&self) -> Duration {
        Duration::from_secs(self.pause_secs)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}

fn default_configs_dir() -> PathBuf {
    PathBuf::from("configs")
}

fn default_index_file() -> String {
    "index.json".to_string()
}

fn default_pause_secs() -> u64 {
    2
}

/// Metrics bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Upper bound on experiments requested from the store.
    #[serde(default = "default_max_experiments")]
    pub max_experiments: usize,
    /// Experiment name that is never exported.
    #[serde(default = "default_excluded_experiment")]
    pub excluded_experiment: String,
    /// Listen address for `serve-metrics`.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            max_experiments: default_max_experiments(),
            excluded_experiment: default_excluded_experiment(),
            bind: default_bind(),
        }
    }
}

fn default_max_experiments() -> usize {
    8
}

fn default_excluded_experiment() -> String {
    "Default".to_string()
}

fn default_bind() -> String {
    "127.0.0.1:9464".to_string()
}

impl Settings {
    /// Check values that deserialize fine but cannot work at runtime.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.tracking.uri.trim().is_empty() {
            return Err(SettingsError::Invalid {
                key: "tracking.uri".into(),
                reason: "must not be empty".into(),
            });
        }
        if url::Url::parse(&self.tracking.uri).is_err() {
            return Err(SettingsError::Invalid {
                key: "tracking.uri".into(),
                reason: format!("'{}' is not an absolute URL", self.tracking.uri),
            });
        }
        if self.bridge.max_experiments == 0 {
            return Err(SettingsError::Invalid {
                key: "bridge.max_experiments".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Effective settings rendered as TOML, for `goalcast settings`.
    pub fn to_toml(&self) -> Result<String, SettingsError> {
        toml::to_string_pretty(self).map_err(|e| SettingsError::Invalid {
            key: "<root>".into(),
            reason: e.to_string(),
        })
    }
}

/// Resolve the layered settings.
///
/// `explicit` replaces the workspace file when given. Environment variables
/// use the `GOALCAST_` prefix with `__` as the nesting separator
/// (`GOALCAST_BATCH__PAUSE_SECS=0`).
pub fn load_settings(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<Settings, SettingsError> {
    let mut figment = Figment::from(Serialized::defaults(Settings::default()));

    // User-level settings
    if let Some(dirs) = directories::ProjectDirs::from("dev", "goalcast", "goalcast") {
        let user_file = dirs.config_dir().join("config.toml");
        if user_file.exists() {
            figment = figment.merge(Toml::file(&user_file));
        }
    }

    // Workspace-level or explicit settings
    match (explicit, workspace) {
        (Some(file), _) => {
            if !file.is_file() {
                return Err(SettingsError::Invalid {
                    key: "--settings".into(),
                    reason: format!("{} does not exist", file.display()),
                });
            }
            figment = figment.merge(Toml::file(file));
        }
        (None, Some(ws)) => {
            let ws_file = ws.join(WORKSPACE_SETTINGS_FILE);
            if ws_file.exists() {
                figment = figment.merge(Toml::file(&ws_file));
            }
        }
        (None, None) => {}
    }

    // Conventional MLflow variable
    figment = figment.merge(
        Env::raw()
            .only(&["MLFLOW_TRACKING_URI"])
            .map(|_| "tracking.uri".into()),
    );

    figment = figment.merge(Env::prefixed("GOALCAST_").split("__"));

    let settings: Settings = figment.extract().map_err(Box::new)?;
    settings.validate()?;
    Ok(settings)
}
