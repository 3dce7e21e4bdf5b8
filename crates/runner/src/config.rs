//! Runner configuration file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Deserialize;

use skycal_core::{Camera, CameraId, UserId};
use skycal_infra::{BannerFilter, EngineConfig, InMemorySettingsStore, InMemoryUserConfigStore};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "SKYCAL_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "procedures_config.json";

#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    /// Prepended to every program-log message.
    #[serde(default)]
    pub log_message_prefix: String,
    /// User that program-log events are attributed to.
    pub launcher_user_id: UserId,
    #[serde(default = "default_retry_queue_path")]
    pub retry_queue_path: PathBuf,
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,
    /// Configuration-store parameters (paths, retry cap, config defaults).
    pub settings: BTreeMap<String, String>,
    #[serde(default)]
    pub cameras: Vec<CameraEntry>,
    /// Per-user overrides, keyed by user id.
    #[serde(default)]
    pub user_configs: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub engine: EngineSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraEntry {
    pub id: CameraId,
    pub code: String,
    pub owner: UserId,
    #[serde(default = "enabled")]
    pub active: bool,
}

impl From<CameraEntry> for Camera {
    fn from(entry: CameraEntry) -> Self {
        Camera {
            id: entry.id,
            code: entry.code,
            active: entry.active,
            owner: entry.owner,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineSection {
    pub program: Option<String>,
    pub procedure: Option<String>,
    /// Leading stderr lines to drop.
    pub banner_lines: Option<usize>,
    /// Drop leading stderr lines matching this instead.
    pub banner_pattern: Option<String>,
}

fn default_retry_queue_path() -> PathBuf {
    PathBuf::from("failed_calibrations.json")
}

fn default_history_path() -> PathBuf {
    PathBuf::from("calibration_history.json")
}

fn enabled() -> bool {
    true
}

impl RunnerConfig {
    /// Load from `$SKYCAL_CONFIG`, or `procedures_config.json`.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(path)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading runner config {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing runner config {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn settings_store(&self) -> InMemorySettingsStore {
        self.settings.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn cameras(&self) -> Vec<Camera> {
        self.cameras.iter().cloned().map(Camera::from).collect()
    }

    pub fn user_config_store(&self) -> Result<InMemoryUserConfigStore> {
        let store = InMemoryUserConfigStore::new();
        for (user, overrides) in &self.user_configs {
            let user = UserId::from_str(user).with_context(|| format!("user_configs key {user:?}"))?;
            for (name, value) in overrides {
                store.set(user, name.clone(), value.clone());
            }
        }
        Ok(store)
    }

    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = EngineConfig::default();
        if let Some(program) = &self.engine.program {
            config.program = program.clone();
        }
        if let Some(procedure) = &self.engine.procedure {
            config.procedure = procedure.clone();
        }
        if let Some(lines) = self.engine.banner_lines {
            config.banner = BannerFilter::Lines(lines);
        }
        if let Some(pattern) = &self.engine.banner_pattern {
            config.banner = BannerFilter::pattern(pattern)
                .with_context(|| format!("invalid engine.banner_pattern {pattern:?}"))?;
        }
        Ok(config)
    }
}
