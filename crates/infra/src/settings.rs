//! System configuration parameters.
//!
//! The configuration store is a flat list of name/value pairs owned by an
//! external system. [`Settings`] decodes the ones the scheduler needs once, so
//! a missing key surfaces before any camera is processed.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// Root of the raw capture tree (`{root}/{camera}/{prefix}_{yyyymmdd}/captures`).
pub const CAPTURE_ROOT: &str = "root_path";
/// Root of the per-month staging tree handed to the engine.
pub const STAGING_ROOT: &str = "cp_dir_captures";
/// Root the engine writes astrometry solutions to.
pub const ARTIFACT_ROOT: &str = "cp_dir_astrometry";
/// Directory for transient `configuration_{user}.ini` files.
pub const USER_CONFIG_DIR: &str = "cp_tmp_user_config_path";
/// Sweeps a retry record survives before it is dropped.
pub const MAX_RETRY_ATTEMPTS: &str = "calibration_max_failed_retry_attempts";

/// A single system configuration parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigParameter {
    pub name: String,
    pub value: String,
}

impl ConfigParameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Read-only key/value configuration store.
pub trait SettingsStore: Send + Sync {
    /// All parameters, in store order.
    fn parameters(&self) -> Vec<ConfigParameter>;

    /// Value of a single parameter.
    fn get(&self, name: &str) -> Option<String> {
        self.parameters()
            .into_iter()
            .find(|p| p.name == name)
            .map(|p| p.value)
    }
}

impl<S> SettingsStore for Arc<S>
where
    S: SettingsStore + ?Sized,
{
    fn parameters(&self) -> Vec<ConfigParameter> {
        (**self).parameters()
    }

    fn get(&self, name: &str) -> Option<String> {
        (**self).get(name)
    }
}

/// Settings decoding error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("missing configuration parameter: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Typed view over the parameters the scheduler depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub capture_root: PathBuf,
    pub staging_root: PathBuf,
    pub artifact_root: PathBuf,
    pub user_config_dir: PathBuf,
    pub max_retry_attempts: u32,
    /// Every parameter in the store; the defaults user overrides are merged onto.
    pub defaults: BTreeMap<String, String>,
}

impl Settings {
    pub fn load(store: &dyn SettingsStore) -> Result<Self, SettingsError> {
        let defaults: BTreeMap<String, String> = store
            .parameters()
            .into_iter()
            .map(|p| (p.name, p.value))
            .collect();

        let path = |name: &'static str| -> Result<PathBuf, SettingsError> {
            defaults
                .get(name)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .ok_or(SettingsError::Missing(name))
        };

        let capture_root = path(CAPTURE_ROOT)?;
        let staging_root = path(STAGING_ROOT)?;
        let artifact_root = path(ARTIFACT_ROOT)?;
        let user_config_dir = path(USER_CONFIG_DIR)?;

        let raw_attempts = defaults
            .get(MAX_RETRY_ATTEMPTS)
            .ok_or(SettingsError::Missing(MAX_RETRY_ATTEMPTS))?;
        let max_retry_attempts =
            raw_attempts
                .trim()
                .parse::<u32>()
                .map_err(|_| SettingsError::Invalid {
                    name: MAX_RETRY_ATTEMPTS,
                    value: raw_attempts.clone(),
                })?;

        Ok(Self {
            capture_root,
            staging_root,
            artifact_root,
            user_config_dir,
            max_retry_attempts,
            defaults,
        })
    }
}

/// In-memory configuration store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
    params: RwLock<Vec<ConfigParameter>>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a parameter.
    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        let param = ConfigParameter::new(name, value);
        if let Ok(mut params) = self.params.write() {
            match params.iter_mut().find(|p| p.name == param.name) {
                Some(existing) => existing.value = param.value,
                None => params.push(param),
            }
        }
    }

    pub fn with(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }
}

impl FromIterator<(String, String)> for InMemorySettingsStore {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let store = Self::new();
        for (name, value) in iter {
            store.set(name, value);
        }
        store
    }
}

impl SettingsStore for InMemorySettingsStore {
    fn parameters(&self) -> Vec<ConfigParameter> {
        match self.params.read() {
            Ok(params) => params.clone(),
            Err(_) => Vec::new(),
        }
    }
}
