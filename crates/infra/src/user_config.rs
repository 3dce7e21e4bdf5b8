//! Per-user engine configuration.
//!
//! Users may override any system parameter. Before each engine run the merged
//! view is written to `{dir}/configuration_{user}.ini`; the file only lives for
//! the duration of one job.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use skycal_core::UserId;

/// Per-user configuration overrides.
pub trait UserConfigStore: Send + Sync {
    /// Overrides for `user`; empty when the user has none.
    fn overrides_for(&self, user: UserId) -> BTreeMap<String, String>;
}

impl<S> UserConfigStore for Arc<S>
where
    S: UserConfigStore + ?Sized,
{
    fn overrides_for(&self, user: UserId) -> BTreeMap<String, String> {
        (**self).overrides_for(user)
    }
}

/// In-memory override store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryUserConfigStore {
    inner: RwLock<HashMap<UserId, BTreeMap<String, String>>>,
}

impl InMemoryUserConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, user: UserId, name: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut inner) = self.inner.write() {
            inner.entry(user).or_default().insert(name.into(), value.into());
        }
    }
}

impl FromIterator<(UserId, BTreeMap<String, String>)> for InMemoryUserConfigStore {
    fn from_iter<T: IntoIterator<Item = (UserId, BTreeMap<String, String>)>>(iter: T) -> Self {
        Self {
            inner: RwLock::new(iter.into_iter().collect()),
        }
    }
}

impl UserConfigStore for InMemoryUserConfigStore {
    fn overrides_for(&self, user: UserId) -> BTreeMap<String, String> {
        self.inner
            .read()
            .ok()
            .and_then(|inner| inner.get(&user).cloned())
            .unwrap_or_default()
    }
}

/// Transient configuration file error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode configuration snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// Writes and removes `configuration_{user}.ini` files.
#[derive(Debug, Clone)]
pub struct UserConfigFiles {
    dir: PathBuf,
}

impl UserConfigFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(user: UserId) -> String {
        format!("configuration_{user}.ini")
    }

    pub fn path_for(&self, user: UserId) -> PathBuf {
        self.dir.join(Self::file_name(user))
    }

    /// Merge `overrides` onto `defaults`, write the file and return the JSON
    /// snapshot of what was written.
    pub fn create(
        &self,
        user: UserId,
        defaults: &BTreeMap<String, String>,
        overrides: &BTreeMap<String, String>,
    ) -> Result<String, ConfigFileError> {
        let mut merged = defaults.clone();
        merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

        let body: String = std::iter::once("[calibration]\n".to_string())
            .chain(merged.iter().map(|(name, value)| format!("{name} = {value}\n")))
            .collect();

        let path = self.path_for(user);
        fs::create_dir_all(&self.dir)
            .and_then(|_| fs::write(&path, body))
            .map_err(|source| ConfigFileError::Write {
                path: path.clone(),
                source,
            })?;

        Ok(serde_json::to_string(&merged)?)
    }

    pub fn remove(&self, user: UserId) -> Result<(), ConfigFileError> {
        let path = self.path_for(user);
        fs::remove_file(&path).map_err(|source| ConfigFileError::Remove { path, source })
    }
}
