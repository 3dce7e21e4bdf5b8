//! Execution-history storage.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use skycal_core::{CameraId, ExecutionHistoryEntry, HistoryId, UserId};

/// History store abstraction.
///
/// Mirrors the record-factory API of the external database: inserts report
/// success only, and the id of a fresh entry is resolved by reading back the
/// most recent entry of its camera/user pair.
pub trait HistoryStore: Send + Sync {
    /// Insert a new entry. The entry's `id` is ignored and assigned by the store.
    fn insert(&self, entry: &ExecutionHistoryEntry) -> Result<(), HistoryStoreError>;

    /// Replace an existing entry (matched by id).
    fn update(&self, entry: &ExecutionHistoryEntry) -> Result<(), HistoryStoreError>;

    /// Entries of a camera/user pair, oldest first.
    fn for_camera_user(
        &self,
        camera_id: CameraId,
        user_id: UserId,
    ) -> Result<Vec<ExecutionHistoryEntry>, HistoryStoreError>;

    /// Most recent entry of a camera/user pair.
    fn latest_for(
        &self,
        camera_id: CameraId,
        user_id: UserId,
    ) -> Result<Option<ExecutionHistoryEntry>, HistoryStoreError> {
        Ok(self.for_camera_user(camera_id, user_id)?.pop())
    }
}

impl<S> HistoryStore for Arc<S>
where
    S: HistoryStore + ?Sized,
{
    fn insert(&self, entry: &ExecutionHistoryEntry) -> Result<(), HistoryStoreError> {
        (**self).insert(entry)
    }

    fn update(&self, entry: &ExecutionHistoryEntry) -> Result<(), HistoryStoreError> {
        (**self).update(entry)
    }

    fn for_camera_user(
        &self,
        camera_id: CameraId,
        user_id: UserId,
    ) -> Result<Vec<ExecutionHistoryEntry>, HistoryStoreError> {
        (**self).for_camera_user(camera_id, user_id)
    }
}

/// History store error.
#[derive(Debug, thiserror::Error)]
pub enum HistoryStoreError {
    #[error("history entry has no id")]
    MissingId,
    #[error("history entry not found: {0}")]
    NotFound(HistoryId),
    #[error("history store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("history store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("history store lock poisoned")]
    Poisoned,
}

/// Entries plus id allocation; shared by the in-memory and file stores.
#[derive(Debug, Default)]
struct Entries {
    rows: Vec<ExecutionHistoryEntry>,
}

impl Entries {
    fn insert(&mut self, entry: &ExecutionHistoryEntry) {
        let next = self
            .rows
            .iter()
            .filter_map(|e| e.id)
            .map(|id| id.get())
            .max()
            .unwrap_or(0)
            + 1;
        let mut row = entry.clone();
        row.id = Some(HistoryId::new(next));
        self.rows.push(row);
    }

    fn update(&mut self, entry: &ExecutionHistoryEntry) -> Result<(), HistoryStoreError> {
        let id = entry.id.ok_or(HistoryStoreError::MissingId)?;
        let row = self
            .rows
            .iter_mut()
            .find(|e| e.id == Some(id))
            .ok_or(HistoryStoreError::NotFound(id))?;
        *row = entry.clone();
        Ok(())
    }

    fn for_camera_user(&self, camera_id: CameraId, user_id: UserId) -> Vec<ExecutionHistoryEntry> {
        self.rows
            .iter()
            .filter(|e| e.camera_id == camera_id && e.user_id == user_id)
            .cloned()
            .collect()
    }
}

/// In-memory history store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    inner: RwLock<Entries>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Snapshot of every entry, in insertion order.
    pub fn all(&self) -> Vec<ExecutionHistoryEntry> {
        match self.inner.read() {
            Ok(inner) => inner.rows.clone(),
            Err(_) => Vec::new(),
        }
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn insert(&self, entry: &ExecutionHistoryEntry) -> Result<(), HistoryStoreError> {
        let mut inner = self.inner.write().map_err(|_| HistoryStoreError::Poisoned)?;
        inner.insert(entry);
        Ok(())
    }

    fn update(&self, entry: &ExecutionHistoryEntry) -> Result<(), HistoryStoreError> {
        let mut inner = self.inner.write().map_err(|_| HistoryStoreError::Poisoned)?;
        inner.update(entry)
    }

    fn for_camera_user(
        &self,
        camera_id: CameraId,
        user_id: UserId,
    ) -> Result<Vec<ExecutionHistoryEntry>, HistoryStoreError> {
        let inner = self.inner.read().map_err(|_| HistoryStoreError::Poisoned)?;
        Ok(inner.for_camera_user(camera_id, user_id))
    }
}

/// History store backed by a single JSON array on disk.
///
/// The whole file is rewritten on every mutation; meant for the standalone
/// runner, where one bulk run produces a handful of entries.
#[derive(Debug)]
pub struct JsonFileHistoryStore {
    path: PathBuf,
    inner: Mutex<Entries>,
}

impl JsonFileHistoryStore {
    /// Open `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HistoryStoreError> {
        let path = path.as_ref().to_path_buf();
        let rows = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => Vec::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            inner: Mutex::new(Entries { rows }),
        })
    }

    fn flush(&self, entries: &Entries) -> Result<(), HistoryStoreError> {
        let raw = serde_json::to_string_pretty(&entries.rows)?;
        write_atomically(&self.path, raw.as_bytes())?;
        Ok(())
    }
}

impl HistoryStore for JsonFileHistoryStore {
    fn insert(&self, entry: &ExecutionHistoryEntry) -> Result<(), HistoryStoreError> {
        let mut inner = self.inner.lock().map_err(|_| HistoryStoreError::Poisoned)?;
        inner.insert(entry);
        self.flush(&inner)
    }

    fn update(&self, entry: &ExecutionHistoryEntry) -> Result<(), HistoryStoreError> {
        let mut inner = self.inner.lock().map_err(|_| HistoryStoreError::Poisoned)?;
        inner.update(entry)?;
        self.flush(&inner)
    }

    fn for_camera_user(
        &self,
        camera_id: CameraId,
        user_id: UserId,
    ) -> Result<Vec<ExecutionHistoryEntry>, HistoryStoreError> {
        let inner = self.inner.lock().map_err(|_| HistoryStoreError::Poisoned)?;
        Ok(inner.for_camera_user(camera_id, user_id))
    }
}

/// Write `bytes` next to `path` and rename over it.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}
