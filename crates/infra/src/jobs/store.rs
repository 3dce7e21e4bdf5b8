//! Retry queue storage.
//!
//! The queue is a single document keyed by canonical date:
//!
//! ```json
//! {"20240310": {"is_monthly": 0, "camera_data": [[1, 7], [2, 9]], "attempts": 1}}
//! ```
//!
//! Stores expose a read-modify-write transaction. The file store guards it
//! with an OS advisory lock on a file next to the document; the lock dies
//! with the process that holds it, so a killed run leaves nothing to clean up.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, TryLockError};

use serde::{Deserialize, Serialize};

use skycal_core::{CameraId, UserId};

use crate::history_store::write_atomically;

/// Failed jobs of one date still awaiting a retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryRecord {
    #[serde(with = "int_flag")]
    pub is_monthly: bool,
    /// Pending (camera, owner) pairs, in failure order.
    pub camera_data: Vec<(CameraId, UserId)>,
    /// Starts at 1 on the first failure; bumped once per sweep.
    pub attempts: u32,
}

impl RetryRecord {
    pub fn new(is_monthly: bool) -> Self {
        Self {
            is_monthly,
            camera_data: Vec::new(),
            attempts: 1,
        }
    }

    pub fn contains(&self, camera_id: CameraId, user_id: UserId) -> bool {
        self.camera_data.contains(&(camera_id, user_id))
    }
}

/// The whole retry queue, ordered by date key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetryQueueState {
    records: BTreeMap<String, RetryRecord>,
}

impl RetryQueueState {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn get(&self, date_key: &str) -> Option<&RetryRecord> {
        self.records.get(date_key)
    }

    pub fn records(&self) -> impl Iterator<Item = (&String, &RetryRecord)> {
        self.records.iter()
    }

    pub fn records_mut(&mut self) -> impl Iterator<Item = (&String, &mut RetryRecord)> {
        self.records.iter_mut()
    }

    /// Number of pending pairs across all dates.
    pub fn pending_jobs(&self) -> usize {
        self.records.values().map(|r| r.camera_data.len()).sum()
    }

    /// Queue a failed pair. Returns `false` if it was already pending.
    pub fn record_failure(
        &mut self,
        date_key: &str,
        is_monthly: bool,
        camera_id: CameraId,
        user_id: UserId,
    ) -> bool {
        let record = self
            .records
            .entry(date_key.to_string())
            .or_insert_with(|| RetryRecord::new(is_monthly));
        if record.contains(camera_id, user_id) {
            return false;
        }
        record.camera_data.push((camera_id, user_id));
        true
    }

    /// Keep only the records `keep` accepts.
    pub fn retain(&mut self, keep: impl FnMut(&String, &mut RetryRecord) -> bool) {
        self.records.retain(keep);
    }
}

/// Retry store error.
#[derive(Debug, thiserror::Error)]
pub enum RetryStoreError {
    #[error("retry queue io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("retry queue encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("retry queue is locked by another process ({0})")]
    Locked(PathBuf),
    #[error("retry queue lock poisoned")]
    Poisoned,
}

impl RetryStoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Persistence for the retry queue.
pub trait RetryStore: Send + Sync {
    /// Current state, without taking the transaction lock.
    fn load(&self) -> Result<RetryQueueState, RetryStoreError>;

    /// Read-modify-write under the store's lock. `apply` runs exactly once and
    /// its changes are persisted even when it changes nothing.
    fn transaction(
        &self,
        apply: &mut dyn FnMut(&mut RetryQueueState),
    ) -> Result<(), RetryStoreError>;
}

impl<S> RetryStore for Arc<S>
where
    S: RetryStore + ?Sized,
{
    fn load(&self) -> Result<RetryQueueState, RetryStoreError> {
        (**self).load()
    }

    fn transaction(
        &self,
        apply: &mut dyn FnMut(&mut RetryQueueState),
    ) -> Result<(), RetryStoreError> {
        (**self).transaction(apply)
    }
}

/// In-memory retry store (tests/dev).
#[derive(Debug, Default)]
pub struct InMemoryRetryStore {
    state: Mutex<RetryQueueState>,
}

impl InMemoryRetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: RetryQueueState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl RetryStore for InMemoryRetryStore {
    fn load(&self) -> Result<RetryQueueState, RetryStoreError> {
        self.state
            .lock()
            .map(|s| s.clone())
            .map_err(|_| RetryStoreError::Poisoned)
    }

    fn transaction(
        &self,
        apply: &mut dyn FnMut(&mut RetryQueueState),
    ) -> Result<(), RetryStoreError> {
        let mut state = match self.state.try_lock() {
            Ok(state) => state,
            Err(TryLockError::WouldBlock) => {
                return Err(RetryStoreError::Locked(PathBuf::from("<memory>")));
            }
            Err(TryLockError::Poisoned(_)) => return Err(RetryStoreError::Poisoned),
        };
        apply(&mut *state);
        Ok(())
    }
}

/// Retry queue persisted as a pretty-printed JSON document.
#[derive(Debug, Clone)]
pub struct JsonFileRetryStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonFileRetryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock = path.as_os_str().to_owned();
        lock.push(".lock");
        Self {
            lock_path: PathBuf::from(lock),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    fn read(&self) -> Result<RetryQueueState, RetryStoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RetryQueueState::default()),
            Err(e) => return Err(RetryStoreError::io(&self.path, e)),
        };
        if raw.trim().is_empty() {
            return Ok(RetryQueueState::default());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn write(&self, state: &RetryQueueState) -> Result<(), RetryStoreError> {
        let raw = serde_json::to_string_pretty(state)?;
        write_atomically(&self.path, raw.as_bytes()).map_err(|e| RetryStoreError::io(&self.path, e))
    }
}

impl RetryStore for JsonFileRetryStore {
    fn load(&self) -> Result<RetryQueueState, RetryStoreError> {
        self.read()
    }

    fn transaction(
        &self,
        apply: &mut dyn FnMut(&mut RetryQueueState),
    ) -> Result<(), RetryStoreError> {
        let _lock = LockFile::acquire(&self.lock_path)?;
        let mut state = self.read()?;
        apply(&mut state);
        self.write(&state)
    }
}

/// Exclusive advisory lock on the `.lock` file. The file itself stays on
/// disk; the lock is released when the handle closes or the process exits.
#[derive(Debug)]
struct LockFile {
    _file: File,
}

impl LockFile {
    fn acquire(path: &Path) -> Result<Self, RetryStoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| RetryStoreError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| RetryStoreError::io(path, e))?;
        match file.try_lock() {
            Ok(()) => Ok(Self { _file: file }),
            Err(fs::TryLockError::WouldBlock) => Err(RetryStoreError::Locked(path.to_path_buf())),
            Err(fs::TryLockError::Error(e)) => Err(RetryStoreError::io(path, e)),
        }
    }
}

/// `0`/`1` on disk; booleans accepted on read.
mod int_flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(match Flag::deserialize(deserializer)? {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(cam: i64, user: i64) -> (CameraId, UserId) {
        (CameraId::new(cam), UserId::new(user))
    }

    #[test]
    fn record_failure_is_idempotent_per_pair() {
        let mut state = RetryQueueState::default();
        let (cam, user) = pair(1, 7);

        assert!(state.record_failure("20240310", false, cam, user));
        assert!(!state.record_failure("20240310", false, cam, user));
        assert!(state.record_failure("20240310", false, CameraId::new(2), user));

        let record = state.get("20240310").unwrap();
        assert_eq!(record.attempts, 1);
        assert_eq!(record.camera_data, vec![pair(1, 7), pair(2, 7)]);
        assert_eq!(state.pending_jobs(), 2);
    }

    #[test]
    fn persisted_format_uses_integer_flags() {
        let mut state = RetryQueueState::default();
        state.record_failure("20240229", true, CameraId::new(3), UserId::new(9));

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"20240229": {"is_monthly": 1, "camera_data": [[3, 9]], "attempts": 1}})
        );
    }

    #[test]
    fn boolean_flags_are_accepted_on_read() {
        let state: RetryQueueState = serde_json::from_str(
            r#"{"202403": {"is_monthly": true, "camera_data": [], "attempts": 2},
                "20240310": {"is_monthly": 0, "camera_data": [[1, 7]], "attempts": 1}}"#,
        )
        .unwrap();
        assert!(state.get("202403").unwrap().is_monthly);
        assert!(!state.get("20240310").unwrap().is_monthly);
        let keys: Vec<_> = state.records().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["202403", "20240310"]);
    }

    #[test]
    fn file_store_round_trips_through_transactions() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileRetryStore::new(dir.path().join("failed_calibrations.json"));

        assert!(store.load().unwrap().is_empty());
        for _ in 0..2 {
            store
                .transaction(&mut |state| {
                    state.record_failure("20240310", false, CameraId::new(1), UserId::new(7));
                })
                .unwrap();
        }

        let reopened = JsonFileRetryStore::new(store.path());
        assert_eq!(reopened.load().unwrap().pending_jobs(), 1);
    }

    #[test]
    fn file_store_refuses_concurrent_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileRetryStore::new(dir.path().join("queue.json"));
        let held = LockFile::acquire(store.lock_path()).unwrap();

        let mut ran = false;
        let err = store.transaction(&mut |_| ran = true).unwrap_err();
        assert!(matches!(err, RetryStoreError::Locked(_)));
        assert!(!ran);

        drop(held);
        store.transaction(&mut |_| ran = true).unwrap();
        assert!(ran);
    }

    #[test]
    fn lock_file_left_by_a_killed_run_does_not_block() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileRetryStore::new(dir.path().join("failed_calibrations.json"));
        // A killed run leaves the file behind but no process holds the lock.
        fs::write(store.lock_path(), b"").unwrap();

        for night in ["20240310", "20240311", "20240312"] {
            store
                .transaction(&mut |state| {
                    state.record_failure(night, false, CameraId::new(2), UserId::new(8));
                })
                .unwrap();
        }

        assert_eq!(store.load().unwrap().len(), 3);
        assert!(store.lock_path().exists());
    }

    #[test]
    fn empty_file_reads_as_empty_queue() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        fs::write(&path, b"\n").unwrap();
        assert!(JsonFileRetryStore::new(path).load().unwrap().is_empty());
    }

    #[test]
    fn transaction_persists_even_without_changes() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileRetryStore::new(dir.path().join("queue.json"));
        store.transaction(&mut |_| {}).unwrap();
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "{}");
    }

    #[test]
    fn in_memory_store_applies_in_place() {
        let store = InMemoryRetryStore::new();
        store
            .transaction(&mut |s| {
                s.record_failure("202403", true, CameraId::new(1), UserId::new(1));
            })
            .unwrap();
        assert_eq!(store.load().unwrap().len(), 1);
    }
}
