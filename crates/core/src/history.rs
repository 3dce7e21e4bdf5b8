//! Execution-history entries: the durable trace of every calibration attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::date::JobDate;
use crate::id::{CameraId, HistoryId, UserId};

/// One calibration attempt as recorded in the history store.
///
/// Created once the job date is valid, then mutated in place as the job moves
/// through its states. Never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionHistoryEntry {
    /// Assigned by the store on insert.
    pub id: Option<HistoryId>,
    pub camera_id: CameraId,
    pub user_id: UserId,
    /// Canonical date key (`yyyymmdd` or `yyyymm`).
    pub date: String,
    pub monthly: bool,
    pub stdout: String,
    pub stderr: String,
    /// JSON snapshot of the configuration handed to the engine.
    pub config_parameters: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl ExecutionHistoryEntry {
    pub fn new(camera_id: CameraId, user_id: UserId, date: &JobDate) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            camera_id,
            user_id,
            date: date.key(),
            monthly: date.is_monthly(),
            stdout: String::new(),
            stderr: String::new(),
            config_parameters: String::new(),
            created_at: now,
            modified_at: now,
        }
    }

    /// Append a line to the error log; a trailing newline is added.
    pub fn push_error(&mut self, message: &str) {
        self.stderr.push_str(message);
        self.stderr.push('\n');
        self.touch();
    }

    pub fn append_output(&mut self, stdout: &str, stderr: &str) {
        self.stdout.push_str(stdout);
        self.stderr.push_str(stderr);
        self.touch();
    }

    pub fn set_config_parameters(&mut self, snapshot: String) {
        self.config_parameters = snapshot;
        self.touch();
    }

    fn touch(&mut self) {
        self.modified_at = Utc::now();
    }
}
