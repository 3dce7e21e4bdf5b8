//! Core job types.

use serde::{Deserialize, Serialize};

use skycal_core::{CalibrationError, CameraId, FailureKind, HistoryId, UserId};

/// One calibration attempt for a camera and date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationJob {
    pub camera_id: CameraId,
    /// Owner of the job; their configuration overrides apply.
    pub user_id: UserId,
    /// Raw date input (`yyyymmdd` or `yyyymm`), validated by the executor.
    pub date: String,
    /// Also run the monthly pass. Forced on for month inputs.
    pub monthly: bool,
    /// User program-log events are attributed to.
    pub acting_user: UserId,
}

impl CalibrationJob {
    pub fn new(camera_id: CameraId, user_id: UserId, date: impl Into<String>, monthly: bool) -> Self {
        Self {
            camera_id,
            user_id,
            date: date.into(),
            monthly,
            acting_user: user_id,
        }
    }

    /// Attribute program-log events to `launcher` instead of the owner.
    pub fn on_behalf_of(mut self, launcher: UserId) -> Self {
        self.acting_user = launcher;
        self
    }
}

/// Job execution state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Validating,
    HistoryCreated,
    DataLocated,
    ConfigBuilt,
    Processing,
    Verified,
    ConfigCleaned,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    /// Allowed transitions: one step forward, or to `Failed` from any non-terminal state.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (s, Failed) => !s.is_terminal(),
            (Validating, HistoryCreated)
            | (HistoryCreated, DataLocated)
            | (DataLocated, ConfigBuilt)
            | (ConfigBuilt, Processing)
            | (Processing, Verified)
            | (Verified, ConfigCleaned)
            | (ConfigCleaned, Succeeded) => true,
            _ => false,
        }
    }
}

/// Result of running one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    /// Last state reached before the job ended (`Succeeded` on success).
    pub reached: JobState,
    /// Entry the job wrote to, if it got that far.
    pub history_id: Option<HistoryId>,
    pub outcome: Result<(), CalibrationError>,
}

impl JobReport {
    pub fn success(history_id: Option<HistoryId>) -> Self {
        Self {
            reached: JobState::Succeeded,
            history_id,
            outcome: Ok(()),
        }
    }

    pub fn failure(reached: JobState, history_id: Option<HistoryId>, error: CalibrationError) -> Self {
        Self {
            reached,
            history_id,
            outcome: Err(error),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn error(&self) -> Option<&CalibrationError> {
        self.outcome.as_ref().err()
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error().map(CalibrationError::kind)
    }
}

/// Anything that can run a calibration job to completion.
pub trait JobRunner {
    fn run_job(&self, job: &CalibrationJob) -> JobReport;
}

impl<F> JobRunner for F
where
    F: Fn(&CalibrationJob) -> JobReport,
{
    fn run_job(&self, job: &CalibrationJob) -> JobReport {
        self(job)
    }
}
