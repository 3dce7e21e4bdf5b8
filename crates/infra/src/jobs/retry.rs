//! Bounded retry of failed calibration jobs.

use std::sync::Arc;

use tracing::{debug, warn};

use skycal_core::{CameraId, JobDate, LogicalDate, UserId};

use crate::program_log::ProgramLogger;
use crate::registry::CameraRegistry;

use super::store::{RetryQueueState, RetryStore, RetryStoreError};
use super::types::{CalibrationJob, JobRunner};

/// Counts from one sweep.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct SweepSummary {
    /// Date records present when the sweep started.
    pub dates: usize,
    /// Jobs actually run (inactive cameras excluded).
    pub attempted: usize,
    pub succeeded: usize,
    /// Records removed because they hit the attempt cap with work left.
    pub dropped: usize,
}

impl SweepSummary {
    pub fn had_pending(&self) -> bool {
        self.dates > 0
    }
}

/// Durable queue of failed jobs.
pub struct RetryQueue {
    store: Arc<dyn RetryStore>,
    cameras: Arc<dyn CameraRegistry>,
    log: ProgramLogger,
}

impl RetryQueue {
    pub fn new(store: Arc<dyn RetryStore>, cameras: Arc<dyn CameraRegistry>, log: ProgramLogger) -> Self {
        Self { store, cameras, log }
    }

    pub fn load_pending(&self) -> Result<RetryQueueState, RetryStoreError> {
        self.store.load()
    }

    /// Queue a failed job. Returns `false` if the pair was already pending for that date.
    pub fn record_failure(
        &self,
        date: &JobDate,
        camera_id: CameraId,
        user_id: UserId,
    ) -> Result<bool, RetryStoreError> {
        let key = date.key();
        let mut added = false;
        self.store.transaction(&mut |state| {
            added = state.record_failure(&key, date.is_monthly(), camera_id, user_id);
        })?;
        debug!(date = %key, camera = %camera_id, user_id = %user_id, added, "recorded failed job");
        Ok(added)
    }

    /// Re-run every pending job once, then bump and prune the records.
    ///
    /// Records are visited in date-key order. A record is dropped when it has
    /// nothing left pending or its attempt counter reaches `max_attempts`.
    /// The queue is written back even when nothing changed.
    pub fn sweep_and_persist(
        &self,
        max_attempts: u32,
        runner: &dyn JobRunner,
    ) -> Result<SweepSummary, RetryStoreError> {
        let mut summary = SweepSummary::default();
        self.store.transaction(&mut |state| {
            summary = self.sweep(state, max_attempts, runner);
        })?;
        Ok(summary)
    }

    fn sweep(&self, state: &mut RetryQueueState, max_attempts: u32, runner: &dyn JobRunner) -> SweepSummary {
        let mut summary = SweepSummary {
            dates: state.len(),
            ..SweepSummary::default()
        };
        let launcher = self.log.user_id();

        for (key, record) in state.records_mut() {
            let display = match LogicalDate::parse(key) {
                Ok(date) => JobDate::new(date, record.is_monthly).display(),
                Err(e) => {
                    warn!(date = %key, error = %e, "retry record has an unreadable date key");
                    key.clone()
                }
            };
            self.log.info(
                5,
                format!(
                    "Re attempting {} calibrations in date {display}, [{} attempts left].",
                    record.camera_data.len(),
                    max_attempts.saturating_sub(record.attempts)
                ),
            );

            let is_monthly = record.is_monthly;
            record.camera_data.retain(|&(camera_id, user_id)| {
                if !self.cameras.is_active(camera_id) {
                    debug!(camera = %camera_id, "camera inactive, keeping job pending");
                    return true;
                }
                summary.attempted += 1;
                let job = CalibrationJob::new(camera_id, user_id, key.as_str(), is_monthly)
                    .on_behalf_of(launcher);
                let done = runner.run_job(&job).succeeded();
                if done {
                    summary.succeeded += 1;
                }
                !done
            });
            record.attempts = record.attempts.saturating_add(1);
        }

        state.retain(|key, record| {
            if record.camera_data.is_empty() {
                return false;
            }
            if record.attempts >= max_attempts {
                warn!(
                    date = %key,
                    attempts = record.attempts,
                    pairs = ?record.camera_data,
                    "dropping retry record at attempt cap"
                );
                summary.dropped += 1;
                return false;
            }
            true
        });

        summary
    }
}
