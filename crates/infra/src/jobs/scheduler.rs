//! Nightly bulk run.
//!
//! One run first re-attempts queued failures, then dispatches a job for
//! every active camera against yesterday's date. The order of program-log
//! lines emitted here is watched by monitoring.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, info_span};

use skycal_core::{JobDate, RunId};

use crate::program_log::ProgramLogger;
use crate::registry::CameraRegistry;

use super::retry::{RetryQueue, SweepSummary};
use super::store::RetryStoreError;
use super::types::{CalibrationJob, JobRunner};

/// Outcome of one bulk run. Retried jobs are not part of the counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkSummary {
    pub run_id: RunId,
    pub succeeded: usize,
    pub failed: usize,
    /// `None` when the retry queue could not be read.
    pub retried: Option<SweepSummary>,
}

impl BulkSummary {
    pub fn counts(&self) -> (usize, usize) {
        (self.succeeded, self.failed)
    }
}

pub struct BulkScheduler<R> {
    runner: R,
    cameras: Arc<dyn CameraRegistry>,
    retry: RetryQueue,
    log: ProgramLogger,
    max_retry_attempts: u32,
}

impl<R: JobRunner> BulkScheduler<R> {
    /// `log` is bound to the launching user; every job runs on their behalf.
    pub fn new(
        runner: R,
        cameras: Arc<dyn CameraRegistry>,
        retry: RetryQueue,
        log: ProgramLogger,
        max_retry_attempts: u32,
    ) -> Self {
        Self {
            runner,
            cameras,
            retry,
            log,
            max_retry_attempts,
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run for the night before `invoked_on`.
    pub fn run(&self, invoked_on: NaiveDate) -> BulkSummary {
        let run_id = RunId::new();
        let span = info_span!("bulk_run", run_id = %run_id, invoked_on = %invoked_on);
        let _guard = span.enter();

        let retried = self.retry_failed();

        let target = JobDate::nightly_target(invoked_on);
        let mut summary = BulkSummary {
            run_id,
            succeeded: 0,
            failed: 0,
            retried,
        };

        let cameras = self.cameras.active_cameras();
        if cameras.is_empty() {
            self.log.info(1, "No cameras to process.");
            return summary;
        }

        let total = cameras.len();
        self.log.info(1, format!("Successfully fetched {total} camera(s)."));
        self.log.info(1, format!("Started bulk calibration processing {total} camera(s)."));

        for (i, camera) in cameras.iter().enumerate() {
            let position = i + 1;
            let job = CalibrationJob::new(camera.id, camera.owner, target.key(), target.is_monthly())
                .on_behalf_of(self.log.user_id());

            if self.runner.run_job(&job).succeeded() {
                summary.succeeded += 1;
                self.log.info(
                    4,
                    format!(
                        "({position}/{total}) Camera {} for user {} was successfully processed.",
                        camera.code, camera.owner
                    ),
                );
                continue;
            }

            summary.failed += 1;
            self.log.error(
                1,
                format!(
                    "({position}/{total}) Camera {} for user {} could not be daily processed.",
                    camera.code, camera.owner
                ),
            );
            if let Err(e) = self.retry.record_failure(&target, camera.id, camera.owner) {
                self.report_store_error(&e);
            }
        }

        let monthly = if target.is_monthly() { "and monthly " } else { "" };
        self.log.info(
            1,
            format!(
                "Finishied daily {monthly}bulk processing {total} camera(s) [{} success(es), {} failure(s)].",
                summary.succeeded, summary.failed
            ),
        );
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            date = %target.key(),
            "bulk run finished"
        );
        summary
    }

    fn retry_failed(&self) -> Option<SweepSummary> {
        let pending = match self.retry.load_pending() {
            Ok(pending) => pending,
            Err(e) => {
                self.report_store_error(&e);
                return None;
            }
        };

        if !pending.is_empty() {
            self.log
                .info(1, "Found previously failed calibrations. Re-attempting calibration.");
        }

        let summary = match self.retry.sweep_and_persist(self.max_retry_attempts, &self.runner) {
            Ok(summary) => summary,
            Err(e) => {
                self.report_store_error(&e);
                return None;
            }
        };

        if summary.had_pending() {
            self.log.info(
                1,
                format!(
                    "Managed to complete {} of {} previously failed calibrations.",
                    summary.succeeded, summary.attempted
                ),
            );
        }
        Some(summary)
    }

    fn report_store_error(&self, error: &RetryStoreError) {
        self.log.error(
            1,
            format!("Error: Unable to update the failed calibrations queue: {error}."),
        );
    }
}
