//! Single-job calibration state machine.
//!
//! ```text
//! Validating -> HistoryCreated -> DataLocated -> ConfigBuilt -> Processing
//!            -> Verified -> ConfigCleaned -> Succeeded
//! ```
//!
//! Any non-terminal state may fail. A failure is written to the history entry
//! (once one exists), logged once to the program log and returned in the
//! [`JobReport`]; it never propagates further.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info_span, warn};

use skycal_core::{CalibrationError, Camera, ExecutionHistoryEntry, JobDate};

use crate::capture::CaptureLocator;
use crate::engine::{CalibrationEngine, EngineInvocation};
use crate::history_store::HistoryStore;
use crate::program_log::ProgramLogger;
use crate::registry::CameraRegistry;
use crate::settings::Settings;
use crate::user_config::{UserConfigFiles, UserConfigStore};

use super::types::{CalibrationJob, JobReport, JobRunner, JobState};

const INVALID_DATE: &str =
    "Error: The date in your input is incorrect, make sure it is in the format YYYYmmdd or YYYYmm.";
const HISTORY_INSERT_FAILED: &str = "Error: Couldn't create CalibrationExecutionHistory entry on the db.";

/// Collaborators a [`JobExecutor`] is built from.
pub struct ExecutorParts {
    pub settings: Settings,
    pub history: Arc<dyn HistoryStore>,
    pub cameras: Arc<dyn CameraRegistry>,
    pub user_configs: Arc<dyn UserConfigStore>,
    pub engine: Arc<dyn CalibrationEngine>,
    /// Sink and prefix; the acting user is taken from each job.
    pub log: ProgramLogger,
}

/// Runs calibration jobs one at a time.
pub struct JobExecutor {
    settings: Settings,
    history: Arc<dyn HistoryStore>,
    cameras: Arc<dyn CameraRegistry>,
    user_configs: Arc<dyn UserConfigStore>,
    engine: Arc<dyn CalibrationEngine>,
    log: ProgramLogger,
    locator: CaptureLocator,
    config_files: UserConfigFiles,
}

impl JobExecutor {
    pub fn new(parts: ExecutorParts) -> Self {
        let locator = CaptureLocator::from_settings(&parts.settings);
        let config_files = UserConfigFiles::new(&parts.settings.user_config_dir);
        Self {
            settings: parts.settings,
            history: parts.history,
            cameras: parts.cameras,
            user_configs: parts.user_configs,
            engine: parts.engine,
            log: parts.log,
            locator,
            config_files,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cameras(&self) -> &Arc<dyn CameraRegistry> {
        &self.cameras
    }

    pub fn logger(&self) -> &ProgramLogger {
        &self.log
    }

    /// Run `job` to completion.
    pub fn execute(&self, job: &CalibrationJob) -> JobReport {
        let span = info_span!(
            "calibration_job",
            camera = %job.camera_id,
            user_id = %job.user_id,
            date = %job.date,
        );
        let _guard = span.enter();

        let mut run = JobRun {
            history: self.history.as_ref(),
            log: self.log.for_user(job.acting_user),
            state: JobState::Validating,
            entry: None,
        };

        let date = match JobDate::resolve(&job.date, job.monthly) {
            Ok(date) => date,
            Err(e) => {
                return run.fail(CalibrationError::InvalidDate(e.to_string()), None, INVALID_DATE, 1);
            }
        };

        if let Err(report) = self.create_entry(&mut run, job, &date) {
            return report;
        }

        let camera = match self.locate_captures(&mut run, job, &date) {
            Ok(camera) => camera,
            Err(report) => return report,
        };

        if let Err(report) = self.build_config(&mut run, job) {
            return report;
        }

        if let Err(report) = self.process(&mut run, job, &camera, &date) {
            return report;
        }

        if let Err(report) = self.verify(&mut run, &camera, &date) {
            return report;
        }

        self.clean_up(run, job)
    }

    fn create_entry(
        &self,
        run: &mut JobRun<'_>,
        job: &CalibrationJob,
        date: &JobDate,
    ) -> Result<(), JobReport> {
        let fresh = ExecutionHistoryEntry::new(job.camera_id, job.user_id, date);
        if let Err(e) = self.history.insert(&fresh) {
            warn!(error = %e, "history insert failed");
            return Err(run.fail(
                CalibrationError::Persistence(e.to_string()),
                None,
                HISTORY_INSERT_FAILED,
                1,
            ));
        }

        let entry = match self.history.latest_for(job.camera_id, job.user_id) {
            Ok(Some(entry)) if entry.id.is_some() => entry,
            Ok(_) => {
                return Err(run.fail(
                    CalibrationError::Persistence("inserted entry could not be read back".into()),
                    None,
                    HISTORY_INSERT_FAILED,
                    1,
                ));
            }
            Err(e) => {
                return Err(run.fail(
                    CalibrationError::Persistence(e.to_string()),
                    None,
                    HISTORY_INSERT_FAILED,
                    1,
                ));
            }
        };

        let id = entry.id.map(|id| id.to_string()).unwrap_or_default();
        run.entry = Some(entry);
        run.log.info(
            5,
            format!("Successfully created CalibrationExecutionHistory entry with id {id} on the db."),
        );
        run.advance(JobState::HistoryCreated);
        Ok(())
    }

    fn locate_captures(
        &self,
        run: &mut JobRun<'_>,
        job: &CalibrationJob,
        date: &JobDate,
    ) -> Result<Camera, JobReport> {
        let Some(camera) = self.cameras.by_id(job.camera_id) else {
            let msg = format!(
                "Error: Unable to find camera {} in the camera registry.",
                job.camera_id
            );
            return Err(run.fail(CalibrationError::DataNotFound(msg.clone()), Some(&msg), &msg, 2));
        };

        let found = self.locator.locate(&camera.code, date).unwrap_or_else(|e| {
            warn!(error = %e, "capture staging failed");
            false
        });

        if !found {
            let msg = format!(
                "Error: Unable to find captures from camera {} on date {} in the filesystem.",
                camera.code,
                date.display()
            );
            return Err(run.fail(CalibrationError::DataNotFound(msg.clone()), Some(&msg), &msg, 2));
        }

        let staging = self.locator.staging_dir(&camera.code, &date.month_key());
        run.log.info(
            1,
            format!(
                "Found capture from camera {} on date {} in the filesystem at {}/.",
                camera.code,
                date.display(),
                staging.display()
            ),
        );
        run.advance(JobState::DataLocated);
        Ok(camera)
    }

    fn build_config(&self, run: &mut JobRun<'_>, job: &CalibrationJob) -> Result<(), JobReport> {
        let user = job.user_id;
        let overrides = self.user_configs.overrides_for(user);
        if overrides.is_empty() {
            run.log.warning(
                1,
                format!(
                    "Warning: No configuration found for user {user}, proceeding with default configuration."
                ),
            );
        }

        match self.config_files.create(user, &self.settings.defaults, &overrides) {
            Ok(snapshot) => {
                if let Some(entry) = run.entry.as_mut() {
                    entry.set_config_parameters(snapshot);
                }
                run.persist();
                run.log.info(
                    1,
                    format!("Successfully created {} for this user.", UserConfigFiles::file_name(user)),
                );
                run.advance(JobState::ConfigBuilt);
                Ok(())
            }
            Err(e) => Err(run.fail(
                CalibrationError::Config(e.to_string()),
                Some("Error: Unable to create configuration.ini file for this user."),
                &format!(
                    "Error: Unable to create {} file for this user.",
                    UserConfigFiles::file_name(user)
                ),
                1,
            )),
        }
    }

    fn process(
        &self,
        run: &mut JobRun<'_>,
        job: &CalibrationJob,
        camera: &Camera,
        date: &JobDate,
    ) -> Result<(), JobReport> {
        let mode = date.mode();
        run.log.info(
            1,
            format!(
                "Starting {} IDL procedure for camera {} with {}.",
                mode.as_str(),
                camera.code,
                UserConfigFiles::file_name(job.user_id)
            ),
        );
        run.advance(JobState::Processing);

        let invocation = EngineInvocation::for_job(
            camera.code.clone(),
            date,
            self.config_files.path_for(job.user_id),
        );
        let exit_code = match self.engine.run(&invocation) {
            Ok(output) => {
                if let Some(entry) = run.entry.as_mut() {
                    entry.append_output(&output.stdout, &output.stderr);
                }
                debug!(exit_code = ?output.exit_code, "calibration engine finished");
                if output.success() { 0 } else { output.code() }
            }
            Err(e) => {
                warn!(error = %e, "calibration engine could not be started");
                -1
            }
        };

        if exit_code != 0 {
            let msg = format!("Error: Unable to run IDL procedure. Return code: {exit_code}.");
            return Err(run.fail(CalibrationError::Processor { exit_code }, Some(&msg), &msg, 1));
        }

        run.persist();
        run.log.info(
            1,
            format!(
                "{} calibration finished processing camera {} on date {}",
                mode.capitalized(),
                camera.code,
                date.display()
            ),
        );
        Ok(())
    }

    fn verify(&self, run: &mut JobRun<'_>, camera: &Camera, date: &JobDate) -> Result<(), JobReport> {
        let artifact = artifact_path(&self.settings.artifact_root, &camera.code, date);
        if !artifact.is_file() {
            let msg = format!(
                "Error: Unable to generate {} astrometry for camera {} on date {}.",
                date.mode().as_str(),
                camera.code,
                date.display()
            );
            debug!(artifact = %artifact.display(), "expected artifact missing");
            return Err(run.fail(CalibrationError::Verification(msg.clone()), Some(&msg), &msg, 1));
        }

        run.log.info(
            1,
            format!(
                "Camera {} on date {} was successfully {} processed.",
                camera.code,
                date.display(),
                date.mode().as_str()
            ),
        );
        run.advance(JobState::Verified);
        Ok(())
    }

    fn clean_up(&self, mut run: JobRun<'_>, job: &CalibrationJob) -> JobReport {
        let user = job.user_id;
        if let Err(e) = self.config_files.remove(user) {
            let msg = format!(
                "Error: Unable to delete configuration{user}.ini file for this user after successful IDL procedure execution."
            );
            return run.fail(CalibrationError::Cleanup(e.to_string()), Some(&msg), &msg, 1);
        }

        run.log.info(1, format!("File configuration{user}.ini successfully deleted."));
        run.advance(JobState::ConfigCleaned);
        run.advance(JobState::Succeeded);
        JobReport::success(run.entry.and_then(|e| e.id))
    }
}

impl JobRunner for JobExecutor {
    fn run_job(&self, job: &CalibrationJob) -> JobReport {
        self.execute(job)
    }
}

/// Where the engine writes the astrometry solution for `date`.
pub fn artifact_path(artifact_root: &Path, camera_code: &str, date: &JobDate) -> PathBuf {
    artifact_root
        .join(camera_code)
        .join(date.month_key())
        .join(format!("{camera_code}_{}_astro_solution.txt", date.key()))
}

/// Mutable state of one job while it runs.
struct JobRun<'a> {
    history: &'a dyn HistoryStore,
    log: ProgramLogger,
    state: JobState,
    entry: Option<ExecutionHistoryEntry>,
}

impl JobRun<'_> {
    fn advance(&mut self, next: JobState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {next:?}",
            self.state
        );
        debug!(from = ?self.state, to = ?next, "job state");
        self.state = next;
    }

    /// Best effort: the job outcome does not depend on history updates.
    fn persist(&self) {
        if let Some(entry) = &self.entry {
            if let Err(e) = self.history.update(entry) {
                warn!(error = %e, history_id = ?entry.id, "history update failed");
            }
        }
    }

    fn fail(
        &mut self,
        error: CalibrationError,
        entry_text: Option<&str>,
        log_text: &str,
        verbosity: u8,
    ) -> JobReport {
        if let (Some(entry), Some(text)) = (self.entry.as_mut(), entry_text) {
            entry.push_error(text);
        }
        self.persist();
        self.log.error(verbosity, log_text);

        let reached = self.state;
        warn!(state = ?reached, kind = ?error.kind(), "calibration job failed");
        self.advance(JobState::Failed);
        JobReport::failure(reached, self.entry.as_ref().and_then(|e| e.id), error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use skycal_core::{CameraId, FailureKind, HistoryId, UserId};

    use crate::engine::EngineOutput;
    use crate::history_store::{HistoryStoreError, InMemoryHistoryStore};
    use crate::program_log::{LogLevel, MemoryProgramLog};
    use crate::registry::InMemoryCameraRegistry;
    use crate::settings::{self, InMemorySettingsStore};
    use crate::user_config::InMemoryUserConfigStore;

    const OWNER: UserId = UserId::new(7);
    const CAM: CameraId = CameraId::new(1);

    struct Fixture {
        _tmp: tempfile::TempDir,
        root: PathBuf,
        history: Arc<InMemoryHistoryStore>,
        log: Arc<MemoryProgramLog>,
        users: Arc<InMemoryUserConfigStore>,
        cameras: Arc<InMemoryCameraRegistry>,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let root = tmp.path().to_path_buf();
            Self {
                _tmp: tmp,
                root,
                history: InMemoryHistoryStore::arc(),
                log: MemoryProgramLog::arc(),
                users: Arc::new(InMemoryUserConfigStore::new()),
                cameras: Arc::new(InMemoryCameraRegistry::new(vec![Camera::new(
                    CAM, "CAM1", OWNER,
                )])),
            }
        }

        fn settings(&self) -> Settings {
            let store = InMemorySettingsStore::new()
                .with(settings::CAPTURE_ROOT, self.root.join("raw").display().to_string())
                .with(settings::STAGING_ROOT, self.root.join("staging").display().to_string())
                .with(settings::ARTIFACT_ROOT, self.root.join("astro").display().to_string())
                .with(settings::USER_CONFIG_DIR, self.root.join("cfg").display().to_string())
                .with(settings::MAX_RETRY_ATTEMPTS, "3");
            Settings::load(&store).unwrap()
        }

        fn executor(&self, engine: Arc<dyn CalibrationEngine>) -> JobExecutor {
            self.executor_with_history(engine, self.history.clone())
        }

        fn executor_with_history(
            &self,
            engine: Arc<dyn CalibrationEngine>,
            history: Arc<dyn HistoryStore>,
        ) -> JobExecutor {
            JobExecutor::new(ExecutorParts {
                settings: self.settings(),
                history,
                cameras: self.cameras.clone(),
                user_configs: self.users.clone(),
                engine,
                log: ProgramLogger::new(self.log.clone(), "", UserId::new(0)),
            })
        }

        fn capture(&self, day: &str, file: &str) {
            let dir = self.root.join("raw/CAM1").join(format!("CAM1_{day}/captures"));
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(file), b"fits").unwrap();
        }

        fn night_of_captures(&self) {
            self.capture("20240310", "CAM1_20240310T200000.fit");
            self.capture("20240310", "CAM1_20240310T230000.fit");
        }

        /// Engine that writes the expected artifact and exits 0.
        fn producing_engine(&self) -> Arc<dyn CalibrationEngine> {
            let astro = self.root.join("astro");
            Arc::new(move |inv: &EngineInvocation| -> io::Result<EngineOutput> {
                let month = &inv.date[..6];
                let dir = astro.join(&inv.camera_code).join(month);
                fs::create_dir_all(&dir)?;
                fs::write(
                    dir.join(format!("{}_{}_astro_solution.txt", inv.camera_code, inv.date)),
                    b"solution",
                )?;
                Ok(EngineOutput::exited(0).with_output("calibrated\n", "% note\n"))
            })
        }

        fn latest_entry(&self) -> ExecutionHistoryEntry {
            self.history.all().pop().expect("history entry")
        }
    }

    fn exiting_with(code: i32) -> Arc<dyn CalibrationEngine> {
        Arc::new(move |_: &EngineInvocation| -> io::Result<EngineOutput> {
            Ok(EngineOutput::exited(code).with_output("partial\n", "% crash\n"))
        })
    }

    fn job(date: &str) -> CalibrationJob {
        CalibrationJob::new(CAM, OWNER, date, false)
    }

    #[test]
    fn successful_job_walks_every_state() {
        let fx = Fixture::new();
        fx.night_of_captures();
        fx.users.set(OWNER, "fov", "85");
        let executor = fx.executor(fx.producing_engine());

        let report = executor.execute(&job("20240310"));

        assert!(report.succeeded(), "{report:?}");
        assert_eq!(report.reached, JobState::Succeeded);
        assert_eq!(report.history_id, Some(HistoryId::new(1)));

        let entry = fx.latest_entry();
        assert_eq!(entry.stdout, "calibrated\n");
        assert_eq!(entry.stderr, "% note\n");
        assert!(entry.config_parameters.contains(r#""fov":"85""#));
        assert!(!fx.root.join("cfg/configuration_7.ini").exists());

        let staging = fx.root.join("staging/CAM1/202403");
        assert_eq!(
            fx.log.texts(),
            vec![
                "Successfully created CalibrationExecutionHistory entry with id 1 on the db.".to_string(),
                format!(
                    "Found capture from camera CAM1 on date 10-03-2024 in the filesystem at {}/.",
                    staging.display()
                ),
                "Successfully created configuration_7.ini for this user.".to_string(),
                "Starting daily IDL procedure for camera CAM1 with configuration_7.ini.".to_string(),
                "Daily calibration finished processing camera CAM1 on date 10-03-2024".to_string(),
                "Camera CAM1 on date 10-03-2024 was successfully daily processed.".to_string(),
                "File configuration7.ini successfully deleted.".to_string(),
            ]
        );
    }

    #[test]
    fn invalid_date_persists_nothing() {
        let fx = Fixture::new();
        let executor = fx.executor(fx.producing_engine());

        let report = executor.execute(&job("123513135"));

        assert_eq!(report.failure_kind(), Some(FailureKind::InvalidDate));
        assert_eq!(report.reached, JobState::Validating);
        assert!(fx.history.all().is_empty());
        let entries = fx.log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, LogLevel::Error);
        assert_eq!(entries[0].text, INVALID_DATE);
    }

    #[test]
    fn missing_captures_name_camera_and_date() {
        let fx = Fixture::new();
        let executor = fx.executor(fx.producing_engine());

        let report = executor.execute(&job("20240310"));

        assert!(!report.succeeded());
        assert_eq!(report.failure_kind(), Some(FailureKind::DataNotFound));
        let entry = fx.latest_entry();
        assert!(entry.stderr.contains("CAM1"));
        assert!(entry.stderr.contains("10-03-2024"));
        let last = fx.log.entries().pop().unwrap();
        assert_eq!(last.verbosity, 2);
        assert_eq!(
            last.text,
            "Error: Unable to find captures from camera CAM1 on date 10-03-2024 in the filesystem."
        );
    }

    #[test]
    fn unknown_camera_is_data_not_found() {
        let fx = Fixture::new();
        let executor = fx.executor(fx.producing_engine());

        let report = executor.execute(&CalibrationJob::new(CameraId::new(99), OWNER, "20240310", false));
        assert_eq!(report.failure_kind(), Some(FailureKind::DataNotFound));
        assert!(fx.latest_entry().stderr.contains("camera 99"));
    }

    #[test]
    fn engine_exit_code_is_recorded() {
        let fx = Fixture::new();
        fx.night_of_captures();
        let executor = fx.executor(exiting_with(2));

        let report = executor.execute(&job("20240310"));

        assert_eq!(report.error(), Some(&CalibrationError::Processor { exit_code: 2 }));
        assert_eq!(report.reached, JobState::Processing);
        let entry = fx.latest_entry();
        assert!(entry.stderr.contains("Return code: 2"));
        assert_eq!(entry.stdout, "partial\n");
        assert!(entry.stderr.starts_with("% crash\n"));
    }

    #[test]
    fn engine_that_cannot_start_reports_minus_one() {
        let fx = Fixture::new();
        fx.night_of_captures();
        let engine: Arc<dyn CalibrationEngine> =
            Arc::new(|_: &EngineInvocation| -> io::Result<EngineOutput> {
                Err(io::Error::new(io::ErrorKind::NotFound, "idl not installed"))
            });
        let report = fx.executor(engine).execute(&job("20240310"));
        assert_eq!(report.error(), Some(&CalibrationError::Processor { exit_code: -1 }));
    }

    #[test]
    fn missing_artifact_fails_verification() {
        let fx = Fixture::new();
        fx.night_of_captures();
        let executor = fx.executor(exiting_with(0));

        let report = executor.execute(&job("20240310"));

        assert_eq!(report.failure_kind(), Some(FailureKind::Verification));
        let entry = fx.latest_entry();
        assert!(entry
            .stderr
            .contains("Error: Unable to generate daily astrometry for camera CAM1 on date 10-03-2024."));
        assert!(!entry.stderr.contains("Return code"));
    }

    #[test]
    fn missing_user_config_is_only_a_warning() {
        let fx = Fixture::new();
        fx.night_of_captures();
        let report = fx.executor(fx.producing_engine()).execute(&job("20240310"));

        assert!(report.succeeded());
        let warnings: Vec<_> = fx
            .log
            .entries()
            .into_iter()
            .filter(|e| e.level == LogLevel::Warning)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            warnings[0].text,
            "Warning: No configuration found for user 7, proceeding with default configuration."
        );
    }

    #[test]
    fn unwritable_config_dir_is_config_error() {
        let fx = Fixture::new();
        fx.night_of_captures();
        // a file where the config directory should be
        fs::write(fx.root.join("cfg"), b"not a dir").unwrap();

        let report = fx.executor(fx.producing_engine()).execute(&job("20240310"));

        assert_eq!(report.failure_kind(), Some(FailureKind::Config));
        assert!(fx
            .latest_entry()
            .stderr
            .contains("Error: Unable to create configuration.ini file for this user."));
    }

    #[test]
    fn cleanup_failure_fails_a_verified_job() {
        let fx = Fixture::new();
        fx.night_of_captures();
        let cfg = fx.root.join("cfg/configuration_7.ini");
        let produce = fx.producing_engine();
        // the engine removes the transient config itself, so cleanup finds nothing
        let engine: Arc<dyn CalibrationEngine> =
            Arc::new(move |inv: &EngineInvocation| -> io::Result<EngineOutput> {
                fs::remove_file(&cfg)?;
                produce.run(inv)
            });

        let report = fx.executor(engine).execute(&job("20240310"));

        assert_eq!(report.reached, JobState::Verified);
        assert!(report.error().is_some_and(CalibrationError::is_cleanup_only));
        assert!(fx.latest_entry().stderr.contains("after successful IDL procedure execution"));
    }

    #[test]
    fn monthly_job_uses_month_wording_and_paths() {
        let fx = Fixture::new();
        fx.capture("20240305", "CAM1_20240305T200000.fit");
        fx.capture("20240306", "CAM1_20240306T200000.fit");
        let executor = fx.executor(fx.producing_engine());

        let report = executor.execute(&job("202403"));

        assert!(report.succeeded(), "{report:?}");
        assert!(fx.root.join("astro/CAM1/202403/CAM1_202403_astro_solution.txt").exists());
        let texts = fx.log.texts();
        assert!(texts.contains(&"Starting monthly IDL procedure for camera CAM1 with configuration_7.ini.".to_string()));
        assert!(texts.contains(&"Camera CAM1 on date 03-2024 was successfully monthly processed.".to_string()));
        assert!(fx.latest_entry().monthly);
    }

    #[test]
    fn history_insert_failure_is_persistence_error() {
        struct RejectingStore;
        impl HistoryStore for RejectingStore {
            fn insert(&self, _: &ExecutionHistoryEntry) -> Result<(), HistoryStoreError> {
                Err(HistoryStoreError::Poisoned)
            }
            fn update(&self, _: &ExecutionHistoryEntry) -> Result<(), HistoryStoreError> {
                Ok(())
            }
            fn for_camera_user(
                &self,
                _: CameraId,
                _: UserId,
            ) -> Result<Vec<ExecutionHistoryEntry>, HistoryStoreError> {
                Ok(Vec::new())
            }
        }

        let fx = Fixture::new();
        fx.night_of_captures();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let engine: Arc<dyn CalibrationEngine> =
            Arc::new(move |_: &EngineInvocation| -> io::Result<EngineOutput> {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(EngineOutput::exited(0))
            });

        let report = fx
            .executor_with_history(engine, Arc::new(RejectingStore))
            .execute(&job("20240310"));

        assert_eq!(report.failure_kind(), Some(FailureKind::Persistence));
        assert_eq!(report.history_id, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(fx.log.texts(), vec![HISTORY_INSERT_FAILED.to_string()]);
    }

    #[test]
    fn launcher_is_credited_in_program_log() {
        let fx = Fixture::new();
        let executor = fx.executor(fx.producing_engine());
        executor.execute(&job("20240310").on_behalf_of(UserId::new(4)));
        assert!(fx.log.entries().iter().all(|e| e.user_id == UserId::new(4)));
    }

    #[test]
    fn artifact_path_layout() {
        let job = JobDate::resolve("20240310", false).unwrap();
        assert_eq!(
            artifact_path(Path::new("/astro"), "CAM1", &job),
            PathBuf::from("/astro/CAM1/202403/CAM1_20240310_astro_solution.txt")
        );
    }
}
