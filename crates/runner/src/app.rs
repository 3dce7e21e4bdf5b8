//! Service wiring for the standalone runner.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use skycal_infra::jobs::{
    BulkScheduler, BulkSummary, CalibrationJob, ExecutorParts, JobExecutor, JobReport,
    JsonFileRetryStore, RetryQueue,
};
use skycal_infra::{
    CalibrationEngine, CameraRegistry, HistoryStore, IdlEngine, InMemoryCameraRegistry,
    JsonFileHistoryStore, ProgramLog, ProgramLogger, Settings, TracingProgramLog, UserConfigStore,
};

use crate::config::RunnerConfig;

/// Collaborators shared by both commands.
pub struct App {
    settings: Settings,
    history: Arc<dyn HistoryStore>,
    cameras: Arc<dyn CameraRegistry>,
    user_configs: Arc<dyn UserConfigStore>,
    engine: Arc<dyn CalibrationEngine>,
    retry_store: Arc<JsonFileRetryStore>,
    log: ProgramLogger,
}

impl App {
    pub fn from_config(config: &RunnerConfig) -> Result<Self> {
        Self::with_parts(config, Arc::new(TracingProgramLog), None)
    }

    /// Build with an explicit program-log sink and, optionally, engine.
    pub fn with_parts(
        config: &RunnerConfig,
        sink: Arc<dyn ProgramLog>,
        engine: Option<Arc<dyn CalibrationEngine>>,
    ) -> Result<Self> {
        let settings =
            Settings::load(&config.settings_store()).context("loading calibration settings")?;
        let history = JsonFileHistoryStore::open(&config.history_path)
            .with_context(|| format!("opening history store {}", config.history_path.display()))?;
        let engine = match engine {
            Some(engine) => engine,
            None => Arc::new(IdlEngine::new(config.engine_config()?)),
        };

        Ok(Self {
            settings,
            history: Arc::new(history),
            cameras: Arc::new(InMemoryCameraRegistry::new(config.cameras())),
            user_configs: Arc::new(config.user_config_store()?),
            engine,
            retry_store: Arc::new(JsonFileRetryStore::new(&config.retry_queue_path)),
            log: ProgramLogger::new(sink, config.log_message_prefix.clone(), config.launcher_user_id),
        })
    }

    pub fn executor(&self) -> JobExecutor {
        JobExecutor::new(ExecutorParts {
            settings: self.settings.clone(),
            history: self.history.clone(),
            cameras: self.cameras.clone(),
            user_configs: self.user_configs.clone(),
            engine: self.engine.clone(),
            log: self.log.clone(),
        })
    }

    pub fn scheduler(&self) -> BulkScheduler<JobExecutor> {
        let retry = RetryQueue::new(self.retry_store.clone(), self.cameras.clone(), self.log.clone());
        BulkScheduler::new(
            self.executor(),
            self.cameras.clone(),
            retry,
            self.log.clone(),
            self.settings.max_retry_attempts,
        )
    }

    pub fn run_bulk(&self, invoked_on: NaiveDate) -> BulkSummary {
        self.scheduler().run(invoked_on)
    }

    /// One job on behalf of the launching user.
    pub fn run_single(&self, job: CalibrationJob) -> JobReport {
        self.executor().execute(&job.on_behalf_of(self.log.user_id()))
    }
}
