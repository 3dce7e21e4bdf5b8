//! Calibration job subsystem.
//!
//! ## Components
//!
//! - `JobExecutor`: runs one job through the calibration state machine
//! - `RetryQueue` / `RetryStore`: bounded, durable retry of failed jobs
//! - `BulkScheduler`: the nightly run over the whole active fleet

pub mod executor;
pub mod retry;
pub mod scheduler;
pub mod store;
pub mod types;

pub use executor::{artifact_path, ExecutorParts, JobExecutor};
pub use retry::{RetryQueue, SweepSummary};
pub use scheduler::{BulkScheduler, BulkSummary};
pub use store::{
    InMemoryRetryStore, JsonFileRetryStore, RetryQueueState, RetryRecord, RetryStore,
    RetryStoreError,
};
pub use types::{CalibrationJob, JobReport, JobRunner, JobState};
