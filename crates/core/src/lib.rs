//! `skycal-core`: calibration domain building blocks.
//!
//! This crate contains **pure domain** types (no filesystem, process or store
//! access): identifiers, job dates, cameras, history entries and the error
//! model shared by the orchestration layer.

pub mod camera;
pub mod date;
pub mod error;
pub mod history;
pub mod id;

pub use camera::Camera;
pub use date::{is_last_day_of_month, JobDate, LogicalDate, ProcessingMode};
pub use error::{CalibrationError, CoreError, CoreResult, FailureKind};
pub use history::ExecutionHistoryEntry;
pub use id::{CameraId, HistoryId, RunId, UserId};
