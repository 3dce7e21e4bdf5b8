//! Error model shared by the calibration domain.

use thiserror::Error;

/// Result type used across the domain layer.
pub type CoreResult<T> = Result<T, CoreError>;

/// Domain-level validation error.
///
/// Raised while turning raw inputs (date strings, identifiers) into typed
/// values. Nothing has been persisted when one of these is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A date string could not be resolved to a day or a month.
    #[error("invalid date: {0}")]
    InvalidDate(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl CoreError {
    pub fn invalid_date(msg: impl Into<String>) -> Self {
        Self::InvalidDate(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}

/// Discriminant of [`CalibrationError`], handy for assertions and metrics labels.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FailureKind {
    InvalidDate,
    Persistence,
    DataNotFound,
    Config,
    Processor,
    Verification,
    Cleanup,
}

/// Why a single calibration job failed.
///
/// Every variant is handled inside the job executor: it is written to the
/// execution-history entry and to the program log, and then returned as part
/// of the job report. None of them abort a bulk run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CalibrationError {
    #[error("invalid date: {0}")]
    InvalidDate(String),

    /// The execution-history entry could not be created.
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("data not found: {0}")]
    DataNotFound(String),

    /// The per-user configuration file could not be built.
    #[error("configuration error: {0}")]
    Config(String),

    /// The calibration engine exited with a non-zero code (or could not run, reported as -1).
    #[error("calibration engine exited with code {exit_code}")]
    Processor { exit_code: i32 },

    /// The engine reported success but its artifact is missing.
    #[error("verification failed: {0}")]
    Verification(String),

    /// Calibration succeeded but the transient configuration could not be removed.
    #[error("cleanup failed: {0}")]
    Cleanup(String),
}

impl CalibrationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidDate(_) => FailureKind::InvalidDate,
            Self::Persistence(_) => FailureKind::Persistence,
            Self::DataNotFound(_) => FailureKind::DataNotFound,
            Self::Config(_) => FailureKind::Config,
            Self::Processor { .. } => FailureKind::Processor,
            Self::Verification(_) => FailureKind::Verification,
            Self::Cleanup(_) => FailureKind::Cleanup,
        }
    }

    /// True when the calibration artifact exists and only housekeeping failed.
    pub fn is_cleanup_only(&self) -> bool {
        matches!(self, Self::Cleanup(_))
    }
}
