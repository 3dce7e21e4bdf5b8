//! Infrastructure layer: collaborator stores, capture staging, the external
//! engine and the calibration job subsystem.

pub mod capture;
pub mod engine;
pub mod history_store;
pub mod jobs;
pub mod program_log;
pub mod registry;
pub mod settings;
pub mod user_config;


pub use capture::{CaptureError, CaptureLocator};
pub use engine::{BannerFilter, CalibrationEngine, EngineConfig, EngineInvocation, EngineOutput, IdlEngine};
pub use history_store::{HistoryStore, HistoryStoreError, InMemoryHistoryStore, JsonFileHistoryStore};
pub use program_log::{LogEntry, LogLevel, MemoryProgramLog, ProgramLog, ProgramLogger, TracingProgramLog};
pub use registry::{CameraRegistry, InMemoryCameraRegistry};
pub use settings::{ConfigParameter, InMemorySettingsStore, Settings, SettingsError, SettingsStore};
pub use user_config::{ConfigFileError, InMemoryUserConfigStore, UserConfigFiles, UserConfigStore};
