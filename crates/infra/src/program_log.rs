//! Program log: the leveled, user-attributed event stream monitored downstream.
//!
//! This is distinct from diagnostic `tracing` output. Message texts, levels,
//! verbosities and ordering are consumed by monitoring and must stay stable.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use skycal_core::UserId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

/// One program-log event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    /// 1 = always shown, higher = more detailed.
    pub verbosity: u8,
    /// User the event is attributed to.
    pub user_id: UserId,
    /// Full text, prefix included.
    pub text: String,
}

/// Append-only sink for program-log events.
pub trait ProgramLog: Send + Sync {
    fn record(&self, entry: LogEntry);
}

impl<L> ProgramLog for Arc<L>
where
    L: ProgramLog + ?Sized,
{
    fn record(&self, entry: LogEntry) {
        (**self).record(entry)
    }
}

/// Forwards program-log events to `tracing`.
#[derive(Debug, Default, Copy, Clone)]
pub struct TracingProgramLog;

impl ProgramLog for TracingProgramLog {
    fn record(&self, entry: LogEntry) {
        let LogEntry {
            level,
            verbosity,
            user_id,
            text,
            ..
        } = entry;
        let program_level = level.as_str();
        match level {
            LogLevel::Info => tracing::info!(program_level, verbosity, user_id = %user_id, "{text}"),
            LogLevel::Warning => {
                tracing::warn!(program_level, verbosity, user_id = %user_id, "{text}")
            }
            LogLevel::Error => {
                tracing::error!(program_level, verbosity, user_id = %user_id, "{text}")
            }
        }
    }
}

/// Collects events in memory (tests, run transcripts).
#[derive(Debug, Default)]
pub struct MemoryProgramLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryProgramLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(_) => Vec::new(),
        }
    }

    /// Texts only, in emission order.
    pub fn texts(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.text).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl ProgramLog for MemoryProgramLog {
    fn record(&self, entry: LogEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }
}

/// A sink bound to a message prefix and an acting user.
#[derive(Clone)]
pub struct ProgramLogger {
    sink: Arc<dyn ProgramLog>,
    prefix: Arc<str>,
    user_id: UserId,
}

impl std::fmt::Debug for ProgramLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramLogger")
            .field("prefix", &self.prefix)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl ProgramLogger {
    pub fn new(sink: Arc<dyn ProgramLog>, prefix: impl Into<String>, user_id: UserId) -> Self {
        Self {
            sink,
            prefix: Arc::from(prefix.into()),
            user_id,
        }
    }

    /// Same sink and prefix, attributed to another user.
    pub fn for_user(&self, user_id: UserId) -> Self {
        Self {
            user_id,
            ..self.clone()
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn log(&self, level: LogLevel, verbosity: u8, text: impl AsRef<str>) {
        self.sink.record(LogEntry {
            at: Utc::now(),
            level,
            verbosity,
            user_id: self.user_id,
            text: format!("{}{}", self.prefix, text.as_ref()),
        });
    }

    pub fn info(&self, verbosity: u8, text: impl AsRef<str>) {
        self.log(LogLevel::Info, verbosity, text)
    }

    pub fn warning(&self, verbosity: u8, text: impl AsRef<str>) {
        self.log(LogLevel::Warning, verbosity, text)
    }

    pub fn error(&self, verbosity: u8, text: impl AsRef<str>) {
        self.log(LogLevel::Error, verbosity, text)
    }
}
