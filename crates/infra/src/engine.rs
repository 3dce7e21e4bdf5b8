//! External calibration engine.
//!
//! The engine is an IDL procedure run as a child process. Exit code 0 only
//! means the run was accepted; the job executor verifies the produced
//! artifact separately.

use std::io;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use regex::Regex;
use tracing::debug;

use skycal_core::JobDate;

/// Lines of license banner IDL prints on stderr before any real output.
pub const IDL_BANNER_LINES: usize = 8;

/// Arguments of one engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInvocation {
    pub camera_code: String,
    /// Canonical date key (`yyyymmdd` or `yyyymm`).
    pub date: String,
    pub process_image: bool,
    pub process_day: bool,
    pub process_month: bool,
    pub config_file: PathBuf,
}

impl EngineInvocation {
    pub fn for_job(camera_code: impl Into<String>, job: &JobDate, config_file: PathBuf) -> Self {
        Self {
            camera_code: camera_code.into(),
            date: job.key(),
            process_image: true,
            process_day: job.is_day(),
            process_month: job.is_monthly(),
            config_file,
        }
    }
}

/// Captured result of an engine run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    /// Standard error with the engine banner already removed.
    pub stderr: String,
}

impl EngineOutput {
    pub fn exited(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            ..Self::default()
        }
    }

    pub fn with_output(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self.stderr = stderr.into();
        self
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Exit code for reporting; -1 when there is none.
    pub fn code(&self) -> i32 {
        self.exit_code.unwrap_or(-1)
    }
}

/// Runs the calibration engine synchronously.
pub trait CalibrationEngine: Send + Sync {
    /// `Err` only when the engine could not be started at all.
    fn run(&self, invocation: &EngineInvocation) -> io::Result<EngineOutput>;
}

impl<F> CalibrationEngine for F
where
    F: Fn(&EngineInvocation) -> io::Result<EngineOutput> + Send + Sync,
{
    fn run(&self, invocation: &EngineInvocation) -> io::Result<EngineOutput> {
        self(invocation)
    }
}

/// How the engine's stderr banner is recognised.
#[derive(Debug, Clone)]
pub enum BannerFilter {
    /// Drop a fixed number of leading lines.
    Lines(usize),
    /// Drop leading lines while they match.
    Pattern(Regex),
}

impl Default for BannerFilter {
    fn default() -> Self {
        Self::Lines(IDL_BANNER_LINES)
    }
}

impl BannerFilter {
    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::Pattern(Regex::new(pattern)?))
    }

    pub fn strip(&self, stderr: &str) -> String {
        let lines = stderr.split('\n');
        let kept: Vec<&str> = match self {
            Self::Lines(n) => lines.skip(*n).collect(),
            Self::Pattern(re) => lines.skip_while(|line| re.is_match(line)).collect(),
        };
        kept.join("\n")
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interpreter binary.
    pub program: String,
    /// IDL procedure to call.
    pub procedure: String,
    pub banner: BannerFilter,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "idl".to_string(),
            procedure: "calibration".to_string(),
            banner: BannerFilter::default(),
        }
    }
}

/// Engine backed by the IDL interpreter.
#[derive(Debug, Clone, Default)]
pub struct IdlEngine {
    config: EngineConfig,
}

impl IdlEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// IDL statement passed to `-e`.
    pub fn statement(&self, inv: &EngineInvocation) -> String {
        format!(
            "{}, '{}', '{}', process_image={}, process_day={}, process_month={}, config_file='{}'",
            self.config.procedure,
            inv.camera_code,
            inv.date,
            u8::from(inv.process_image),
            u8::from(inv.process_day),
            u8::from(inv.process_month),
            inv.config_file.display(),
        )
    }

    pub fn command(&self, inv: &EngineInvocation) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.arg("-e")
            .arg(self.statement(inv))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl CalibrationEngine for IdlEngine {
    fn run(&self, inv: &EngineInvocation) -> io::Result<EngineOutput> {
        debug!(
            program = %self.config.program,
            statement = %self.statement(inv),
            "starting calibration engine"
        );
        let output = self.command(inv).output()?;
        Ok(EngineOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: self
                .config
                .banner
                .strip(&String::from_utf8_lossy(&output.stderr)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(date: &str, monthly: bool) -> EngineInvocation {
        let job = JobDate::resolve(date, monthly).unwrap();
        EngineInvocation::for_job("ITPI01", &job, PathBuf::from("/tmp/cfg/configuration_4.ini"))
    }

    #[test]
    fn statement_matches_idl_call_convention() {
        let engine = IdlEngine::default();
        assert_eq!(
            engine.statement(&invocation("20240310", false)),
            "calibration, 'ITPI01', '20240310', process_image=1, process_day=1, \
             process_month=0, config_file='/tmp/cfg/configuration_4.ini'"
        );
    }

    #[test]
    fn month_job_skips_day_pass() {
        let inv = invocation("202403", false);
        assert!(!inv.process_day);
        assert!(inv.process_month);
    }

    #[test]
    fn line_banner_drops_fixed_count() {
        let stderr = (1..=10).map(|i| format!("l{i}")).collect::<Vec<_>>().join("\n");
        assert_eq!(BannerFilter::default().strip(&stderr), "l9\nl10");
        assert_eq!(BannerFilter::Lines(3).strip("a\nb"), "");
    }

    #[test]
    fn pattern_banner_drops_matching_prefix_only() {
        let filter = BannerFilter::pattern(r"^(IDL|Licen[sc]e|Installation)").unwrap();
        let stderr = "IDL Version 8.8\nLicense: 123\nInstallation number: 9\n% warning\nLicense again";
        assert_eq!(filter.strip(stderr), "% warning\nLicense again");
    }

    #[cfg(unix)]
    #[test]
    fn runs_a_real_process_and_captures_exit_code() {
        let engine = IdlEngine::new(EngineConfig {
            program: "sh".into(),
            procedure: "unused".into(),
            banner: BannerFilter::Lines(0),
        });
        // `sh -e <statement>` fails to find a script called "<statement>"
        let out = engine.run(&invocation("20240310", false)).unwrap();
        assert!(!out.success());
        assert_ne!(out.code(), 0);
    }

    #[test]
    fn closures_are_engines() {
        let engine = |_: &EngineInvocation| -> io::Result<EngineOutput> {
            Ok(EngineOutput::exited(2).with_output("o", "e"))
        };
        let out = engine.run(&invocation("20240310", false)).unwrap();
        assert_eq!(out.code(), 2);
        assert_eq!(out.stdout, "o");
    }
}
