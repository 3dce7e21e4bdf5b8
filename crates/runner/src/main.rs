use std::process::ExitCode;

use anyhow::Result;
use chrono::Local;

use skycal_infra::jobs::CalibrationJob;
use skycal_runner::app::App;
use skycal_runner::cli::{self, Command};
use skycal_runner::config::RunnerConfig;

fn main() -> ExitCode {
    skycal_observability::init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "skycal-runner failed");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let command = cli::parse(std::env::args().skip(1))?;
    if command == Command::Help {
        println!("{}", cli::USAGE);
        return Ok(ExitCode::SUCCESS);
    }

    let config = RunnerConfig::from_env()?;
    let app = App::from_config(&config)?;

    match command {
        Command::Bulk => {
            let summary = app.run_bulk(Local::now().date_naive());
            tracing::info!(
                run_id = %summary.run_id,
                succeeded = summary.succeeded,
                failed = summary.failed,
                "bulk calibration finished"
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Run {
            camera_id,
            user_id,
            date,
            monthly,
        } => {
            let report = app.run_single(CalibrationJob::new(camera_id, user_id, date, monthly));
            match report.error() {
                None => Ok(ExitCode::SUCCESS),
                Some(e) => {
                    tracing::warn!(state = ?report.reached, error = %e, "calibration job failed");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Help => Ok(ExitCode::SUCCESS),
    }
}
