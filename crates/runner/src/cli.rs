//! Command line.
//!
//! ```text
//! skycal-runner                                         nightly bulk run
//! skycal-runner run <camera-id> <user-id> <date> [--monthly]
//! ```

use std::str::FromStr;

use anyhow::{Context, Result, bail};

use skycal_core::{CameraId, UserId};

pub const USAGE: &str = "\
usage: skycal-runner
       skycal-runner run <camera-id> <user-id> <yyyymmdd|yyyymm> [--monthly]
       skycal-runner help";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Retry queued failures, then process yesterday for every active camera.
    Bulk,
    /// One job, outside the nightly schedule.
    Run {
        camera_id: CameraId,
        user_id: UserId,
        date: String,
        monthly: bool,
    },
    Help,
}

/// Parse arguments, program name excluded.
pub fn parse<I, S>(args: I) -> Result<Command>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let args: Vec<String> = args.into_iter().map(Into::into).collect();
    let Some((first, rest)) = args.split_first() else {
        return Ok(Command::Bulk);
    };

    match first.as_str() {
        "help" | "-h" | "--help" => Ok(Command::Help),
        "run" => parse_run(rest),
        other => bail!("unknown command {other:?}\n{USAGE}"),
    }
}

fn parse_run(args: &[String]) -> Result<Command> {
    let mut monthly = false;
    let mut positional = Vec::with_capacity(3);
    for arg in args {
        match arg.as_str() {
            "--monthly" | "-m" => monthly = true,
            flag if flag.starts_with('-') => bail!("unknown option {flag:?}\n{USAGE}"),
            value => positional.push(value),
        }
    }

    let [camera, user, date] = positional.as_slice() else {
        bail!("run expects <camera-id> <user-id> <date>\n{USAGE}");
    };

    Ok(Command::Run {
        camera_id: CameraId::from_str(camera).context("camera id")?,
        user_id: UserId::from_str(user).context("user id")?,
        date: date.to_string(),
        monthly,
    })
}
