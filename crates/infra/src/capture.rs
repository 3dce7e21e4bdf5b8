//! Capture discovery and staging.
//!
//! Cameras upload raw captures to
//! `{capture_root}/{code}/{prefix}_{yyyymmdd}/captures/`. The engine expects
//! them under `{staging_root}/{code}/{yyyymm}/`, so each job first links the
//! relevant files there, then checks that the night (or month) actually has
//! data.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::debug;

use skycal_core::{JobDate, LogicalDate};

use crate::settings::Settings;

/// Captures taken before noon belong to the previous observing night.
const NIGHT_BOUNDARY_HOUR: u32 = 12;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("capture staging failed at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

trait IoContext<T> {
    fn at(self, path: &Path) -> Result<T, CaptureError>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, path: &Path) -> Result<T, CaptureError> {
        self.map_err(|source| CaptureError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Outcome of one staging pass.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct StagingReport {
    /// Links created by this pass.
    pub linked: usize,
    /// Files that were already staged.
    pub existing: usize,
}

/// Stages captures and answers "is there data for this job?".
#[derive(Debug, Clone)]
pub struct CaptureLocator {
    capture_root: PathBuf,
    staging_root: PathBuf,
}

impl CaptureLocator {
    pub fn new(capture_root: impl Into<PathBuf>, staging_root: impl Into<PathBuf>) -> Self {
        Self {
            capture_root: capture_root.into(),
            staging_root: staging_root.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.capture_root, &settings.staging_root)
    }

    /// `{staging_root}/{code}/{yyyymm}`.
    pub fn staging_dir(&self, code: &str, month_key: &str) -> PathBuf {
        self.staging_root.join(code).join(month_key)
    }

    /// Stage then check presence.
    pub fn locate(&self, code: &str, job: &JobDate) -> Result<bool, CaptureError> {
        let report = self.stage(code, &job.date())?;
        debug!(
            camera = code,
            date = %job.key(),
            linked = report.linked,
            existing = report.existing,
            "captures staged"
        );
        self.has_data(code, job)
    }

    /// Link the captures `date` needs into the staging tree. Idempotent.
    ///
    /// A day stages itself and the following day, since a night's captures
    /// run past midnight. A month stages every day directory of that month.
    pub fn stage(&self, code: &str, date: &LogicalDate) -> Result<StagingReport, CaptureError> {
        let mut report = StagingReport::default();
        let camera_dir = self.capture_root.join(code);
        if !camera_dir.is_dir() {
            return Ok(report);
        }

        let sources = day_directories(&camera_dir)?;

        match date {
            LogicalDate::Day(day) => {
                let days = [Some(*day), date.next_day()];
                for day in days.into_iter().flatten() {
                    let target = self.staging_dir(code, &day.format("%Y%m").to_string());
                    fs::create_dir_all(&target).at(&target)?;
                    for (_, dir) in sources.iter().filter(|(d, _)| *d == day) {
                        link_captures(&dir.join("captures"), &target, &mut report)?;
                    }
                }
            }
            LogicalDate::Month { .. } => {
                let target = self.staging_dir(code, &date.month_key());
                fs::create_dir_all(&target).at(&target)?;
                for (_, dir) in sources.iter().filter(|(d, _)| date.contains(*d)) {
                    link_captures(&dir.join("captures"), &target, &mut report)?;
                }
            }
        }

        Ok(report)
    }

    /// Whether the staging directory holds data for `job`.
    ///
    /// Monthly jobs only need more than one staged file. Daily jobs need a
    /// capture from their observing night; the first file in name order is
    /// not considered.
    pub fn has_data(&self, code: &str, job: &JobDate) -> Result<bool, CaptureError> {
        let dir = self.staging_dir(code, &job.month_key());
        if !dir.is_dir() {
            return Ok(false);
        }

        let names = sorted_names(&dir)?;
        if job.is_monthly() {
            return Ok(names.len() > 1);
        }

        let night = job.date().first_day();
        Ok(names
            .iter()
            .skip(1)
            .filter_map(|name| capture_timestamp(name))
            .any(|ts| observing_night(ts) == night))
    }
}

/// Timestamp embedded in a capture name: `<prefix>_<yyyymmdd>T<HHMM[SS]>...`.
pub fn capture_timestamp(name: &str) -> Option<NaiveDateTime> {
    let stamp = name.split('_').nth(1)?;
    let (date, time) = stamp.split_once('T')?;
    let day = NaiveDate::parse_from_str(date, "%Y%m%d").ok()?;

    let digits: String = time.chars().take_while(char::is_ascii_digit).take(6).collect();
    let time = match digits.len() {
        6 => NaiveTime::parse_from_str(&digits, "%H%M%S").ok()?,
        4 | 5 => NaiveTime::parse_from_str(&digits[..4], "%H%M").ok()?,
        _ => return None,
    };
    Some(day.and_time(time))
}

/// Observing night a capture belongs to.
pub fn observing_night(ts: NaiveDateTime) -> NaiveDate {
    let boundary = NaiveTime::from_hms_opt(NIGHT_BOUNDARY_HOUR, 0, 0).unwrap_or(NaiveTime::MIN);
    if ts.time() >= boundary {
        ts.date()
    } else {
        ts.date().pred_opt().unwrap_or(ts.date())
    }
}

/// Day directories of a camera (`<prefix>_<yyyymmdd>`), with their dates.
fn day_directories(camera_dir: &Path) -> Result<Vec<(NaiveDate, PathBuf)>, CaptureError> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(camera_dir).at(camera_dir)? {
        let entry = entry.at(camera_dir)?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let day = name
            .to_str()
            .and_then(|n| n.rsplit_once('_'))
            .and_then(|(_, suffix)| NaiveDate::parse_from_str(suffix, "%Y%m%d").ok());
        if let Some(day) = day {
            dirs.push((day, path));
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn link_captures(
    source: &Path,
    target: &Path,
    report: &mut StagingReport,
) -> Result<(), CaptureError> {
    if !source.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(source).at(source)? {
        let entry = entry.at(source)?;
        let dest = target.join(entry.file_name());
        // symlink_metadata so dangling links also count as staged
        if fs::symlink_metadata(&dest).is_ok() {
            report.existing += 1;
            continue;
        }
        symlink(&entry.path(), &dest).at(&dest)?;
        report.linked += 1;
    }
    Ok(())
}

fn sorted_names(dir: &Path) -> Result<Vec<String>, CaptureError> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).at(dir)? {
        let entry = entry.at(dir)?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

#[cfg(unix)]
fn symlink(src: &Path, dest: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dest)
}

#[cfg(windows)]
fn symlink(src: &Path, dest: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(src, dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch_capture(root: &Path, code: &str, day: &str, file: &str) {
        let dir = root.join(code).join(format!("{code}_{day}")).join("captures");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), b"fits").unwrap();
    }

    fn locator(tmp: &Path) -> CaptureLocator {
        CaptureLocator::new(tmp.join("raw"), tmp.join("staging"))
    }

    fn ymd_hm(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn parses_capture_timestamps() {
        assert_eq!(
            capture_timestamp("ITPI01_20240310T221530_UT.fit"),
            Some(ymd_hm(2024, 3, 10, 22, 15) + chrono::Duration::seconds(30))
        );
        assert_eq!(
            capture_timestamp("ITPI01_20240310T0130.fit"),
            Some(ymd_hm(2024, 3, 10, 1, 30))
        );
        assert_eq!(capture_timestamp("README"), None);
        assert_eq!(capture_timestamp("ITPI01_2024T1200.fit"), None);
    }

    #[test]
    fn noon_splits_observing_nights() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        assert_eq!(observing_night(ymd_hm(2024, 3, 10, 11, 59)), d.pred_opt().unwrap());
        assert_eq!(observing_night(ymd_hm(2024, 3, 10, 12, 0)), d);
        assert_eq!(observing_night(ymd_hm(2024, 3, 10, 23, 59)), d);
    }

    #[test]
    fn staging_twice_creates_no_duplicates() {
        let tmp = tempfile::tempdir().unwrap();
        let raw = tmp.path().join("raw");
        touch_capture(&raw, "CAM1", "20240310", "CAM1_20240310T210000.fit");
        touch_capture(&raw, "CAM1", "20240310", "CAM1_20240310T230000.fit");
        touch_capture(&raw, "CAM1", "20240311", "CAM1_20240311T020000.fit");

        let locator = locator(tmp.path());
        let date = LogicalDate::parse("20240310").unwrap();

        let first = locator.stage("CAM1", &date).unwrap();
        assert_eq!(first, StagingReport { linked: 3, existing: 0 });

        let second = locator.stage("CAM1", &date).unwrap();
        assert_eq!(second, StagingReport { linked: 0, existing: 3 });

        let staged = sorted_names(&locator.staging_dir("CAM1", "202403")).unwrap();
        assert_eq!(staged.len(), 3);
    }

    #[test]
    fn last_night_of_month_stages_into_two_months() {
        let tmp = tempfile::tempdir().unwrap();
        let raw = tmp.path().join("raw");
        touch_capture(&raw, "CAM1", "20240229", "CAM1_20240229T200000.fit");
        touch_capture(&raw, "CAM1", "20240301", "CAM1_20240301T030000.fit");

        let locator = locator(tmp.path());
        locator
            .stage("CAM1", &LogicalDate::parse("20240229").unwrap())
            .unwrap();

        assert_eq!(sorted_names(&locator.staging_dir("CAM1", "202402")).unwrap().len(), 1);
        assert_eq!(sorted_names(&locator.staging_dir("CAM1", "202403")).unwrap().len(), 1);
    }

    #[test]
    fn month_stages_only_its_own_days() {
        let tmp = tempfile::tempdir().unwrap();
        let raw = tmp.path().join("raw");
        touch_capture(&raw, "CAM1", "20240301", "a.fit");
        touch_capture(&raw, "CAM1", "20240315", "b.fit");
        touch_capture(&raw, "CAM1", "20240401", "c.fit");

        let locator = locator(tmp.path());
        let report = locator
            .stage("CAM1", &LogicalDate::parse("202403").unwrap())
            .unwrap();
        assert_eq!(report.linked, 2);
    }

    #[test]
    fn daily_presence_uses_observing_night() {
        let tmp = tempfile::tempdir().unwrap();
        let raw = tmp.path().join("raw");
        // sorts first and is ignored by the daily check
        touch_capture(&raw, "CAM1", "20240310", "CAM1_20240310T130000.fit");
        touch_capture(&raw, "CAM1", "20240311", "CAM1_20240311T115900.fit");

        let locator = locator(tmp.path());
        let night = JobDate::resolve("20240310", false).unwrap();
        assert!(locator.locate("CAM1", &night).unwrap());

        let next = JobDate::resolve("20240311", false).unwrap();
        assert!(!locator.locate("CAM1", &next).unwrap());
    }

    #[test]
    fn monthly_presence_needs_more_than_one_file() {
        let tmp = tempfile::tempdir().unwrap();
        let raw = tmp.path().join("raw");
        touch_capture(&raw, "CAM1", "20240305", "a.fit");

        let locator = locator(tmp.path());
        let month = JobDate::resolve("202403", false).unwrap();
        assert!(!locator.locate("CAM1", &month).unwrap());

        touch_capture(&raw, "CAM1", "20240306", "b.fit");
        assert!(locator.locate("CAM1", &month).unwrap());
    }

    #[test]
    fn missing_camera_has_no_data() {
        let tmp = tempfile::tempdir().unwrap();
        let locator = locator(tmp.path());
        let night = JobDate::resolve("20240310", false).unwrap();
        assert!(!locator.locate("CAM1", &night).unwrap());
        assert!(!locator.staging_dir("CAM1", "202403").exists());
    }
}
