//! Logical dates of calibration jobs.
//!
//! A job targets either one observing night (`yyyymmdd`) or a whole month
//! (`yyyymm`). Day-granular jobs may additionally run the monthly pass, which
//! is what the bulk scheduler does on the last night of every month.

use core::fmt;

use chrono::{Datelike, Days, NaiveDate};

use crate::error::{CoreError, CoreResult};

/// Longest accepted input (`yyyymmdd`).
const MAX_INPUT_LEN: usize = 8;
/// Inputs up to this length are read as `yyyymm`.
const MONTH_INPUT_LEN: usize = 6;

/// Calendar value targeted by a calibration job.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LogicalDate {
    Day(NaiveDate),
    Month { year: i32, month: u32 },
}

impl LogicalDate {
    /// Resolve a raw `yyyymmdd` / `yyyymm` string.
    pub fn parse(input: &str) -> CoreResult<Self> {
        if input.len() > MAX_INPUT_LEN {
            return Err(CoreError::invalid_date(format!(
                "'{input}' is longer than {MAX_INPUT_LEN} characters"
            )));
        }
        if !input.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::invalid_date(format!("'{input}' is not numeric")));
        }

        if input.len() <= MONTH_INPUT_LEN {
            // chrono needs a day to build a date; pin it to the first.
            let first = NaiveDate::parse_from_str(&format!("{input}-01"), "%Y%m-%d")
                .map_err(|e| CoreError::invalid_date(format!("'{input}' is not yyyymm: {e}")))?;
            Ok(Self::Month {
                year: first.year(),
                month: first.month(),
            })
        } else {
            NaiveDate::parse_from_str(input, "%Y%m%d")
                .or_else(|e| short_month_day(input).ok_or(e))
                .map(Self::Day)
                .map_err(|e| CoreError::invalid_date(format!("'{input}' is not yyyymmdd: {e}")))
        }
    }

    pub fn is_day(&self) -> bool {
        matches!(self, Self::Day(_))
    }

    /// First calendar day covered by this date.
    pub fn first_day(&self) -> NaiveDate {
        match *self {
            Self::Day(d) => d,
            Self::Month { year, month } => {
                // Month values only come from a successful parse.
                NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
            }
        }
    }

    /// Canonical key: `yyyymmdd` for a day, `yyyymm` for a month.
    pub fn key(&self) -> String {
        match self {
            Self::Day(d) => d.format("%Y%m%d").to_string(),
            Self::Month { year, month } => format!("{year:04}{month:02}"),
        }
    }

    /// `yyyymm` of the month this date falls in.
    pub fn month_key(&self) -> String {
        self.first_day().format("%Y%m").to_string()
    }

    /// Following night, for day-granular dates only.
    pub fn next_day(&self) -> Option<NaiveDate> {
        match self {
            Self::Day(d) => d.checked_add_days(Days::new(1)),
            Self::Month { .. } => None,
        }
    }

    /// Whether `day` falls inside this logical date.
    pub fn contains(&self, day: NaiveDate) -> bool {
        match *self {
            Self::Day(d) => d == day,
            Self::Month { year, month } => day.year() == year && day.month() == month,
        }
    }

    /// Human-readable form used in log lines: `dd-mm-yyyy`, or `mm-yyyy` when `monthly`.
    pub fn display(&self, monthly: bool) -> String {
        let first = self.first_day();
        if monthly || !self.is_day() {
            first.format("%m-%Y").to_string()
        } else {
            first.format("%d-%m-%Y").to_string()
        }
    }
}

impl fmt::Display for LogicalDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Which passes the calibration engine runs for a job.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProcessingMode {
    Daily,
    Monthly,
    MonthlyAndDaily,
}

impl ProcessingMode {
    /// Lower-case wording used mid-sentence ("successfully monthly and daily processed").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
            Self::MonthlyAndDaily => "monthly and daily",
        }
    }

    /// Sentence-initial wording ("Monthly and daily calibration finished ...").
    pub fn capitalized(&self) -> &'static str {
        match self {
            Self::Daily => "Daily",
            Self::Monthly => "Monthly",
            Self::MonthlyAndDaily => "Monthly and daily",
        }
    }
}

/// A validated job date plus its monthly flag.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct JobDate {
    date: LogicalDate,
    monthly: bool,
}

impl JobDate {
    /// Validate `input`; month-granular input always forces the monthly flag.
    pub fn resolve(input: &str, monthly: bool) -> CoreResult<Self> {
        let date = LogicalDate::parse(input)?;
        Ok(Self::new(date, monthly))
    }

    pub fn new(date: LogicalDate, monthly: bool) -> Self {
        Self {
            date,
            monthly: monthly || !date.is_day(),
        }
    }

    /// Date processed by a bulk run invoked on `invoked_on`: the night before,
    /// with the monthly pass enabled on the last day of a month.
    pub fn nightly_target(invoked_on: NaiveDate) -> Self {
        let target = invoked_on.pred_opt().unwrap_or(invoked_on);
        Self::new(LogicalDate::Day(target), is_last_day_of_month(target))
    }

    pub fn date(&self) -> LogicalDate {
        self.date
    }

    pub fn is_monthly(&self) -> bool {
        self.monthly
    }

    pub fn is_day(&self) -> bool {
        self.date.is_day()
    }

    pub fn key(&self) -> String {
        self.date.key()
    }

    pub fn month_key(&self) -> String {
        self.date.month_key()
    }

    pub fn display(&self) -> String {
        self.date.display(self.monthly)
    }

    pub fn mode(&self) -> ProcessingMode {
        match (self.monthly, self.date.is_day()) {
            (false, _) => ProcessingMode::Daily,
            (true, false) => ProcessingMode::Monthly,
            (true, true) => ProcessingMode::MonthlyAndDaily,
        }
    }
}

/// Seven digits read as a one-digit month and two-digit day (`2024131` is
/// 31 January). Only tried once the two-digit month reading has failed.
fn short_month_day(input: &str) -> Option<NaiveDate> {
    if input.len() != MAX_INPUT_LEN - 1 {
        return None;
    }
    let year = input.get(..4)?.parse().ok()?;
    let month = input.get(4..5)?.parse().ok()?;
    let day = input.get(5..)?.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// True when `day` is the last calendar day of its month.
pub fn is_last_day_of_month(day: NaiveDate) -> bool {
    day.succ_opt().is_none_or(|next| next.month() != day.month())
}
