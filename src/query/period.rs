use std::sync::LazyLock;

use chrono::{Datelike, Days, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use regex::Regex;
use serde::Serialize;

use crate::date_util::{last_day_of_month, quarter_of, whole_days_between};
use crate::error::{Error, Result};

static RE_QUARTER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-Q([1-4])$").unwrap());
static RE_WEEK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-W(\d{1,2})$").unwrap());
static RE_MONTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());

/// An inclusive `[start, end]` range of timestamps used to scope aggregations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl DateWindow {
    /// Build a window, rejecting one that ends before it starts.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        if end < start {
            return Err(Error::InvalidInput(format!(
                "window end {end} is before start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The `days` days leading up to and including `end`.
    pub fn trailing_days(end: NaiveDateTime, days: u32) -> Result<Self> {
        Ok(Self {
            start: days_before(end, days)?,
            end,
        })
    }

    /// Fill in missing bounds: `end` defaults to `now`, `start` to
    /// `default_days` before `end`.
    pub fn resolve(
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
        default_days: u32,
        now: NaiveDateTime,
    ) -> Result<Self> {
        let end = end.unwrap_or(now);
        let start = match start {
            Some(start) => start,
            None => days_before(end, default_days)?,
        };
        Self::new(start, end)
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn contains(&self, t: NaiveDateTime) -> bool {
        t >= self.start && t <= self.end
    }

    /// Whole days spanned by the window.
    pub fn whole_days(&self) -> i64 {
        whole_days_between(self.start, self.end)
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} .. {}",
            self.start.format("%Y-%m-%d %H:%M"),
            self.end.format("%Y-%m-%d %H:%M")
        )
    }
}

/// A reporting period that resolves to a [`DateWindow`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Period {
    Year(i32),
    Quarter(i32, u8),
    Month(i32, u8),
    Week(i32, u8),
    /// Trailing N days through the evaluation instant.
    Rolling(u32),
    YearToDate(i32),
    QuarterToDate(i32, u8),
    MonthToDate(i32, u8),
}

impl Period {
    /// Parse a period string relative to the local wall clock.
    pub fn parse(s: &str) -> Result<Self> {
        Self::parse_as_of(s, chrono::Local::now().date_naive())
    }

    /// Parse a period string.
    ///
    /// Supported formats:
    /// - `2025`: year
    /// - `2025-Q1`: quarter
    /// - `2025-01`: month
    /// - `2025-W05`: ISO week
    /// - `30d`: rolling last N days
    /// - `ytd`, `qtd`, `mtd`: current year/quarter/month to date
    pub fn parse_as_of(s: &str, today: NaiveDate) -> Result<Self> {
        let s = s.trim();

        match s.to_lowercase().as_str() {
            "ytd" => return Ok(Period::YearToDate(today.year())),
            "qtd" => return Ok(Period::QuarterToDate(today.year(), quarter_of(today))),
            "mtd" => return Ok(Period::MonthToDate(today.year(), today.month() as u8)),
            _ => {}
        }

        // Rolling: "30d", "7d", etc.
        if s.ends_with('d') || s.ends_with('D') {
            if let Ok(n) = s[..s.len() - 1].parse::<u32>() {
                return Ok(Period::Rolling(n));
            }
        }

        if s.len() == 4 {
            if let Ok(year) = s.parse::<i32>() {
                return Ok(Period::Year(year));
            }
        }

        if let Some(caps) = RE_QUARTER.captures(s) {
            let year: i32 = parse_capture(&caps[1], s)?;
            let q: u8 = parse_capture(&caps[2], s)?;
            return Ok(Period::Quarter(year, q));
        }

        if let Some(caps) = RE_WEEK.captures(s) {
            let year: i32 = parse_capture(&caps[1], s)?;
            let week: u8 = parse_capture(&caps[2], s)?;
            if (1..=53).contains(&week) {
                return Ok(Period::Week(year, week));
            }
        }

        if let Some(caps) = RE_MONTH.captures(s) {
            let year: i32 = parse_capture(&caps[1], s)?;
            let month: u8 = parse_capture(&caps[2], s)?;
            if (1..=12).contains(&month) {
                return Ok(Period::Month(year, month));
            }
        }

        Err(Error::PeriodParse(format!("unrecognized period: {s}")))
    }

    /// Canonical key string, e.g. `2025-Q1` or `30d`.
    pub fn to_key(&self) -> String {
        match self {
            Period::Year(y) => format!("{y}"),
            Period::Quarter(y, q) => format!("{y}-Q{q}"),
            Period::Month(y, m) => format!("{y}-{m:02}"),
            Period::Week(y, w) => format!("{y}-W{w:02}"),
            Period::Rolling(n) => format!("{n}d"),
            Period::YearToDate(y) => format!("{y}-ytd"),
            Period::QuarterToDate(y, q) => format!("{y}-Q{q}-td"),
            Period::MonthToDate(y, m) => format!("{y}-{m:02}-td"),
        }
    }

    /// Get the calendar date range (inclusive start, inclusive end).
    /// To-date and rolling periods end on `today`.
    pub fn date_range(&self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
        let range = match self {
            Period::Year(y) => (ymd(*y, 1, 1)?, ymd(*y, 12, 31)?),
            Period::Quarter(y, q) => {
                let start_month = (*q as u32 - 1) * 3 + 1;
                (ymd(*y, start_month, 1)?, last_day_of_month(*y, *q as u32 * 3))
            }
            Period::Month(y, m) => (ymd(*y, *m as u32, 1)?, last_day_of_month(*y, *m as u32)),
            Period::Week(y, w) => {
                let start = NaiveDate::from_isoywd_opt(*y, *w as u32, Weekday::Mon)
                    .ok_or_else(|| Error::PeriodParse(format!("no such week: {y}-W{w:02}")))?;
                (start, start + Duration::days(6))
            }
            Period::Rolling(n) => {
                let start = today.checked_sub_days(Days::new(*n as u64)).ok_or_else(|| {
                    Error::InvalidInput(format!("{n} days before {today} is out of range"))
                })?;
                (start, today)
            }
            Period::YearToDate(y) => (ymd(*y, 1, 1)?, today),
            Period::QuarterToDate(y, q) => (ymd(*y, (*q as u32 - 1) * 3 + 1, 1)?, today),
            Period::MonthToDate(y, m) => (ymd(*y, *m as u32, 1)?, today),
        };
        Ok(range)
    }

    /// Resolve to a timestamp window evaluated at `now`.
    ///
    /// Rolling and to-date periods end exactly at `now`; closed calendar
    /// periods run from midnight of the first day through the last second of
    /// the final day.
    pub fn window(&self, now: NaiveDateTime) -> Result<DateWindow> {
        match self {
            Period::Rolling(n) => DateWindow::trailing_days(now, *n),
            Period::YearToDate(_) | Period::QuarterToDate(_, _) | Period::MonthToDate(_, _) => {
                let (start, _) = self.date_range(now.date())?;
                DateWindow::new(start.and_time(NaiveTime::MIN), now)
            }
            _ => {
                let (start, end) = self.date_range(now.date())?;
                DateWindow::new(start.and_time(NaiveTime::MIN), end_of_day(end))
            }
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_key())
    }
}

/// Parse a timestamp given on the command line or in a form.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM`, `YYYY-MM-DD HH:MM:SS` and the
/// `T`-separated variants. A bare date resolves to midnight, or to the last
/// second of the day when `end_of_range` is set.
pub fn parse_timestamp(s: &str, end_of_range: bool) -> Result<NaiveDateTime> {
    let s = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(if end_of_range {
            end_of_day(d)
        } else {
            d.and_time(NaiveTime::MIN)
        });
    }
    for fmt in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(t);
        }
    }
    Err(Error::InvalidInput(format!("unrecognized timestamp: {s}")))
}

/// `t` moved back by `days` whole days.
pub fn days_before(t: NaiveDateTime, days: u32) -> Result<NaiveDateTime> {
    t.checked_sub_signed(Duration::days(days as i64))
        .ok_or_else(|| Error::InvalidInput(format!("{days} days before {t} is out of range")))
}

fn end_of_day(d: NaiveDate) -> NaiveDateTime {
    d.and_hms_opt(23, 59, 59)
        .unwrap_or_else(|| d.and_time(NaiveTime::MIN))
}

fn ymd(year: i32, month: u32, day: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| Error::PeriodParse(format!("invalid date: {year}-{month:02}-{day:02}")))
}

fn parse_capture<T: std::str::FromStr>(cap: &str, input: &str) -> Result<T> {
    cap.parse()
        .map_err(|_| Error::PeriodParse(format!("invalid period: {input}")))
}
