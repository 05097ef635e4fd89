//! Time-range token parsing and interval overlap.

use anyhow::{anyhow, bail, Result};
use chrono::NaiveDate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A closed span of dates parsed from a catalog time-range token.
pub struct TimeRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        TimeRange { start, end }
    }

    /// Parses a token of the form `19800101-19891231`. Each side accepts
    /// `YYYY`, `YYYYMM`, or `YYYYMMDD`; truncated fields default to the
    /// calendar boundary (January 1st on the start side, the last day of
    /// the year or month on the end side).
    pub fn parse(token: &str) -> Result<Self> {
        let (start, end) = token
            .split_once('-')
            .ok_or_else(|| anyhow!("Invalid time range token: {}", token))?;

        let start = parse_bound(start, false)?;
        let end = parse_bound(end, true)?;

        Ok(TimeRange { start, end })
    }
}

fn parse_bound(token: &str, is_end: bool) -> Result<NaiveDate> {
    if !token.chars().all(|c| c.is_ascii_digit()) {
        bail!("Non-numeric time bound: {}", token);
    }

    let year: i32 = match token.len() {
        4 | 6 | 8 => token[0..4].parse()?,
        _ => bail!("Time bound must be 4, 6 or 8 digits: {}", token),
    };

    let month: u32 = if token.len() >= 6 {
        token[4..6].parse()?
    } else if is_end {
        12
    } else {
        1
    };

    let day: u32 = if token.len() == 8 {
        token[6..8].parse()?
    } else if is_end {
        last_day_of_month(year, month)
    } else {
        1
    };

    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| anyhow!("Invalid date in time bound: {}", token))
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };

    match next {
        Some(d) => d.pred_opt().map(|d| chrono::Datelike::day(&d)).unwrap_or(1),
        None => 1,
    }
}

/// Half-open interval overlap: touching endpoints do not count.
pub fn is_overlapping(a: &TimeRange, b: &TimeRange) -> bool {
    a.start < b.end && a.end > b.start
}

// -- Tests -------------------------------------------------------------------
