// Partition boundary calculation
//
// Every partition is anchored to midnight. Sub-day widths must divide 24 hours
// so that every calendar day splits identically; calendar widths (day, week,
// month, quarter, year) are single units and anchored by calendar semantics.
// Boundaries are therefore reproducible from any marker without consulting
// previously written state.

use crate::error::{CoreError, Result};
use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use std::fmt;
use std::str::FromStr;

const SECONDS_PER_DAY: i64 = 86_400;

/// Width of a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    /// Sub-day width in whole seconds, evenly dividing 24 hours
    Fixed { seconds: u32 },
    Day,
    /// Monday 00:00 through Sunday
    Week,
    Month,
    Quarter,
    Year,
}

impl Granularity {
    /// Build a sub-day granularity from a number of seconds.
    ///
    /// A width of exactly one day collapses to [`Granularity::Day`].
    pub fn fixed(seconds: i64) -> Result<Self> {
        if seconds < 1 {
            return Err(CoreError::configuration(format!(
                "granularity of {} seconds is shorter than one second",
                seconds
            )));
        }
        if seconds == SECONDS_PER_DAY {
            return Ok(Self::Day);
        }
        if seconds > SECONDS_PER_DAY {
            return Err(CoreError::configuration(format!(
                "granularity of {} seconds spans several days; use a single calendar unit (D, W, M, Q, Y)",
                seconds
            )));
        }
        if SECONDS_PER_DAY % seconds != 0 {
            return Err(CoreError::configuration(format!(
                "granularity of {} seconds does not evenly divide 24 hours",
                seconds
            )));
        }
        // 0 < seconds < 86_400 here
        Ok(Self::Fixed {
            seconds: seconds as u32,
        })
    }

    /// Check the invariants `fixed` enforces, for values built by hand.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Fixed { seconds } => Self::fixed(i64::from(seconds)).map(|_| ()),
            _ => Ok(()),
        }
    }

    fn calendar(unit: Self, multiplier: Option<i64>, raw: &str) -> Result<Self> {
        match multiplier {
            None | Some(1) => Ok(unit),
            Some(_) => Err(CoreError::configuration(format!(
                "granularity '{}' must be a single calendar unit (no multiplier) because only midnight anchoring is supported",
                raw
            ))),
        }
    }
}

impl FromStr for Granularity {
    type Err = CoreError;

    /// Parse frequency strings such as `2H`, `20T`, `30min`, `D`, `W`, `M`.
    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim();
        let split = raw
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(raw.len());
        let (digits, unit) = raw.split_at(split);

        if unit.is_empty() {
            return Err(CoreError::configuration(format!(
                "granularity '{}' has no unit",
                raw
            )));
        }

        let multiplier = if digits.is_empty() {
            None
        } else {
            Some(digits.parse::<i64>().map_err(|e| {
                CoreError::configuration(format!("granularity '{}' multiplier: {}", raw, e))
            })?)
        };
        let count = multiplier.unwrap_or(1);
        if count == 0 {
            return Err(CoreError::configuration(format!(
                "granularity '{}' has a zero multiplier",
                raw
            )));
        }

        let scaled = |unit_seconds: i64| {
            count.checked_mul(unit_seconds).ok_or_else(|| {
                CoreError::configuration(format!("granularity '{}' is too large", raw))
            })
        };

        match unit {
            "S" | "s" | "sec" => Self::fixed(scaled(1)?),
            "T" | "min" => Self::fixed(scaled(60)?),
            "H" | "h" => Self::fixed(scaled(3_600)?),
            "ms" | "L" | "us" | "U" | "N" | "ns" => Err(CoreError::configuration(format!(
                "granularity '{}' is shorter than one second; partition file names are rounded to the second",
                raw
            ))),
            "D" => Self::calendar(Self::Day, multiplier, raw),
            "W" | "W-SUN" => Self::calendar(Self::Week, multiplier, raw),
            "M" | "MS" | "ME" => Self::calendar(Self::Month, multiplier, raw),
            "Q" | "QS" | "QE" => Self::calendar(Self::Quarter, multiplier, raw),
            "Y" | "A" | "YS" | "AS" | "YE" => Self::calendar(Self::Year, multiplier, raw),
            other => Err(CoreError::configuration(format!(
                "unsupported granularity unit '{}' in '{}'",
                other, raw
            ))),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Fixed { seconds } if seconds % 3_600 == 0 => write!(f, "{}H", seconds / 3_600),
            Self::Fixed { seconds } if seconds % 60 == 0 => write!(f, "{}T", seconds / 60),
            Self::Fixed { seconds } => write!(f, "{}S", seconds),
            Self::Day => write!(f, "D"),
            Self::Week => write!(f, "W"),
            Self::Month => write!(f, "M"),
            Self::Quarter => write!(f, "Q"),
            Self::Year => write!(f, "Y"),
        }
    }
}

/// Half-open time range `[start, end)` covered by one partition file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl PartitionRange {
    /// The partition containing `marker`
    pub fn containing(marker: NaiveDateTime, granularity: Granularity) -> Result<Self> {
        let start = previous_boundary(marker, granularity)?;
        let end = next_boundary(start, granularity)?;
        Ok(Self { start, end })
    }

    /// Last instant inside the range at nanosecond resolution (`end - 1ns`)
    pub fn last_instant(&self) -> NaiveDateTime {
        self.end - TimeDelta::nanoseconds(1)
    }

    /// Inclusive nanosecond bounds `[start, end - 1ns]`
    pub fn bounds_nanos(&self) -> Result<(i64, i64)> {
        Ok((
            crate::temporal::to_nanos(self.start)?,
            crate::temporal::to_nanos(self.last_instant())?,
        ))
    }

    /// Whole seconds since the Unix epoch of the range start, truncated
    pub fn start_seconds(&self) -> i64 {
        self.start.and_utc().timestamp()
    }

    /// Partition file name derived from the range start
    pub fn file_name(&self) -> String {
        partition_file_name(self.start_seconds())
    }
}

/// `part.<epoch-seconds>.parquet`
pub fn partition_file_name(range_start_seconds: i64) -> String {
    format!("part.{}.parquet", range_start_seconds)
}

/// Start of the midnight-anchored partition containing `marker`.
///
/// For sub-day widths the offset from midnight is floored to a whole number of
/// widths; calendar widths return the calendar period start directly.
pub fn previous_boundary(marker: NaiveDateTime, granularity: Granularity) -> Result<NaiveDateTime> {
    granularity.validate()?;

    let date = marker.date();
    let midnight = date.and_time(NaiveTime::MIN);

    let start = match granularity {
        Granularity::Fixed { seconds } => {
            let width = i64::from(seconds);
            let elapsed = (marker - midnight).num_seconds();
            let n = elapsed / width;
            return Ok(midnight + TimeDelta::seconds(n * width));
        }
        Granularity::Day => Some(date),
        Granularity::Week => {
            let back = u64::from(date.weekday().num_days_from_monday());
            date.checked_sub_days(Days::new(back))
        }
        Granularity::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1),
        Granularity::Quarter => {
            let first_month = (date.month0() / 3) * 3 + 1;
            NaiveDate::from_ymd_opt(date.year(), first_month, 1)
        }
        Granularity::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1),
    };

    start
        .map(|d| d.and_time(NaiveTime::MIN))
        .ok_or_else(|| out_of_range(marker))
}

/// Start of the partition following the one starting at `start`
pub fn next_boundary(start: NaiveDateTime, granularity: Granularity) -> Result<NaiveDateTime> {
    let next = match granularity {
        Granularity::Fixed { seconds } => {
            start.checked_add_signed(TimeDelta::seconds(i64::from(seconds)))
        }
        Granularity::Day => start.checked_add_days(Days::new(1)),
        Granularity::Week => start.checked_add_days(Days::new(7)),
        Granularity::Month => start.checked_add_months(Months::new(1)),
        Granularity::Quarter => start.checked_add_months(Months::new(3)),
        Granularity::Year => start.checked_add_months(Months::new(12)),
    };
    next.ok_or_else(|| out_of_range(start))
}

/// Ordered, contiguous partition ranges from the one containing `start_marker`
/// through the one containing `end_marker`.
///
/// Returns an empty list when `end_marker` precedes `start_marker`.
pub fn boundary_sequence(
    start_marker: NaiveDateTime,
    end_marker: NaiveDateTime,
    granularity: Granularity,
) -> Result<Vec<PartitionRange>> {
    granularity.validate()?;
    if end_marker < start_marker {
        return Ok(Vec::new());
    }

    let mut ranges = Vec::new();
    let mut start = previous_boundary(start_marker, granularity)?;
    while start <= end_marker {
        let end = next_boundary(start, granularity)?;
        ranges.push(PartitionRange { start, end });
        start = end;
    }
    Ok(ranges)
}

fn out_of_range(at: NaiveDateTime) -> CoreError {
    CoreError::schema(format!(
        "timestamp {} is outside the supported calendar range",
        at
    ))
}
