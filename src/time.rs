//! Clock and calendar arithmetic.
//!
//! Times of day are carried as whole minutes from midnight. A day's schedule
//! may run past midnight, so values above `24:00` are legal and render as
//! `25:10` rather than wrapping.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{PlannerError, Result};

pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// A time of day in minutes from midnight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(u32);

impl ClockTime {
    pub const MIDNIGHT: ClockTime = ClockTime(0);

    pub const fn from_minutes(minutes: u32) -> Self {
        Self(minutes)
    }

    pub const fn from_hm(hours: u32, minutes: u32) -> Self {
        Self(hours * 60 + minutes)
    }

    pub const fn minutes(self) -> u32 {
        self.0
    }

    pub fn add_minutes(self, minutes: u32) -> Self {
        Self(self.0.saturating_add(minutes))
    }

    /// Minutes from `self` to `later`, zero when `later` is not after `self`.
    pub fn minutes_until(self, later: ClockTime) -> u32 {
        later.0.saturating_sub(self.0)
    }

    /// Parses `HH:MM` (or `HH:MM:SS`, seconds dropped). `24:00` is accepted as
    /// the end-of-day marker.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value == "24:00" {
            return Ok(Self(MINUTES_PER_DAY));
        }

        let time = NaiveTime::parse_from_str(value, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
            .map_err(|err| PlannerError::invalid_input(format!("bad clock time '{value}': {err}")))?;

        Ok(Self(time.hour() * 60 + time.minute()))
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl FromStr for ClockTime {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ClockTime::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// `days` consecutive dates starting at `start`.
pub fn date_range(start: NaiveDate, days: u32) -> Vec<NaiveDate> {
    start.iter_days().take(days as usize).collect()
}

/// Every date from `start` to `end`, both inclusive. Empty when `end < start`.
pub fn dates_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    if end < start {
        return Vec::new();
    }
    start.iter_days().take_while(|date| *date <= end).collect()
}

/// 0-based day index of `date` within a trip starting at `start`, if it falls
/// inside the first `days` days.
pub fn day_index(start: NaiveDate, days: u32, date: NaiveDate) -> Option<usize> {
    let offset = (date - start).num_days();
    if offset < 0 || offset >= i64::from(days) {
        None
    } else {
        Some(offset as usize)
    }
}
