//! Wall-clock helpers for the schedule automaton
//!
//! Activities are keyed on zero-padded "HH:MM" strings; `TimeOfDay` wraps that
//! format so string comparison and chronological comparison coincide.

use crate::error::{Error, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A minute-resolution time of day, stored as hour/minute, rendered "HH:MM".
///
/// `Ord` follows chronological order, which is identical to lexicographic
/// order of the rendered form because the format is fixed-width zero-padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(Error::InvalidTimeOfDay(format!("{:02}:{:02}", hour, minute)));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// Midnight, the day-rollover boundary.
    pub fn midnight() -> Self {
        Self { hour: 0, minute: 0 }
    }

    /// Truncate a full timestamp to its minute of day.
    pub fn from_datetime(dt: &NaiveDateTime) -> Self {
        Self {
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
        }
    }
}

impl FromStr for TimeOfDay {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidTimeOfDay(s.to_string());
        let (h, m) = s.split_once(':').ok_or_else(invalid)?;
        if h.len() != 2 || m.len() != 2 {
            return Err(invalid());
        }
        let hour: u8 = h.parse().map_err(|_| invalid())?;
        let minute: u8 = m.parse().map_err(|_| invalid())?;
        Self::new(hour, minute)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> String {
        t.to_string()
    }
}

/// Weekday index used by the schedule: 0 = Monday .. 6 = Sunday.
pub fn weekday_index(date: &NaiveDate) -> u8 {
    date.weekday().num_days_from_monday() as u8
}

/// Calendar-date component of event dedup keys, "YYYYMMDD".
pub fn date_key(date: &NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_format_round_trip() {
        let t: TimeOfDay = "08:05".parse().unwrap();
        assert_eq!(t.hour(), 8);
        assert_eq!(t.minute(), 5);
        assert_eq!(t.to_string(), "08:05");
    }

    #[test]
    fn rejects_malformed_strings() {
        for bad in ["8:05", "08:5", "24:00", "12:60", "noon", "12-30", ""] {
            assert!(bad.parse::<TimeOfDay>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn ordering_is_chronological() {
        let early: TimeOfDay = "08:00".parse().unwrap();
        let late: TimeOfDay = "13:30".parse().unwrap();
        assert!(early < late);
        assert!("09:59".parse::<TimeOfDay>().unwrap() < "10:00".parse().unwrap());
    }

    #[test]
    fn serde_uses_raw_string() {
        let t: TimeOfDay = "07:45".parse().unwrap();
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"07:45\"");
        let back: TimeOfDay = serde_json::from_str("\"07:45\"").unwrap();
        assert_eq!(back, t);
        assert!(serde_json::from_str::<TimeOfDay>("\"7:45\"").is_err());
    }

    #[test]
    fn weekday_index_is_monday_based() {
        // 2025-01-06 is a Monday
        let monday = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        assert_eq!(weekday_index(&monday), 0);
        assert_eq!(weekday_index(&monday.succ_opt().unwrap()), 1);
    }

    #[test]
    fn date_key_format() {
        let d = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(date_key(&d), "20250307");
    }
}
