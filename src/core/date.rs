//! Calendar-month keys used to partition cached tiles.

use crate::core::constants::PUBLICATION_LAG_MONTHS;
use crate::{Result, TileError};
use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A calendar month formatted as `YYYY-MM`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DateKey(String);

impl DateKey {
    /// Month key for any date within that month
    pub fn from_date(date: NaiveDate) -> Self {
        Self(format!("{:04}-{:02}", date.year(), date.month()))
    }

    /// Latest month the remote source usually has data for, relative to `today`
    pub fn default_for(today: NaiveDate) -> Self {
        let first = today.with_day(1).unwrap_or(today);
        let month = first
            .checked_sub_months(Months::new(PUBLICATION_LAG_MONTHS))
            .unwrap_or(first);
        Self::from_date(month)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First day of the month this key names
    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&format!("{}-01", self.0), "%Y-%m-%d").ok()
    }
}

impl FromStr for DateKey {
    type Err = TileError;

    fn from_str(s: &str) -> Result<Self> {
        let well_formed = s.len() == 7
            && s.as_bytes()[4] == b'-'
            && s[..4].bytes().all(|b| b.is_ascii_digit())
            && s[5..].bytes().all(|b| b.is_ascii_digit());
        if !well_formed {
            return Err(TileError::InvalidDateKey(s.to_string()));
        }
        let key = DateKey(s.to_string());
        match key.first_day() {
            Some(_) => Ok(key),
            None => Err(TileError::InvalidDateKey(s.to_string())),
        }
    }
}

impl TryFrom<String> for DateKey {
    type Error = TileError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DateKey> for String {
    fn from(key: DateKey) -> Self {
        key.0
    }
}

impl From<NaiveDate> for DateKey {
    fn from(date: NaiveDate) -> Self {
        Self::from_date(date)
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_from_date_pads_month() {
        assert_eq!(DateKey::from_date(date(2024, 5, 17)).as_str(), "2024-05");
        assert_eq!(DateKey::from_date(date(2023, 12, 1)).as_str(), "2023-12");
    }

    #[test]
    fn test_parse_validates_format() {
        assert!("2024-05".parse::<DateKey>().is_ok());
        assert!("2024-13".parse::<DateKey>().is_err());
        assert!("2024-5".parse::<DateKey>().is_err());
        assert!("24-05-01".parse::<DateKey>().is_err());
        assert!("abcd-ef".parse::<DateKey>().is_err());
    }

    #[test]
    fn test_default_for_lags_two_months() {
        assert_eq!(DateKey::default_for(date(2024, 7, 20)).as_str(), "2024-05");
        assert_eq!(DateKey::default_for(date(2024, 1, 31)).as_str(), "2023-11");
    }

    #[test]
    fn test_serde_round_trips_as_string() {
        let key: DateKey = "2024-06".parse().unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"2024-06\"");
        assert!(serde_json::from_str::<DateKey>("\"2024-00\"").is_err());
    }
}
