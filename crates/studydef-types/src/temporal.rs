//! Calendar units and date windows

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Calendar unit of a date offset (`index_date - 6 months`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateUnit {
    Days,
    Weeks,
    Months,
    Years,
}

impl DateUnit {
    /// Plural keyword for this unit
    pub const fn keyword(&self) -> &'static str {
        match self {
            Self::Days => "days",
            Self::Weeks => "weeks",
            Self::Months => "months",
            Self::Years => "years",
        }
    }
}

impl fmt::Display for DateUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Error returned when a unit keyword is not recognised
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown date unit '{0}'")]
pub struct UnknownDateUnit(pub String);

impl FromStr for DateUnit {
    type Err = UnknownDateUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" | "days" => Ok(Self::Days),
            "week" | "weeks" => Ok(Self::Weeks),
            "month" | "months" => Ok(Self::Months),
            "year" | "years" => Ok(Self::Years),
            _ => Err(UnknownDateUnit(s.to_string())),
        }
    }
}

/// An inclusive date window; a missing bound is open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    /// Window with both bounds
    pub const fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Window with no bounds
    pub const fn unbounded() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    /// Window `[start, ...)`
    pub const fn on_or_after(start: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    /// Window `(..., end]`
    pub const fn on_or_before(end: NaiveDate) -> Self {
        Self {
            start: None,
            end: Some(end),
        }
    }

    /// Check whether a date lies inside the window (both bounds inclusive)
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|start| date >= start) && self.end.is_none_or(|end| date <= end)
    }

    /// Check whether the window can contain any date at all
    pub fn is_empty(&self) -> bool {
        matches!((self.start, self.end), (Some(start), Some(end)) if start > end)
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.start {
            Some(start) => write!(f, "[{}", start)?,
            None => write!(f, "(-inf")?,
        }
        match self.end {
            Some(end) => write!(f, ", {}]", end),
            None => write!(f, ", +inf)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[rstest]
    #[case("day", DateUnit::Days)]
    #[case("days", DateUnit::Days)]
    #[case("Weeks", DateUnit::Weeks)]
    #[case("month", DateUnit::Months)]
    #[case("YEARS", DateUnit::Years)]
    fn test_unit_keywords(#[case] input: &str, #[case] expected: DateUnit) {
        assert_eq!(input.parse::<DateUnit>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_unit() {
        assert_eq!(
            "fortnights".parse::<DateUnit>(),
            Err(UnknownDateUnit("fortnights".to_string()))
        );
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let window = DateWindow::between(date(2021, 6, 1), date(2021, 12, 31));
        assert!(window.contains(date(2021, 6, 1)));
        assert!(window.contains(date(2021, 12, 31)));
        assert!(!window.contains(date(2021, 5, 31)));
        assert!(!window.contains(date(2022, 1, 1)));
    }

    #[test]
    fn test_open_windows() {
        assert!(DateWindow::unbounded().contains(date(1900, 1, 1)));
        assert!(DateWindow::on_or_after(date(2021, 6, 1)).contains(date(2030, 1, 1)));
        assert!(!DateWindow::on_or_before(date(2021, 6, 1)).contains(date(2021, 6, 2)));
    }

    #[test]
    fn test_inverted_window_is_empty() {
        assert!(DateWindow::between(date(2021, 6, 2), date(2021, 6, 1)).is_empty());
        assert!(!DateWindow::on_or_after(date(2021, 6, 2)).is_empty());
    }
}
