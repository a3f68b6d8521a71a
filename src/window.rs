use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GrowthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    Week,
    Month,
    Term,
    Year,
}

impl Timeframe {
    pub const ALL: [Timeframe; 4] = [Self::Week, Self::Month, Self::Term, Self::Year];

    pub fn days(self) -> i64 {
        match self {
            Self::Week => 7,
            Self::Month => 30,
            Self::Term => 91,
            Self::Year => 365,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Week => "week",
            Self::Month => "month",
            Self::Term => "term",
            Self::Year => "year",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = GrowthError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "term" => Ok(Self::Term),
            "year" => Ok(Self::Year),
            _ => Err(GrowthError::InvalidTimeframe(value.to_owned())),
        }
    }
}

/// Earliest session date a store is ever asked for.
pub fn program_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Half-open `[start, end)` date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn ending_at(end: NaiveDate, days: i64) -> Self {
        Self {
            start: end - Duration::days(days.max(1)),
            end,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// The range of equal length immediately before this one.
    pub fn preceding(&self) -> Self {
        Self::ending_at(self.start, self.days())
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    pub timeframe: Timeframe,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub prior_window: DateRange,
}

impl TimeWindow {
    /// `[as_of - N, as_of)`: a session recorded on `as_of` itself falls outside.
    pub fn resolve(timeframe: Timeframe, as_of: NaiveDate) -> Self {
        let current = DateRange::ending_at(as_of, timeframe.days());
        Self {
            timeframe,
            start: current.start,
            end: current.end,
            prior_window: current.preceding(),
        }
    }

    pub fn resolve_symbol(symbol: &str, as_of: Option<NaiveDate>) -> Result<Self, GrowthError> {
        let timeframe = symbol.parse::<Timeframe>()?;
        Ok(Self::resolve(
            timeframe,
            as_of.unwrap_or_else(|| Utc::now().date_naive()),
        ))
    }

    pub fn current(&self) -> DateRange {
        DateRange {
            start: self.start,
            end: self.end,
        }
    }

    pub fn days(&self) -> i64 {
        self.current().days()
    }

    /// The `k`-th period back: 0 is the current window, 1 the prior window.
    pub fn period(&self, k: i64) -> DateRange {
        let shift = Duration::days(self.days() * k);
        DateRange {
            start: self.start - shift,
            end: self.end - shift,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn prior_window_abuts_current_for_every_timeframe() {
        let as_of = date(2026, 3, 15);
        for timeframe in Timeframe::ALL {
            let window = TimeWindow::resolve(timeframe, as_of);
            assert_eq!(window.prior_window.end, window.start);
            assert_eq!(window.prior_window.days(), window.days());
            assert_eq!(window.days(), timeframe.days());
            assert!(window.end > window.start);
            assert_eq!(window.end, as_of);
        }
    }

    #[test]
    fn as_of_day_is_excluded() {
        let as_of = date(2026, 3, 15);
        let window = TimeWindow::resolve(Timeframe::Week, as_of);
        assert!(!window.current().contains(as_of));
        assert!(window.current().contains(date(2026, 3, 14)));
        assert!(window.current().contains(date(2026, 3, 8)));
        assert!(!window.current().contains(date(2026, 3, 7)));
        assert!(window.prior_window.contains(date(2026, 3, 7)));
    }

    #[test]
    fn term_is_thirteen_weeks() {
        assert_eq!(Timeframe::Term.days(), 13 * 7);
        assert_eq!(Timeframe::Month.days(), 30);
        assert_eq!(Timeframe::Year.days(), 365);
    }

    #[test]
    fn unknown_symbol_is_invalid_timeframe() {
        let result = TimeWindow::resolve_symbol("fortnight", Some(date(2026, 1, 1)));
        assert!(matches!(result, Err(GrowthError::InvalidTimeframe(ref s)) if s == "fortnight"));
        assert!(TimeWindow::resolve_symbol("Month", Some(date(2026, 1, 1))).is_ok());
    }

    #[test]
    fn periods_step_back_by_window_length() {
        let window = TimeWindow::resolve(Timeframe::Month, date(2026, 6, 30));
        assert_eq!(window.period(0), window.current());
        assert_eq!(window.period(1), window.prior_window);
        assert_eq!(window.period(2).end, window.prior_window.start);
    }
}
