//! Reporting period and trailing window definitions.
//!
//! This module defines [`PeriodType`] for fundamental statement periods and
//! [`HistoryPeriod`] for trailing price-history windows.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DataError;

/// Period type for fundamental financial data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodType {
    /// Annual reporting period.
    #[default]
    Annual,
    /// Quarterly reporting period.
    Quarterly,
}

/// Trailing window for price history, anchored at a reference date.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryPeriod {
    /// Five calendar days.
    FiveDays,
    /// One month (30 days).
    OneMonth,
    /// Six months (180 days).
    SixMonths,
    /// One year (365 days).
    #[default]
    OneYear,
    /// Five years (5 * 365 days).
    FiveYears,
}

impl HistoryPeriod {
    /// All supported windows, shortest first.
    pub const ALL: [Self; 5] = [
        Self::FiveDays,
        Self::OneMonth,
        Self::SixMonths,
        Self::OneYear,
        Self::FiveYears,
    ];

    /// Length of the window.
    #[must_use]
    pub fn lookback(&self) -> Duration {
        match self {
            Self::FiveDays => Duration::days(5),
            Self::OneMonth => Duration::days(30),
            Self::SixMonths => Duration::days(180),
            Self::OneYear => Duration::days(365),
            Self::FiveYears => Duration::days(365 * 5),
        }
    }

    /// First date included in the window ending at `anchor`.
    #[must_use]
    pub fn start_from(&self, anchor: NaiveDate) -> NaiveDate {
        anchor - self.lookback()
    }

    /// Short code used on the command line and in queries.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::FiveDays => "5D",
            Self::OneMonth => "1M",
            Self::SixMonths => "6M",
            Self::OneYear => "1Y",
            Self::FiveYears => "5Y",
        }
    }

    /// Parses a period code, falling back to one year for unknown input.
    #[must_use]
    pub fn parse_or_default(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl fmt::Display for HistoryPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for HistoryPeriod {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|p| p.code() == code)
            .ok_or_else(|| DataError::InvalidParameter(format!("Unknown history period: {s}")))
    }
}
