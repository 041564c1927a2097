//! Core data types for securities and prices.
//!
//! This module defines the fundamental data structures:
//!
//! - [`Symbol`] - Ticker symbol, the identity of a security
//! - [`Security`] - A tracked security and its display name
//! - [`PriceHistoryPoint`] - One daily bar with independently nullable fields

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A trading symbol/ticker.
///
/// Symbols are trimmed and uppercased on creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    /// Creates a new symbol from a string, converting to uppercase.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_uppercase())
    }

    /// Returns the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the symbol is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parses a comma or whitespace separated ticker list, keeping order and
    /// dropping blanks and repeats.
    #[must_use]
    pub fn parse_list(s: &str) -> Vec<Self> {
        let mut out: Vec<Self> = Vec::new();
        for symbol in s
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(Self::new)
            .filter(|s| !s.is_empty())
        {
            if !out.contains(&symbol) {
                out.push(symbol);
            }
        }
        out
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Symbol {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A tracked security.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Security {
    /// Ticker symbol (identity).
    pub symbol: Symbol,
    /// Display name. May be empty when no source reported one.
    pub name: String,
}

impl Security {
    /// Creates a security.
    #[must_use]
    pub fn new(symbol: Symbol, name: impl Into<String>) -> Self {
        Self {
            symbol,
            name: name.into(),
        }
    }
}

/// One daily price bar.
///
/// Every field except the date is independently nullable because sources
/// report partial bars.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceHistoryPoint {
    /// Calendar date of the bar.
    pub date: NaiveDate,
    /// Opening price.
    pub open: Option<f64>,
    /// Highest price.
    pub high: Option<f64>,
    /// Lowest price.
    pub low: Option<f64>,
    /// Closing price.
    pub close: Option<f64>,
    /// Traded volume.
    pub volume: Option<f64>,
}

impl PriceHistoryPoint {
    /// Creates a bar with every value absent.
    #[must_use]
    pub const fn new(date: NaiveDate) -> Self {
        Self {
            date,
            open: None,
            high: None,
            low: None,
            close: None,
            volume: None,
        }
    }

    /// Creates a complete bar. Non-finite values become absent.
    #[must_use]
    pub fn from_ohlcv(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            date,
            open: finite(open),
            high: finite(high),
            low: finite(low),
            close: finite(close),
            volume: finite(volume),
        }
    }

    /// Replaces non-finite values with absent.
    #[must_use]
    pub fn sanitized(self) -> Self {
        Self {
            date: self.date,
            open: self.open.and_then(finite),
            high: self.high.and_then(finite),
            low: self.low.and_then(finite),
            close: self.close.and_then(finite),
            volume: self.volume.and_then(finite),
        }
    }
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}
