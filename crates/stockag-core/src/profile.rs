//! Flat market-data profile map.
//!
//! Sources deliver quote and key-statistics fields as a loose key/value blob.
//! [`ProfileMap`] keeps that shape but only hands out typed values: a key whose
//! value has the wrong type reads as absent.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Profile keys read by the derivation engine.
pub mod keys {
    /// Preferred company display name.
    pub const DISPLAY_NAME: &str = "displayName";
    /// Fallback company name.
    pub const SHORT_NAME: &str = "shortName";
    /// Return on equity.
    pub const RETURN_ON_EQUITY: &str = "returnOnEquity";
    /// Net profit margin.
    pub const PROFIT_MARGINS: &str = "profitMargins";
    /// Market capitalization.
    pub const MARKET_CAP: &str = "marketCap";
    /// Trailing twelve month EPS.
    pub const TRAILING_EPS: &str = "trailingEps";
    /// Trailing P/E.
    pub const TRAILING_PE: &str = "trailingPE";
    /// Consensus analyst rating, e.g. `"2.0 - Buy"`.
    pub const ANALYST_RATING: &str = "averageAnalystRating";
    /// Trailing five year PEG ratio.
    pub const TRAILING_PEG: &str = "trailingPegRatio";
    /// Preformatted 52-week range.
    pub const FIFTY_TWO_WEEK_RANGE: &str = "fiftyTwoWeekRange";
    /// 52-week low.
    pub const FIFTY_TWO_WEEK_LOW: &str = "fiftyTwoWeekLow";
    /// 52-week high.
    pub const FIFTY_TWO_WEEK_HIGH: &str = "fiftyTwoWeekHigh";
    /// Preformatted day range.
    pub const DAY_RANGE: &str = "regularMarketDayRange";
    /// Day low.
    pub const DAY_LOW: &str = "regularMarketDayLow";
    /// Day high.
    pub const DAY_HIGH: &str = "regularMarketDayHigh";
    /// Last traded price.
    pub const CURRENT_PRICE: &str = "currentPrice";
    /// One year price change.
    pub const FIFTY_TWO_WEEK_CHANGE: &str = "52WeekChange";
    /// Beta against the market.
    pub const BETA: &str = "beta";
}

/// Flat profile map for one security.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileMap(BTreeMap<String, Value>);

impl ProfileMap {
    /// Creates an empty profile.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Inserts a value, replacing any existing one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Inserts a value only if the key is not present yet.
    pub fn insert_missing(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.entry(key.into()).or_insert_with(|| value.into());
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Raw value for a key. `null` reads as absent.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    /// Returns true if the key holds a non-null value.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Finite numeric value for a key.
    ///
    /// Numeric strings are not coerced; a key holding any other type reads
    /// as absent.
    #[must_use]
    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key)
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite())
    }

    /// Non-empty text value for a key.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the profile has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for ProfileMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
