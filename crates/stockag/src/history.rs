//! Trailing-window price history.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, instrument};

use stockag_core::{HistoryPeriod, MarketDataSource, PriceHistoryPoint, Result, Symbol};

/// Fetches daily bars over a fixed trailing window.
///
/// Bars come back ascending by date with at most one bar per calendar date.
#[derive(Debug, Clone)]
pub struct PriceHistoryFetcher {
    source: Arc<dyn MarketDataSource>,
    period: HistoryPeriod,
}

impl PriceHistoryFetcher {
    /// Creates a fetcher for a window.
    #[must_use]
    pub fn new(source: Arc<dyn MarketDataSource>, period: HistoryPeriod) -> Self {
        Self { source, period }
    }

    /// The trailing window.
    #[must_use]
    pub const fn period(&self) -> HistoryPeriod {
        self.period
    }

    /// Fetches and normalizes bars for one security.
    ///
    /// An empty result is not an error.
    #[instrument(skip(self), fields(symbol = %symbol, period = %self.period))]
    pub async fn fetch(&self, symbol: &Symbol) -> Result<Vec<PriceHistoryPoint>> {
        let raw = self.source.fetch_price_history(symbol, self.period).await?;
        let fetched = raw.len();
        let points = normalize(raw);
        debug!(fetched, kept = points.len(), "Fetched price history");
        Ok(points)
    }
}

/// Sorts ascending by date, keeps the last bar seen for each date and turns
/// non-finite values into absent.
#[must_use]
pub fn normalize(points: Vec<PriceHistoryPoint>) -> Vec<PriceHistoryPoint> {
    let mut by_date = BTreeMap::new();
    for point in points {
        by_date.insert(point.date, point.sanitized());
    }
    by_date.into_values().collect()
}
