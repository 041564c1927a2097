//! Persistence traits and the screener query model.
//!
//! - [`SnapshotStore`] - Security, snapshot and price-history tables
//! - [`StoreTransaction`] - One atomic unit of writes for a single security
//! - [`ScreenerQuery`] / [`ScreenerPage`] - Filter, sort and paginate snapshots
//!
//! Stores are synchronous. Async callers run them on a blocking thread.

use chrono::NaiveDate;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{self, Debug};
use std::str::FromStr;

use crate::{
    error::{DataError, Result},
    frame,
    snapshot::{FundamentalSnapshot, NumericMetric},
    types::{PriceHistoryPoint, Security, Symbol},
};

/// Default page size.
pub const DEFAULT_PAGE_LIMIT: u32 = 20;
/// Largest accepted page size.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// A set of writes that becomes visible all at once.
///
/// Dropping a transaction without calling [`commit`](Self::commit) discards
/// every write made through it.
pub trait StoreTransaction {
    /// Inserts the security if absent. A non-empty name refreshes the stored one.
    fn ensure_security(&mut self, security: &Security) -> Result<()>;

    /// Replaces the stored snapshot for the snapshot's security.
    ///
    /// The security must already exist.
    fn replace_snapshot(&mut self, snapshot: &FundamentalSnapshot) -> Result<()>;

    /// Replaces the full stored price history for a security.
    ///
    /// The security must already exist.
    fn replace_price_history(&mut self, symbol: &Symbol, points: &[PriceHistoryPoint])
    -> Result<()>;

    /// Makes every write visible.
    fn commit(self: Box<Self>) -> Result<()>;
}

/// Persistent home of securities, snapshots and price history.
pub trait SnapshotStore: Send + Sync + Debug {
    /// Opens a write transaction.
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>>;

    /// One-shot [`StoreTransaction::ensure_security`].
    fn ensure_security(&self, security: &Security) -> Result<()> {
        let mut tx = self.begin()?;
        tx.ensure_security(security)?;
        tx.commit()
    }

    /// One-shot [`StoreTransaction::replace_snapshot`].
    fn replace_snapshot(&self, snapshot: &FundamentalSnapshot) -> Result<()> {
        let mut tx = self.begin()?;
        tx.replace_snapshot(snapshot)?;
        tx.commit()
    }

    /// One-shot [`StoreTransaction::replace_price_history`].
    fn replace_price_history(&self, symbol: &Symbol, points: &[PriceHistoryPoint]) -> Result<()> {
        let mut tx = self.begin()?;
        tx.replace_price_history(symbol, points)?;
        tx.commit()
    }

    /// Looks up a security.
    fn security(&self, symbol: &Symbol) -> Result<Option<Security>>;

    /// All securities ordered by ticker.
    fn securities(&self) -> Result<Vec<Security>>;

    /// Stored snapshot with the company name taken from the security.
    fn snapshot(&self, symbol: &Symbol) -> Result<Option<FundamentalSnapshot>>;

    /// Stored bars in ascending date order, optionally from `since` onwards.
    fn price_history(
        &self,
        symbol: &Symbol,
        since: Option<NaiveDate>,
    ) -> Result<Vec<PriceHistoryPoint>>;

    /// Stored bars as a DataFrame with columns
    /// `date, open, high, low, close, volume`.
    fn price_history_frame(&self, symbol: &Symbol, since: Option<NaiveDate>) -> Result<DataFrame> {
        let points = self.price_history(symbol, since)?;
        frame::price_history_frame(&points)
    }

    /// Runs a screener query.
    fn screen(&self, query: &ScreenerQuery) -> Result<ScreenerPage>;
}

/// Inclusive numeric bounds. An unset bound does not filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeFilter {
    /// Lower bound.
    pub min: Option<f64>,
    /// Upper bound.
    pub max: Option<f64>,
}

impl RangeFilter {
    /// Creates a filter.
    #[must_use]
    pub const fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    /// Returns true if no bound is set.
    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// Whether a value passes. An absent value fails any set bound.
    #[must_use]
    pub fn matches(&self, value: Option<f64>) -> bool {
        if self.is_unbounded() {
            return true;
        }
        let Some(v) = value else {
            return false;
        };
        self.min.is_none_or(|min| v >= min) && self.max.is_none_or(|max| v <= max)
    }
}

/// Column to sort screener results by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortColumn {
    /// Ticker symbol.
    Ticker,
    /// A numeric snapshot column.
    Metric(NumericMetric),
}

impl Default for SortColumn {
    fn default() -> Self {
        Self::Metric(NumericMetric::MarketCap)
    }
}

impl SortColumn {
    /// Parses a column name, falling back to market cap for unknown names.
    #[must_use]
    pub fn parse_or_default(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    /// Column name in the store.
    #[must_use]
    pub const fn column(&self) -> &'static str {
        match self {
            Self::Ticker => "ticker",
            Self::Metric(m) => m.column(),
        }
    }
}

impl fmt::Display for SortColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for SortColumn {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("ticker") {
            return Ok(Self::Ticker);
        }
        s.parse().map(Self::Metric)
    }
}

/// Sort direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    /// Ascending; absent values first.
    Asc,
    /// Descending; absent values last.
    #[default]
    Desc,
}

impl SortOrder {
    /// SQL keyword.
    #[must_use]
    pub const fn sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(DataError::InvalidParameter(format!(
                "Unknown sort order: {other}"
            ))),
        }
    }
}

/// Filter, sort and pagination parameters for snapshots.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenerQuery {
    /// Case-insensitive substring of the ticker.
    pub ticker_search: Option<String>,
    /// Range filters on numeric columns, all of which must pass.
    pub ranges: Vec<(NumericMetric, RangeFilter)>,
    /// Required free-cash-flow sign.
    pub fcf_positive: Option<bool>,
    /// Case-insensitive substring of the analyst rating.
    pub analyst_rating: Option<String>,
    /// Sort column.
    pub sort_by: SortColumn,
    /// Sort direction.
    pub sort_order: SortOrder,
    /// One-based page number.
    pub page: u32,
    /// Page size.
    pub limit: u32,
}

impl ScreenerQuery {
    /// Query matching everything, first page, default size.
    #[must_use]
    pub fn new() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
            ..Default::default()
        }
    }

    /// Adds a range filter. Unbounded filters are ignored.
    #[must_use]
    pub fn with_range(mut self, metric: NumericMetric, min: Option<f64>, max: Option<f64>) -> Self {
        let filter = RangeFilter::new(min, max);
        if !filter.is_unbounded() {
            self.ranges.push((metric, filter));
        }
        self
    }

    /// Sets the sort.
    #[must_use]
    pub const fn sorted_by(mut self, column: SortColumn, order: SortOrder) -> Self {
        self.sort_by = column;
        self.sort_order = order;
        self
    }

    /// Sets the page and page size.
    #[must_use]
    pub const fn paged(mut self, page: u32, limit: u32) -> Self {
        self.page = page;
        self.limit = limit;
        self
    }

    /// Effective page number, at least one.
    #[must_use]
    pub fn effective_page(&self) -> u32 {
        self.page.max(1)
    }

    /// Effective page size, clamped to `1..=100`. Zero selects the default.
    #[must_use]
    pub fn effective_limit(&self) -> u32 {
        if self.limit == 0 {
            DEFAULT_PAGE_LIMIT
        } else {
            self.limit.min(MAX_PAGE_LIMIT)
        }
    }

    /// Rows skipped before the effective page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.effective_page() - 1) * u64::from(self.effective_limit())
    }

    /// Ticker search term, trimmed and non-empty.
    #[must_use]
    pub fn ticker_term(&self) -> Option<&str> {
        non_empty(self.ticker_search.as_deref())
    }

    /// Analyst rating term, trimmed and non-empty.
    #[must_use]
    pub fn rating_term(&self) -> Option<&str> {
        non_empty(self.analyst_rating.as_deref())
    }

    /// Whether a snapshot passes every filter.
    #[must_use]
    pub fn matches(&self, snapshot: &FundamentalSnapshot) -> bool {
        if let Some(term) = self.ticker_term() {
            if !contains_ignore_case(snapshot.symbol.as_str(), term) {
                return false;
            }
        }
        if let Some(term) = self.rating_term() {
            match snapshot.analyst_rating.as_deref() {
                Some(rating) if contains_ignore_case(rating, term) => {}
                _ => return false,
            }
        }
        if let Some(wanted) = self.fcf_positive {
            if snapshot.free_cash_flow_positive != Some(wanted) {
                return false;
            }
        }
        self.ranges
            .iter()
            .all(|(metric, filter)| filter.matches(metric.value(snapshot)))
    }

    /// Ordering of two snapshots under this query's sort, ties broken by ticker.
    #[must_use]
    pub fn compare(&self, a: &FundamentalSnapshot, b: &FundamentalSnapshot) -> Ordering {
        let primary = match self.sort_by {
            SortColumn::Ticker => a.symbol.cmp(&b.symbol),
            SortColumn::Metric(m) => cmp_nulls_first(m.value(a), m.value(b)),
        };
        let primary = match self.sort_order {
            SortOrder::Asc => primary,
            SortOrder::Desc => primary.reverse(),
        };
        primary.then_with(|| a.symbol.cmp(&b.symbol))
    }
}

/// One page of screener results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScreenerPage {
    /// Rows on this page.
    pub rows: Vec<FundamentalSnapshot>,
    /// Rows matching the filters across all pages.
    pub total: u64,
    /// One-based page number.
    pub page: u32,
    /// Page size.
    pub limit: u32,
    /// Number of pages, `ceil(total / limit)`.
    pub total_pages: u64,
}

impl ScreenerPage {
    /// Creates a page, computing the page count.
    #[must_use]
    pub fn new(rows: Vec<FundamentalSnapshot>, total: u64, page: u32, limit: u32) -> Self {
        let total_pages = total.div_ceil(u64::from(limit.max(1)));
        Self {
            rows,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

/// Applies a query to snapshots held in memory.
#[must_use]
pub fn screen_snapshots<I>(snapshots: I, query: &ScreenerQuery) -> ScreenerPage
where
    I: IntoIterator<Item = FundamentalSnapshot>,
{
    let mut matched: Vec<FundamentalSnapshot> = snapshots
        .into_iter()
        .filter(|s| query.matches(s))
        .collect();
    matched.sort_by(|a, b| query.compare(a, b));

    let total = matched.len() as u64;
    let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
    let limit = query.effective_limit();
    let rows = matched
        .into_iter()
        .skip(offset)
        .take(limit as usize)
        .collect();

    ScreenerPage::new(rows, total, query.effective_page(), limit)
}

fn cmp_nulls_first(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.total_cmp(&y),
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}
