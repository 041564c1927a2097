//! The fixed-schema fundamentals snapshot.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{error::DataError, types::Symbol};

/// Latest derived fundamentals for one security.
///
/// Every metric is independently optional; `None` is the absent marker and is
/// never conflated with zero or an empty string. The store keeps at most one
/// snapshot per security.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalSnapshot {
    /// Security the snapshot belongs to.
    pub symbol: Symbol,
    /// Run date the snapshot was computed on.
    pub snapshot_date: NaiveDate,
    /// Display name, empty when the profile had none.
    pub company_name: String,

    // Derived from statements
    /// Annual revenue growth, year over year.
    pub revenue_growth_yoy: Option<f64>,
    /// Total debt over stockholders' equity, latest quarter.
    pub debt_to_equity: Option<f64>,
    /// Operating income over absolute interest expense, latest year.
    pub interest_coverage: Option<f64>,
    /// Whether the latest free cash flow is positive.
    pub free_cash_flow_positive: Option<bool>,
    /// Current assets over current liabilities, latest quarter.
    pub current_ratio: Option<f64>,

    // Profile passthrough
    /// Return on equity.
    pub roe: Option<f64>,
    /// Net profit margin.
    pub profit_margin: Option<f64>,
    /// Market capitalization.
    pub market_cap: Option<f64>,
    /// Trailing twelve month EPS.
    pub eps_ttm: Option<f64>,
    /// Trailing twelve month P/E as reported by the source.
    pub pe_ttm: Option<f64>,
    /// Consensus analyst rating.
    pub analyst_rating: Option<String>,
    /// Trailing five year PEG ratio.
    pub peg_5y: Option<f64>,
    /// 52-week range, e.g. `"164.08 - 237.23"`.
    pub week_range_52: Option<String>,
    /// Day range.
    pub day_range: Option<String>,
    /// Last traded price.
    pub current_price: Option<f64>,
    /// One year performance.
    pub perf_1y: Option<f64>,
    /// Beta.
    pub beta: Option<f64>,
    /// Trailing P/E computed from price and trailing EPS.
    pub pe_trailing: Option<f64>,
}

impl FundamentalSnapshot {
    /// Creates a snapshot with every metric absent.
    #[must_use]
    pub fn new(symbol: Symbol, snapshot_date: NaiveDate) -> Self {
        Self {
            symbol,
            snapshot_date,
            ..Default::default()
        }
    }

    /// Number of metric fields that hold a value.
    #[must_use]
    pub fn present_metrics(&self) -> usize {
        let numeric = NumericMetric::ALL
            .iter()
            .filter(|m| m.value(self).is_some())
            .count();
        let other = [
            self.free_cash_flow_positive.is_some(),
            self.analyst_rating.is_some(),
            self.week_range_52.is_some(),
            self.day_range.is_some(),
            !self.company_name.is_empty(),
        ];
        numeric + other.iter().filter(|b| **b).count()
    }
}

/// Numeric snapshot columns that support range filters and sorting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumericMetric {
    /// `revenue_growth_yoy`
    RevenueGrowthYoy,
    /// `debt_to_equity`
    DebtToEquity,
    /// `interest_coverage`
    InterestCoverage,
    /// `roe`
    Roe,
    /// `profit_margin`
    ProfitMargin,
    /// `current_ratio`
    CurrentRatio,
    /// `market_cap`
    MarketCap,
    /// `eps_ttm`
    EpsTtm,
    /// `pe_ttm`
    PeTtm,
    /// `peg_5y`
    Peg5y,
    /// `current_price`
    CurrentPrice,
    /// `perf_1y`
    Perf1y,
    /// `beta`
    Beta,
    /// `pe_trailing`
    PeTrailing,
}

impl NumericMetric {
    /// All numeric columns.
    pub const ALL: [Self; 14] = [
        Self::RevenueGrowthYoy,
        Self::DebtToEquity,
        Self::InterestCoverage,
        Self::Roe,
        Self::ProfitMargin,
        Self::CurrentRatio,
        Self::MarketCap,
        Self::EpsTtm,
        Self::PeTtm,
        Self::Peg5y,
        Self::CurrentPrice,
        Self::Perf1y,
        Self::Beta,
        Self::PeTrailing,
    ];

    /// Column name in the store.
    #[must_use]
    pub const fn column(&self) -> &'static str {
        match self {
            Self::RevenueGrowthYoy => "revenue_growth_yoy",
            Self::DebtToEquity => "debt_to_equity",
            Self::InterestCoverage => "interest_coverage",
            Self::Roe => "roe",
            Self::ProfitMargin => "profit_margin",
            Self::CurrentRatio => "current_ratio",
            Self::MarketCap => "market_cap",
            Self::EpsTtm => "eps_ttm",
            Self::PeTtm => "pe_ttm",
            Self::Peg5y => "peg_5y",
            Self::CurrentPrice => "current_price",
            Self::Perf1y => "perf_1y",
            Self::Beta => "beta",
            Self::PeTrailing => "pe_trailing",
        }
    }

    /// Value of this column in a snapshot.
    #[must_use]
    pub const fn value(&self, snapshot: &FundamentalSnapshot) -> Option<f64> {
        match self {
            Self::RevenueGrowthYoy => snapshot.revenue_growth_yoy,
            Self::DebtToEquity => snapshot.debt_to_equity,
            Self::InterestCoverage => snapshot.interest_coverage,
            Self::Roe => snapshot.roe,
            Self::ProfitMargin => snapshot.profit_margin,
            Self::CurrentRatio => snapshot.current_ratio,
            Self::MarketCap => snapshot.market_cap,
            Self::EpsTtm => snapshot.eps_ttm,
            Self::PeTtm => snapshot.pe_ttm,
            Self::Peg5y => snapshot.peg_5y,
            Self::CurrentPrice => snapshot.current_price,
            Self::Perf1y => snapshot.perf_1y,
            Self::Beta => snapshot.beta,
            Self::PeTrailing => snapshot.pe_trailing,
        }
    }
}

impl fmt::Display for NumericMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for NumericMetric {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.column() == wanted)
            .ok_or_else(|| DataError::InvalidParameter(format!("Unknown metric column: {s}")))
    }
}
