//! Raw financial statement slices.
//!
//! A [`RawStatement`] is one statement table for one security (for example the
//! quarterly balance sheet), stored as a list of [`StatementPeriod`]s ordered
//! most recent first. Line items are addressed by the typed [`LineItem`] enum
//! instead of free-form labels.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{period::PeriodType, profile::ProfileMap, types::Symbol};

/// The four statement slices fetched for every security.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementKind {
    /// Quarterly income statement.
    QuarterlyIncome,
    /// Quarterly balance sheet.
    QuarterlyBalanceSheet,
    /// Quarterly cash flow statement.
    QuarterlyCashflow,
    /// Annual financials (income statement).
    AnnualFinancials,
}

impl StatementKind {
    /// All statement kinds in fetch order.
    pub const ALL: [Self; 4] = [
        Self::QuarterlyIncome,
        Self::QuarterlyBalanceSheet,
        Self::QuarterlyCashflow,
        Self::AnnualFinancials,
    ];

    /// Reporting period of the statement.
    #[must_use]
    pub const fn period_type(&self) -> PeriodType {
        match self {
            Self::AnnualFinancials => PeriodType::Annual,
            _ => PeriodType::Quarterly,
        }
    }

    /// Line items a source should request for this statement.
    #[must_use]
    pub const fn line_items(&self) -> &'static [LineItem] {
        match self {
            Self::QuarterlyIncome => &[
                LineItem::TotalRevenue,
                LineItem::OperatingIncome,
                LineItem::InterestExpense,
                LineItem::NetIncome,
            ],
            Self::QuarterlyBalanceSheet => &[
                LineItem::TotalDebt,
                LineItem::StockholdersEquity,
                LineItem::CurrentAssets,
                LineItem::CurrentLiabilities,
            ],
            Self::QuarterlyCashflow => &[
                LineItem::OperatingCashFlow,
                LineItem::CapitalExpenditure,
                LineItem::FreeCashFlow,
            ],
            Self::AnnualFinancials => &[
                LineItem::TotalRevenue,
                LineItem::OperatingIncome,
                LineItem::InterestExpense,
                LineItem::NetIncome,
            ],
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::QuarterlyIncome => "quarterly income statement",
            Self::QuarterlyBalanceSheet => "quarterly balance sheet",
            Self::QuarterlyCashflow => "quarterly cash flow",
            Self::AnnualFinancials => "annual financials",
        };
        f.write_str(s)
    }
}

/// Statement line items used by the derivation engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LineItem {
    /// Total revenue.
    TotalRevenue,
    /// Operating income (EBIT).
    OperatingIncome,
    /// Interest expense. Sign varies between sources.
    InterestExpense,
    /// Net income.
    NetIncome,
    /// Total debt.
    TotalDebt,
    /// Stockholders' equity.
    StockholdersEquity,
    /// Current assets.
    CurrentAssets,
    /// Current liabilities.
    CurrentLiabilities,
    /// Operating cash flow.
    OperatingCashFlow,
    /// Capital expenditure.
    CapitalExpenditure,
    /// Free cash flow.
    FreeCashFlow,
}

impl LineItem {
    /// Human-readable statement label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::TotalRevenue => "Total Revenue",
            Self::OperatingIncome => "Operating Income",
            Self::InterestExpense => "Interest Expense",
            Self::NetIncome => "Net Income",
            Self::TotalDebt => "Total Debt",
            Self::StockholdersEquity => "Stockholders Equity",
            Self::CurrentAssets => "Current Assets",
            Self::CurrentLiabilities => "Current Liabilities",
            Self::OperatingCashFlow => "Operating Cash Flow",
            Self::CapitalExpenditure => "Capital Expenditure",
            Self::FreeCashFlow => "Free Cash Flow",
        }
    }

    /// Label without spaces, the form used by timeseries APIs
    /// (e.g. `TotalRevenue`).
    #[must_use]
    pub fn key(&self) -> String {
        self.label().replace(' ', "")
    }

    /// Looks up a line item by label or key, ignoring case and spaces.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        const ALL: [LineItem; 11] = [
            LineItem::TotalRevenue,
            LineItem::OperatingIncome,
            LineItem::InterestExpense,
            LineItem::NetIncome,
            LineItem::TotalDebt,
            LineItem::StockholdersEquity,
            LineItem::CurrentAssets,
            LineItem::CurrentLiabilities,
            LineItem::OperatingCashFlow,
            LineItem::CapitalExpenditure,
            LineItem::FreeCashFlow,
        ];
        let wanted: String = label
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        ALL.into_iter().find(|item| item.key().to_lowercase() == wanted)
    }
}

impl fmt::Display for LineItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Line item values reported for one period.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatementPeriod {
    /// End date of the reporting period.
    pub period_end: NaiveDate,
    items: BTreeMap<LineItem, f64>,
}

impl StatementPeriod {
    /// Creates an empty period.
    #[must_use]
    pub const fn new(period_end: NaiveDate) -> Self {
        Self {
            period_end,
            items: BTreeMap::new(),
        }
    }

    /// Sets a line item value. Non-finite values are dropped.
    #[must_use]
    pub fn with(mut self, item: LineItem, value: f64) -> Self {
        self.set(item, value);
        self
    }

    /// Sets a line item value in place. Non-finite values are dropped.
    pub fn set(&mut self, item: LineItem, value: f64) {
        if value.is_finite() {
            self.items.insert(item, value);
        }
    }

    /// Value of a line item, if reported.
    #[must_use]
    pub fn lookup(&self, item: LineItem) -> Option<f64> {
        self.items.get(&item).copied()
    }

    /// Returns true if no line items were reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// One statement table for one security.
///
/// Periods are kept ordered most recent first regardless of insertion order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawStatement {
    /// Which statement this is.
    pub kind: StatementKind,
    periods: Vec<StatementPeriod>,
}

impl RawStatement {
    /// Creates a statement from periods in any order.
    #[must_use]
    pub fn new(kind: StatementKind, mut periods: Vec<StatementPeriod>) -> Self {
        periods.sort_by(|a, b| b.period_end.cmp(&a.period_end));
        Self { kind, periods }
    }

    /// Creates a statement with no periods.
    #[must_use]
    pub const fn empty(kind: StatementKind) -> Self {
        Self {
            kind,
            periods: Vec::new(),
        }
    }

    /// Periods, most recent first.
    #[must_use]
    pub fn periods(&self) -> &[StatementPeriod] {
        &self.periods
    }

    /// Most recent period.
    #[must_use]
    pub fn latest(&self) -> Option<&StatementPeriod> {
        self.periods.first()
    }

    /// Value of a line item in the most recent period.
    #[must_use]
    pub fn lookup(&self, item: LineItem) -> Option<f64> {
        self.latest().and_then(|p| p.lookup(item))
    }

    /// Values of a line item across periods that report it, most recent first.
    pub fn values(&self, item: LineItem) -> impl Iterator<Item = f64> + '_ {
        self.periods.iter().filter_map(move |p| p.lookup(item))
    }

    /// Returns true if the statement has no periods.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }
}

/// Everything fetched for one security in one run.
///
/// Each slice is independently optional: a failed or empty fetch leaves it
/// `None` and the engine treats the dependent metrics as absent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawStatementBundle {
    /// Security the bundle belongs to.
    pub symbol: Symbol,
    /// Quarterly income statement.
    pub quarterly_income: Option<RawStatement>,
    /// Quarterly balance sheet.
    pub quarterly_balance_sheet: Option<RawStatement>,
    /// Quarterly cash flow.
    pub quarterly_cashflow: Option<RawStatement>,
    /// Annual financials.
    pub annual_financials: Option<RawStatement>,
    /// Flat market-data profile.
    pub profile: Option<ProfileMap>,
}

impl RawStatementBundle {
    /// Creates a bundle with every slice absent.
    #[must_use]
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            ..Default::default()
        }
    }

    /// Returns the slice for a statement kind.
    #[must_use]
    pub const fn statement(&self, kind: StatementKind) -> Option<&RawStatement> {
        match kind {
            StatementKind::QuarterlyIncome => self.quarterly_income.as_ref(),
            StatementKind::QuarterlyBalanceSheet => self.quarterly_balance_sheet.as_ref(),
            StatementKind::QuarterlyCashflow => self.quarterly_cashflow.as_ref(),
            StatementKind::AnnualFinancials => self.annual_financials.as_ref(),
        }
    }

    /// Stores a slice under its own kind.
    pub fn set_statement(&mut self, statement: RawStatement) {
        let slot = match statement.kind {
            StatementKind::QuarterlyIncome => &mut self.quarterly_income,
            StatementKind::QuarterlyBalanceSheet => &mut self.quarterly_balance_sheet,
            StatementKind::QuarterlyCashflow => &mut self.quarterly_cashflow,
            StatementKind::AnnualFinancials => &mut self.annual_financials,
        };
        *slot = Some(statement);
    }

    /// Builder form of [`set_statement`](Self::set_statement).
    #[must_use]
    pub fn with_statement(mut self, statement: RawStatement) -> Self {
        self.set_statement(statement);
        self
    }

    /// Sets the profile map.
    #[must_use]
    pub fn with_profile(mut self, profile: ProfileMap) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Number of slices (statements plus profile) present.
    #[must_use]
    pub fn present_slices(&self) -> usize {
        StatementKind::ALL
            .iter()
            .filter(|k| self.statement(**k).is_some())
            .count()
            + usize::from(self.profile.is_some())
    }
}
