//! Metric derivation engine.
//!
//! [`derive`] turns a [`RawStatementBundle`] into a [`FundamentalSnapshot`].
//! Every field is computed by its own function returning
//! `Result<_, MetricError>`; a failure resolves that one field to `None` and
//! never touches its siblings.

use chrono::NaiveDate;
use thiserror::Error;
use tracing::trace;

use stockag_core::profile::keys;
use stockag_core::{
    FundamentalSnapshot, LineItem, ProfileMap, RawStatement, RawStatementBundle, StatementKind,
    Symbol,
};

/// Why a single metric could not be computed.
///
/// These are expected input states, not failures of the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricError {
    /// The statement slice was not fetched.
    #[error("{0} not available")]
    MissingStatement(StatementKind),

    /// The latest period of a statement does not report a line item.
    #[error("{item} missing from {kind}")]
    MissingLineItem {
        /// Statement searched.
        kind: StatementKind,
        /// Line item wanted.
        item: LineItem,
    },

    /// The profile lacks a key or holds a value of the wrong type.
    #[error("profile key {0} missing")]
    MissingProfileKey(&'static str),

    /// Not enough periods report a line item.
    #[error("{kind} reports {item} for {found} periods, need {needed}")]
    InsufficientPeriods {
        /// Statement searched.
        kind: StatementKind,
        /// Line item wanted.
        item: LineItem,
        /// Periods found.
        found: usize,
        /// Periods required.
        needed: usize,
    },

    /// A denominator is zero.
    #[error("{0} is zero")]
    ZeroDenominator(&'static str),

    /// The computed value is NaN or infinite.
    #[error("{0} is not finite")]
    NonFinite(&'static str),
}

type MetricResult<T> = std::result::Result<T, MetricError>;

/// Derives the snapshot for one security, stamped with `as_of`.
///
/// Never fails. A metric that cannot be computed is `None`.
#[must_use]
pub fn derive(bundle: &RawStatementBundle, as_of: NaiveDate) -> FundamentalSnapshot {
    let symbol = &bundle.symbol;
    let profile = bundle.profile.as_ref();

    let mut snapshot = FundamentalSnapshot::new(symbol.clone(), as_of);
    snapshot.company_name = company_name(profile);

    snapshot.revenue_growth_yoy = settle(symbol, "revenue_growth_yoy", revenue_growth_yoy(bundle));
    snapshot.debt_to_equity = settle(symbol, "debt_to_equity", debt_to_equity(bundle));
    snapshot.interest_coverage = settle(symbol, "interest_coverage", interest_coverage(bundle));
    snapshot.free_cash_flow_positive = settle(
        symbol,
        "free_cash_flow_positive",
        free_cash_flow_positive(bundle),
    );
    snapshot.current_ratio = settle(symbol, "current_ratio", current_ratio(bundle));

    snapshot.roe = settle(symbol, "roe", number(profile, keys::RETURN_ON_EQUITY));
    snapshot.profit_margin = settle(symbol, "profit_margin", number(profile, keys::PROFIT_MARGINS));
    snapshot.market_cap = settle(symbol, "market_cap", number(profile, keys::MARKET_CAP));
    snapshot.eps_ttm = settle(symbol, "eps_ttm", number(profile, keys::TRAILING_EPS));
    snapshot.pe_ttm = settle(symbol, "pe_ttm", number(profile, keys::TRAILING_PE));
    snapshot.analyst_rating = settle(symbol, "analyst_rating", text(profile, keys::ANALYST_RATING));
    snapshot.peg_5y = settle(symbol, "peg_5y", number(profile, keys::TRAILING_PEG));
    snapshot.week_range_52 = settle(
        symbol,
        "week_range_52",
        range(
            profile,
            keys::FIFTY_TWO_WEEK_RANGE,
            keys::FIFTY_TWO_WEEK_LOW,
            keys::FIFTY_TWO_WEEK_HIGH,
        ),
    );
    snapshot.day_range = settle(
        symbol,
        "day_range",
        range(profile, keys::DAY_RANGE, keys::DAY_LOW, keys::DAY_HIGH),
    );
    snapshot.current_price = settle(symbol, "current_price", number(profile, keys::CURRENT_PRICE));
    snapshot.perf_1y = settle(symbol, "perf_1y", number(profile, keys::FIFTY_TWO_WEEK_CHANGE));
    snapshot.beta = settle(symbol, "beta", number(profile, keys::BETA));
    snapshot.pe_trailing = settle(symbol, "pe_trailing", pe_trailing(profile));

    snapshot
}

fn settle<T>(symbol: &Symbol, field: &'static str, result: MetricResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            trace!(symbol = %symbol, field, reason = %e, "Metric absent");
            None
        }
    }
}

fn statement(bundle: &RawStatementBundle, kind: StatementKind) -> MetricResult<&RawStatement> {
    bundle
        .statement(kind)
        .ok_or(MetricError::MissingStatement(kind))
}

fn latest(bundle: &RawStatementBundle, kind: StatementKind, item: LineItem) -> MetricResult<f64> {
    statement(bundle, kind)?
        .lookup(item)
        .ok_or(MetricError::MissingLineItem { kind, item })
}

fn finite(value: f64, what: &'static str) -> MetricResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(MetricError::NonFinite(what))
    }
}

fn ratio(numerator: f64, denominator: f64, denominator_name: &'static str) -> MetricResult<f64> {
    if denominator == 0.0 {
        return Err(MetricError::ZeroDenominator(denominator_name));
    }
    finite(numerator / denominator, denominator_name)
}

/// Growth between the two most recent annual periods that report revenue.
fn revenue_growth_yoy(bundle: &RawStatementBundle) -> MetricResult<f64> {
    let kind = StatementKind::AnnualFinancials;
    let item = LineItem::TotalRevenue;
    let stmt = statement(bundle, kind)?;

    let mut revenues = stmt.values(item);
    let (Some(current), Some(previous)) = (revenues.next(), revenues.next()) else {
        return Err(MetricError::InsufficientPeriods {
            kind,
            item,
            found: stmt.values(item).count(),
            needed: 2,
        });
    };
    ratio(current - previous, previous, "previous annual revenue")
}

fn debt_to_equity(bundle: &RawStatementBundle) -> MetricResult<f64> {
    let kind = StatementKind::QuarterlyBalanceSheet;
    let debt = latest(bundle, kind, LineItem::TotalDebt)?;
    let equity = latest(bundle, kind, LineItem::StockholdersEquity)?;
    ratio(debt, equity, "stockholders equity")
}

/// Sources disagree on the sign of interest expense.
fn interest_coverage(bundle: &RawStatementBundle) -> MetricResult<f64> {
    let kind = StatementKind::AnnualFinancials;
    let operating_income = latest(bundle, kind, LineItem::OperatingIncome)?;
    let interest_expense = latest(bundle, kind, LineItem::InterestExpense)?;
    ratio(operating_income, interest_expense.abs(), "interest expense")
}

/// Reads the latest quarterly cash-flow period; the bundle carries no annual
/// cash-flow statement.
fn free_cash_flow_positive(bundle: &RawStatementBundle) -> MetricResult<bool> {
    let fcf = latest(
        bundle,
        StatementKind::QuarterlyCashflow,
        LineItem::FreeCashFlow,
    )?;
    Ok(finite(fcf, "free cash flow")? > 0.0)
}

fn current_ratio(bundle: &RawStatementBundle) -> MetricResult<f64> {
    let kind = StatementKind::QuarterlyBalanceSheet;
    let assets = latest(bundle, kind, LineItem::CurrentAssets)?;
    let liabilities = latest(bundle, kind, LineItem::CurrentLiabilities)?;
    ratio(assets, liabilities, "current liabilities")
}

fn pe_trailing(profile: Option<&ProfileMap>) -> MetricResult<f64> {
    let price = number(profile, keys::CURRENT_PRICE)?;
    let eps = number(profile, keys::TRAILING_EPS)?;
    ratio(price, eps, "trailing EPS")
}

fn number(profile: Option<&ProfileMap>, key: &'static str) -> MetricResult<f64> {
    profile
        .and_then(|p| p.number(key))
        .ok_or(MetricError::MissingProfileKey(key))
}

fn text(profile: Option<&ProfileMap>, key: &'static str) -> MetricResult<String> {
    profile
        .and_then(|p| p.text(key))
        .map(str::to_string)
        .ok_or(MetricError::MissingProfileKey(key))
}

/// Preformatted range, or `"low - high"` composed from the bounds.
fn range(
    profile: Option<&ProfileMap>,
    key: &'static str,
    low_key: &'static str,
    high_key: &'static str,
) -> MetricResult<String> {
    if let Ok(preformatted) = text(profile, key) {
        return Ok(preformatted);
    }
    let low = number(profile, low_key)?;
    let high = number(profile, high_key)?;
    Ok(format!("{low:.2} - {high:.2}"))
}

fn company_name(profile: Option<&ProfileMap>) -> String {
    text(profile, keys::DISPLAY_NAME)
        .or_else(|_| text(profile, keys::SHORT_NAME))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use stockag_core::StatementPeriod;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn as_of() -> NaiveDate {
        date(2024, 6, 1)
    }

    fn annual(revenues: &[f64]) -> RawStatement {
        let periods = revenues
            .iter()
            .enumerate()
            .map(|(i, r)| {
                StatementPeriod::new(date(2023 - i as i32, 12, 31)).with(LineItem::TotalRevenue, *r)
            })
            .collect();
        RawStatement::new(StatementKind::AnnualFinancials, periods)
    }

    fn balance_sheet(items: &[(LineItem, f64)]) -> RawStatement {
        let period = items
            .iter()
            .fold(StatementPeriod::new(date(2024, 3, 31)), |p, (item, v)| {
                p.with(*item, *v)
            });
        RawStatement::new(StatementKind::QuarterlyBalanceSheet, vec![period])
    }

    fn cashflow(fcf: Option<f64>) -> RawStatement {
        let mut period = StatementPeriod::new(date(2024, 3, 31))
            .with(LineItem::OperatingCashFlow, 10.0);
        if let Some(v) = fcf {
            period.set(LineItem::FreeCashFlow, v);
        }
        RawStatement::new(StatementKind::QuarterlyCashflow, vec![period])
    }

    fn bundle() -> RawStatementBundle {
        RawStatementBundle::new(Symbol::new("TEST"))
    }

    #[test]
    fn test_revenue_growth() {
        let b = bundle().with_statement(annual(&[110.0, 100.0]));
        let s = derive(&b, as_of());
        assert!((s.revenue_growth_yoy.unwrap() - 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_revenue_growth_needs_two_years() {
        let b = bundle().with_statement(annual(&[110.0]));
        assert_eq!(derive(&b, as_of()).revenue_growth_yoy, None);
        assert_eq!(
            revenue_growth_yoy(&b),
            Err(MetricError::InsufficientPeriods {
                kind: StatementKind::AnnualFinancials,
                item: LineItem::TotalRevenue,
                found: 1,
                needed: 2,
            })
        );

        let zero_base = bundle().with_statement(annual(&[110.0, 0.0]));
        assert_eq!(derive(&zero_base, as_of()).revenue_growth_yoy, None);
    }

    #[test]
    fn test_debt_to_equity() {
        let b = bundle().with_statement(balance_sheet(&[
            (LineItem::TotalDebt, 50.0),
            (LineItem::StockholdersEquity, 200.0),
        ]));
        assert_eq!(derive(&b, as_of()).debt_to_equity, Some(0.25));

        let zero_equity = bundle().with_statement(balance_sheet(&[
            (LineItem::TotalDebt, 50.0),
            (LineItem::StockholdersEquity, 0.0),
        ]));
        assert_eq!(derive(&zero_equity, as_of()).debt_to_equity, None);
        assert_eq!(
            debt_to_equity(&zero_equity),
            Err(MetricError::ZeroDenominator("stockholders equity"))
        );
    }

    #[test]
    fn test_current_ratio() {
        let b = bundle().with_statement(balance_sheet(&[
            (LineItem::CurrentAssets, 80.0),
            (LineItem::CurrentLiabilities, 40.0),
        ]));
        assert_eq!(derive(&b, as_of()).current_ratio, Some(2.0));
    }

    #[test]
    fn test_free_cash_flow_sign() {
        let negative = bundle().with_statement(cashflow(Some(-5.0)));
        assert_eq!(derive(&negative, as_of()).free_cash_flow_positive, Some(false));

        let positive = bundle().with_statement(cashflow(Some(5.0)));
        assert_eq!(derive(&positive, as_of()).free_cash_flow_positive, Some(true));

        let missing = bundle().with_statement(cashflow(None));
        assert_eq!(derive(&missing, as_of()).free_cash_flow_positive, None);
    }

    #[test]
    fn test_interest_coverage_uses_absolute_expense() {
        let period = StatementPeriod::new(date(2023, 12, 31))
            .with(LineItem::OperatingIncome, 120.0)
            .with(LineItem::InterestExpense, -40.0);
        let b = bundle().with_statement(RawStatement::new(
            StatementKind::AnnualFinancials,
            vec![period],
        ));
        assert_eq!(derive(&b, as_of()).interest_coverage, Some(3.0));
    }

    #[test]
    fn test_current_ratio_zero_liabilities() {
        let b = bundle().with_statement(balance_sheet(&[
            (LineItem::TotalDebt, 50.0),
            (LineItem::StockholdersEquity, 200.0),
            (LineItem::CurrentAssets, 80.0),
            (LineItem::CurrentLiabilities, 0.0),
        ]));
        let s = derive(&b, as_of());
        assert_eq!(s.current_ratio, None);
        assert_eq!(s.debt_to_equity, Some(0.25));
        assert_eq!(
            current_ratio(&b),
            Err(MetricError::ZeroDenominator("current liabilities"))
        );
    }

    #[test]
    fn test_interest_coverage_zero_expense() {
        let period = StatementPeriod::new(date(2023, 12, 31))
            .with(LineItem::TotalRevenue, 110.0)
            .with(LineItem::OperatingIncome, 120.0)
            .with(LineItem::InterestExpense, 0.0);
        let previous = StatementPeriod::new(date(2022, 12, 31)).with(LineItem::TotalRevenue, 100.0);
        let b = bundle().with_statement(RawStatement::new(
            StatementKind::AnnualFinancials,
            vec![period, previous],
        ));
        let s = derive(&b, as_of());
        assert_eq!(s.interest_coverage, None);
        assert!((s.revenue_growth_yoy.unwrap() - 0.10).abs() < 1e-12);
        assert_eq!(
            interest_coverage(&b),
            Err(MetricError::ZeroDenominator("interest expense"))
        );
    }

    #[test]
    fn test_interest_coverage_missing_operating_income() {
        let period = StatementPeriod::new(date(2023, 12, 31))
            .with(LineItem::TotalRevenue, 110.0)
            .with(LineItem::InterestExpense, -40.0);
        let previous = StatementPeriod::new(date(2022, 12, 31)).with(LineItem::TotalRevenue, 100.0);
        let b = bundle()
            .with_statement(RawStatement::new(
                StatementKind::AnnualFinancials,
                vec![period, previous],
            ))
            .with_statement(balance_sheet(&[
                (LineItem::CurrentAssets, 80.0),
                (LineItem::CurrentLiabilities, 40.0),
            ]));
        let s = derive(&b, as_of());
        assert_eq!(s.interest_coverage, None);
        assert!((s.revenue_growth_yoy.unwrap() - 0.10).abs() < 1e-12);
        assert_eq!(s.current_ratio, Some(2.0));
        assert!(matches!(
            interest_coverage(&b),
            Err(MetricError::MissingLineItem {
                item: LineItem::OperatingIncome,
                ..
            })
        ));
    }

    #[test]
    fn test_missing_line_item_is_local() {
        let b = bundle().with_statement(balance_sheet(&[
            (LineItem::StockholdersEquity, 200.0),
            (LineItem::CurrentAssets, 80.0),
            (LineItem::CurrentLiabilities, 40.0),
        ]));
        let s = derive(&b, as_of());
        assert_eq!(s.debt_to_equity, None);
        assert_eq!(s.current_ratio, Some(2.0));
    }

    #[test]
    fn test_profile_passthrough() {
        let profile = ProfileMap::new()
            .with(keys::DISPLAY_NAME, "Test Corp")
            .with(keys::RETURN_ON_EQUITY, 0.21)
            .with(keys::MARKET_CAP, 1.5e9)
            .with(keys::TRAILING_PE, "n/a")
            .with(keys::ANALYST_RATING, "2.3 - Buy")
            .with(keys::FIFTY_TWO_WEEK_RANGE, "10.50 - 20.25")
            .with(keys::DAY_LOW, 11.0)
            .with(keys::DAY_HIGH, 12.5)
            .with(keys::BETA, Value::Null);
        let s = derive(&bundle().with_profile(profile), as_of());

        assert_eq!(s.company_name, "Test Corp");
        assert_eq!(s.roe, Some(0.21));
        assert_eq!(s.market_cap, Some(1.5e9));
        assert_eq!(s.pe_ttm, None);
        assert_eq!(s.analyst_rating.as_deref(), Some("2.3 - Buy"));
        assert_eq!(s.week_range_52.as_deref(), Some("10.50 - 20.25"));
        assert_eq!(s.day_range.as_deref(), Some("11.00 - 12.50"));
        assert_eq!(s.beta, None);
        assert_eq!(s.profit_margin, None);
    }

    #[test]
    fn test_company_name_fallback() {
        let profile = ProfileMap::new()
            .with(keys::DISPLAY_NAME, "  ")
            .with(keys::SHORT_NAME, "Short Name Inc.");
        let s = derive(&bundle().with_profile(profile), as_of());
        assert_eq!(s.company_name, "Short Name Inc.");

        assert_eq!(derive(&bundle(), as_of()).company_name, "");
    }

    #[test]
    fn test_pe_trailing() {
        let profile = ProfileMap::new()
            .with(keys::CURRENT_PRICE, 150.0)
            .with(keys::TRAILING_EPS, 6.0);
        assert_eq!(
            derive(&bundle().with_profile(profile), as_of()).pe_trailing,
            Some(25.0)
        );

        let zero_eps = ProfileMap::new()
            .with(keys::CURRENT_PRICE, 150.0)
            .with(keys::TRAILING_EPS, 0.0);
        let s = derive(&bundle().with_profile(zero_eps), as_of());
        assert_eq!(s.pe_trailing, None);
        assert_eq!(s.eps_ttm, Some(0.0));
    }

    #[test]
    fn test_empty_bundle_yields_empty_snapshot() {
        let s = derive(&bundle(), as_of());
        assert_eq!(s.symbol.as_str(), "TEST");
        assert_eq!(s.snapshot_date, as_of());
        assert_eq!(s.present_metrics(), 0);
    }
}
