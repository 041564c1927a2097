//! Integration tests for the batch pipeline against a stub source

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use stockag::{
    BatchOptions, BatchOrchestrator, DataError, DataProvider, FundamentalSnapshot, HistoryPeriod,
    LineItem, MarketDataSource, PriceHistoryPoint, ProfileMap, RawStatement, Result, RetryPolicy,
    ScreenerPage, ScreenerQuery, Security, SecurityStatus, SnapshotStore, SqliteStore,
    StatementKind, StatementPeriod, StoreTransaction, Symbol,
};

#[derive(Clone, Debug, Default)]
struct Fixture {
    statements: Vec<RawStatement>,
    failing: Vec<StatementKind>,
    profile: Option<ProfileMap>,
    prices: Vec<PriceHistoryPoint>,
}

#[derive(Debug, Default)]
struct StubSource {
    fixtures: Mutex<BTreeMap<Symbol, Fixture>>,
    profile_rate_limits: AtomicUsize,
    profile_calls: AtomicUsize,
}

impl StubSource {
    fn set(&self, ticker: &str, fixture: Fixture) {
        self.fixtures
            .lock()
            .unwrap()
            .insert(Symbol::new(ticker), fixture);
    }

    fn fixture(&self, symbol: &Symbol) -> Result<Fixture> {
        self.fixtures
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .ok_or_else(|| DataError::SymbolNotFound(symbol.to_string()))
    }
}

impl DataProvider for StubSource {
    fn name(&self) -> &str {
        "Stub"
    }

    fn description(&self) -> &str {
        "In-process fixtures"
    }
}

#[async_trait]
impl MarketDataSource for StubSource {
    async fn fetch_statement(&self, symbol: &Symbol, kind: StatementKind) -> Result<RawStatement> {
        let fixture = self.fixture(symbol)?;
        if fixture.failing.contains(&kind) {
            return Err(DataError::Network("connection reset".to_string()));
        }
        Ok(fixture
            .statements
            .into_iter()
            .find(|s| s.kind == kind)
            .unwrap_or_else(|| RawStatement::empty(kind)))
    }

    async fn fetch_profile(&self, symbol: &Symbol) -> Result<ProfileMap> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.profile_rate_limits.load(Ordering::SeqCst);
        if remaining > 0 {
            self.profile_rate_limits.store(remaining - 1, Ordering::SeqCst);
            return Err(DataError::RateLimited {
                provider: "Stub".to_string(),
                retry_after: Some(Duration::from_millis(1)),
            });
        }
        Ok(self.fixture(symbol)?.profile.unwrap_or_default())
    }

    async fn fetch_price_history(
        &self,
        symbol: &Symbol,
        _period: HistoryPeriod,
    ) -> Result<Vec<PriceHistoryPoint>> {
        Ok(self.fixture(symbol)?.prices)
    }
}

/// Store whose transactions fail for one security after writing its snapshot.
#[derive(Debug)]
struct FailingStore {
    inner: Arc<SqliteStore>,
    fail_for: Symbol,
}

struct FailingTransaction<'a> {
    inner: Box<dyn StoreTransaction + 'a>,
    fail_for: &'a Symbol,
}

impl StoreTransaction for FailingTransaction<'_> {
    fn ensure_security(&mut self, security: &Security) -> Result<()> {
        self.inner.ensure_security(security)
    }

    fn replace_snapshot(&mut self, snapshot: &FundamentalSnapshot) -> Result<()> {
        self.inner.replace_snapshot(snapshot)?;
        if &snapshot.symbol == self.fail_for {
            return Err(DataError::Persistence("disk full".to_string()));
        }
        Ok(())
    }

    fn replace_price_history(
        &mut self,
        symbol: &Symbol,
        points: &[PriceHistoryPoint],
    ) -> Result<()> {
        self.inner.replace_price_history(symbol, points)
    }

    fn commit(self: Box<Self>) -> Result<()> {
        self.inner.commit()
    }
}

impl SnapshotStore for FailingStore {
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>> {
        Ok(Box::new(FailingTransaction {
            inner: self.inner.begin()?,
            fail_for: &self.fail_for,
        }))
    }

    fn security(&self, symbol: &Symbol) -> Result<Option<Security>> {
        self.inner.security(symbol)
    }

    fn securities(&self) -> Result<Vec<Security>> {
        self.inner.securities()
    }

    fn snapshot(&self, symbol: &Symbol) -> Result<Option<FundamentalSnapshot>> {
        self.inner.snapshot(symbol)
    }

    fn price_history(
        &self,
        symbol: &Symbol,
        since: Option<NaiveDate>,
    ) -> Result<Vec<PriceHistoryPoint>> {
        self.inner.price_history(symbol, since)
    }

    fn screen(&self, query: &ScreenerQuery) -> Result<ScreenerPage> {
        self.inner.screen(query)
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn bars(start_day: u32, count: u32, close: f64) -> Vec<PriceHistoryPoint> {
    (0..count)
        .map(|i| {
            PriceHistoryPoint::from_ohlcv(date(2024, 3, start_day + i), close, close, close, close, 1e6)
        })
        .collect()
}

/// Complete fixture. `scale` shifts revenue so runs can be told apart.
fn full_fixture(name: &str, scale: f64) -> Fixture {
    let income = RawStatement::new(
        StatementKind::QuarterlyIncome,
        vec![StatementPeriod::new(date(2024, 3, 31)).with(LineItem::TotalRevenue, 25.0 * scale)],
    );
    let balance = RawStatement::new(
        StatementKind::QuarterlyBalanceSheet,
        vec![
            StatementPeriod::new(date(2024, 3, 31))
                .with(LineItem::TotalDebt, 50.0)
                .with(LineItem::StockholdersEquity, 100.0)
                .with(LineItem::CurrentAssets, 30.0)
                .with(LineItem::CurrentLiabilities, 20.0),
        ],
    );
    let cashflow = RawStatement::new(
        StatementKind::QuarterlyCashflow,
        vec![StatementPeriod::new(date(2024, 3, 31)).with(LineItem::FreeCashFlow, 5.0)],
    );
    let annual = RawStatement::new(
        StatementKind::AnnualFinancials,
        vec![
            StatementPeriod::new(date(2022, 12, 31)).with(LineItem::TotalRevenue, 100.0),
            StatementPeriod::new(date(2023, 12, 31))
                .with(LineItem::TotalRevenue, 100.0 * scale)
                .with(LineItem::OperatingIncome, 40.0)
                .with(LineItem::InterestExpense, -4.0),
        ],
    );
    let profile = ProfileMap::new()
        .with("displayName", name)
        .with("marketCap", 1.0e12 * scale)
        .with("returnOnEquity", 0.25)
        .with("currentPrice", 150.0)
        .with("trailingEps", 6.0);

    Fixture {
        statements: vec![income, balance, cashflow, annual],
        failing: Vec::new(),
        profile: Some(profile),
        prices: bars(1, 5, 150.0),
    }
}

fn options(run_date: NaiveDate) -> BatchOptions {
    BatchOptions {
        run_date: Some(run_date),
        retry: RetryPolicy {
            max_retries: 2,
            backoff: Duration::from_millis(1),
        },
        ..BatchOptions::default()
    }
}

fn symbols(tickers: &[&str]) -> Vec<Symbol> {
    tickers.iter().copied().map(Symbol::new).collect()
}

#[tokio::test]
async fn test_full_update_writes_snapshot_and_prices() {
    let source = Arc::new(StubSource::default());
    source.set("AAPL", full_fixture("Apple Inc.", 1.2));
    let store = Arc::new(SqliteStore::in_memory().unwrap());

    let report = BatchOrchestrator::new(source, store.clone())
        .with_options(options(date(2024, 6, 1)))
        .run(&symbols(&["AAPL"]))
        .await;

    assert_eq!(report.updated, 1);
    assert_eq!(report.price_rows, 5);
    assert!(report.is_clean());

    let aapl = Symbol::new("AAPL");
    let security = store.security(&aapl).unwrap().unwrap();
    assert_eq!(security.name, "Apple Inc.");

    let snapshot = store.snapshot(&aapl).unwrap().unwrap();
    assert_eq!(snapshot.snapshot_date, date(2024, 6, 1));
    assert!((snapshot.revenue_growth_yoy.unwrap() - 0.2).abs() < 1e-9);
    assert!((snapshot.debt_to_equity.unwrap() - 0.5).abs() < 1e-9);
    assert!((snapshot.interest_coverage.unwrap() - 10.0).abs() < 1e-9);
    assert!((snapshot.current_ratio.unwrap() - 1.5).abs() < 1e-9);
    assert_eq!(snapshot.free_cash_flow_positive, Some(true));
    assert!((snapshot.pe_trailing.unwrap() - 25.0).abs() < 1e-9);
    assert_eq!(store.price_history(&aapl, None).unwrap().len(), 5);
}

#[tokio::test]
async fn test_rerun_replaces_snapshot_and_history() {
    let source = Arc::new(StubSource::default());
    source.set("AAPL", full_fixture("Apple Inc.", 1.2));
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let tickers = symbols(&["AAPL"]);

    BatchOrchestrator::new(source.clone(), store.clone())
        .with_options(options(date(2024, 6, 1)))
        .run(&tickers)
        .await;

    let mut second = full_fixture("Apple Inc.", 1.5);
    second.prices = bars(20, 3, 170.0);
    source.set("AAPL", second);

    let report = BatchOrchestrator::new(source, store.clone())
        .with_options(options(date(2024, 6, 2)))
        .run(&tickers)
        .await;
    assert_eq!(report.updated, 1);

    let aapl = Symbol::new("AAPL");
    let page = store.screen(&ScreenerQuery::new()).unwrap();
    assert_eq!(page.total, 1);

    let snapshot = store.snapshot(&aapl).unwrap().unwrap();
    assert_eq!(snapshot.snapshot_date, date(2024, 6, 2));
    assert!((snapshot.revenue_growth_yoy.unwrap() - 0.5).abs() < 1e-9);

    let history = store.price_history(&aapl, None).unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].date, date(2024, 3, 20));
    assert!(history.iter().all(|p| p.close == Some(170.0)));
}

#[tokio::test]
async fn test_failed_security_is_rolled_back_alone() {
    let source = Arc::new(StubSource::default());
    source.set("AAPL", full_fixture("Apple Inc.", 1.2));
    source.set("MSFT", full_fixture("Microsoft", 1.1));
    let sqlite = Arc::new(SqliteStore::in_memory().unwrap());
    let tickers = symbols(&["AAPL", "MSFT", "GOOG"]);
    source.set("GOOG", full_fixture("Alphabet", 1.3));

    // First run stores every security.
    BatchOrchestrator::new(source.clone(), sqlite.clone())
        .with_options(options(date(2024, 6, 1)))
        .run(&tickers)
        .await;

    // Second run fails MSFT after its snapshot was written.
    let failing = Arc::new(FailingStore {
        inner: sqlite.clone(),
        fail_for: Symbol::new("MSFT"),
    });
    let report = BatchOrchestrator::new(source, failing)
        .with_options(options(date(2024, 6, 2)))
        .run(&tickers)
        .await;

    assert_eq!(report.updated, 2);
    assert_eq!(report.failed, 1);
    let msft = report.outcome(&Symbol::new("MSFT")).unwrap();
    assert_eq!(msft.status, SecurityStatus::Failed);
    assert!(msft.error.as_deref().unwrap().contains("disk full"));

    let stored = |t: &str| sqlite.snapshot(&Symbol::new(t)).unwrap().unwrap();
    assert_eq!(stored("AAPL").snapshot_date, date(2024, 6, 2));
    assert_eq!(stored("MSFT").snapshot_date, date(2024, 6, 1));
    assert_eq!(stored("GOOG").snapshot_date, date(2024, 6, 2));
}

#[tokio::test]
async fn test_first_write_failure_leaves_no_security() {
    let source = Arc::new(StubSource::default());
    source.set("MSFT", full_fixture("Microsoft", 1.1));
    let sqlite = Arc::new(SqliteStore::in_memory().unwrap());
    let failing = Arc::new(FailingStore {
        inner: sqlite.clone(),
        fail_for: Symbol::new("MSFT"),
    });

    let report = BatchOrchestrator::new(source, failing)
        .with_options(options(date(2024, 6, 1)))
        .run(&symbols(&["MSFT"]))
        .await;

    assert_eq!(report.failed, 1);
    let msft = Symbol::new("MSFT");
    assert!(sqlite.security(&msft).unwrap().is_none());
    assert!(sqlite.snapshot(&msft).unwrap().is_none());
    assert!(sqlite.price_history(&msft, None).unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_slice_only_drops_its_metrics() {
    let source = Arc::new(StubSource::default());
    let mut fixture = full_fixture("Apple Inc.", 1.2);
    fixture.failing = vec![StatementKind::QuarterlyBalanceSheet];
    source.set("AAPL", fixture);
    let store = Arc::new(SqliteStore::in_memory().unwrap());

    let report = BatchOrchestrator::new(source, store.clone())
        .with_options(options(date(2024, 6, 1)))
        .run(&symbols(&["AAPL"]))
        .await;
    assert_eq!(report.updated, 1);

    let snapshot = store.snapshot(&Symbol::new("AAPL")).unwrap().unwrap();
    assert_eq!(snapshot.debt_to_equity, None);
    assert_eq!(snapshot.current_ratio, None);
    assert!(snapshot.revenue_growth_yoy.is_some());
    assert_eq!(snapshot.free_cash_flow_positive, Some(true));
    assert_eq!(snapshot.roe, Some(0.25));
}

#[tokio::test]
async fn test_empty_price_fetch_keeps_stored_history() {
    let source = Arc::new(StubSource::default());
    source.set("AAPL", full_fixture("Apple Inc.", 1.2));
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let tickers = symbols(&["AAPL"]);

    BatchOrchestrator::new(source.clone(), store.clone())
        .with_options(options(date(2024, 6, 1)))
        .run(&tickers)
        .await;

    let mut no_prices = full_fixture("Apple Inc.", 1.2);
    no_prices.prices.clear();
    source.set("AAPL", no_prices);

    let report = BatchOrchestrator::new(source, store.clone())
        .with_options(options(date(2024, 6, 2)))
        .run(&tickers)
        .await;

    assert_eq!(report.updated, 1);
    assert_eq!(report.price_rows, 0);
    assert_eq!(
        store.price_history(&Symbol::new("AAPL"), None).unwrap().len(),
        5
    );
}

#[tokio::test]
async fn test_security_without_data_is_skipped() {
    let source = Arc::new(StubSource::default());
    source.set("AAPL", full_fixture("Apple Inc.", 1.2));
    let store = Arc::new(SqliteStore::in_memory().unwrap());

    let report = BatchOrchestrator::new(source, store.clone())
        .with_options(options(date(2024, 6, 1)))
        .run(&symbols(&["AAPL", "ZZZZ"]))
        .await;

    assert_eq!(report.updated, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(
        report.outcome(&Symbol::new("ZZZZ")).unwrap().status,
        SecurityStatus::Skipped
    );
    assert!(store.security(&Symbol::new("ZZZZ")).unwrap().is_none());
}

#[tokio::test]
async fn test_rate_limited_profile_is_retried() {
    let source = Arc::new(StubSource::default());
    source.set("AAPL", full_fixture("Apple Inc.", 1.2));
    source.profile_rate_limits.store(2, Ordering::SeqCst);
    let store = Arc::new(SqliteStore::in_memory().unwrap());

    BatchOrchestrator::new(source.clone(), store.clone())
        .with_options(options(date(2024, 6, 1)))
        .run(&symbols(&["AAPL"]))
        .await;

    assert_eq!(source.profile_calls.load(Ordering::SeqCst), 3);
    let snapshot = store.snapshot(&Symbol::new("AAPL")).unwrap().unwrap();
    assert!((snapshot.market_cap.unwrap() - 1.2e12).abs() < 1.0);
}

#[tokio::test]
async fn test_concurrent_run_keeps_input_order() {
    let source = Arc::new(StubSource::default());
    let tickers = ["MSFT", "AAPL", "NVDA", "GOOG", "AMZN"];
    for ticker in tickers {
        source.set(ticker, full_fixture(ticker, 1.1));
    }
    let store = Arc::new(SqliteStore::in_memory().unwrap());

    let report = BatchOrchestrator::new(source, store.clone())
        .with_options(BatchOptions {
            concurrency: 4,
            ..options(date(2024, 6, 1))
        })
        .run(&symbols(&tickers))
        .await;

    let order: Vec<&str> = report.outcomes.iter().map(|o| o.symbol.as_str()).collect();
    assert_eq!(order, tickers);
    assert_eq!(report.updated, 5);
    assert_eq!(store.securities().unwrap().len(), 5);
}
