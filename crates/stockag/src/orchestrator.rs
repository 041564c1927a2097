//! Batch update over a universe of securities.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate};
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use stockag_core::{
    DataError, DataProvider, FundamentalSnapshot, HistoryPeriod, MarketDataSource,
    RawStatementBundle, Result, Security, SnapshotStore, StatementKind, Symbol,
};

use crate::engine;
use crate::history::PriceHistoryFetcher;
use crate::report::{BatchReport, SecurityOutcome, SecurityStatus};

/// Bounded retry of rate-limited source calls.
///
/// Only [`DataError::RateLimited`] is retried; every other error is returned
/// at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay, doubled per retry unless the source asks for a delay.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    /// No retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (zero based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or_else(|| {
            self.backoff.saturating_mul(2u32.saturating_pow(attempt))
        })
    }

    /// Runs `op`, retrying while it is rate limited.
    pub async fn run<T, F, Fut>(&self, symbol: &Symbol, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(DataError::RateLimited { retry_after, .. }) if attempt < self.max_retries => {
                    let delay = self.delay_for(attempt, retry_after);
                    warn!(
                        symbol = %symbol,
                        what,
                        attempt = attempt + 1,
                        "Rate limited, retrying in {:?}",
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Tuning for a batch run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Securities processed at once. One processes them strictly in order.
    pub concurrency: usize,
    /// Price history window.
    pub history_period: HistoryPeriod,
    /// Snapshot date. `None` uses today's local date.
    pub run_date: Option<NaiveDate>,
    /// Rate-limit retries.
    pub retry: RetryPolicy,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            history_period: HistoryPeriod::FiveYears,
            run_date: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Drives the pipeline over an ordered universe.
///
/// Per security: fetch the four statement slices and the profile in
/// parallel, derive the snapshot, then ensure the security and replace its
/// snapshot in one transaction. Price history is fetched and replaced
/// afterwards in its own transaction; a failure there is logged and keeps the
/// committed snapshot. A failure for one security never affects another.
#[derive(Debug, Clone)]
pub struct BatchOrchestrator {
    source: Arc<dyn MarketDataSource>,
    store: Arc<dyn SnapshotStore>,
    options: BatchOptions,
}

impl BatchOrchestrator {
    /// Creates an orchestrator with default options.
    #[must_use]
    pub fn new(source: Arc<dyn MarketDataSource>, store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            source,
            store,
            options: BatchOptions::default(),
        }
    }

    /// Replaces the options.
    #[must_use]
    pub fn with_options(mut self, options: BatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Current options.
    #[must_use]
    pub const fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Runs the batch without a progress bar.
    pub async fn run(&self, tickers: &[Symbol]) -> BatchReport {
        self.run_with_progress(tickers, None).await
    }

    /// Runs the batch, advancing `progress` once per security.
    pub async fn run_with_progress(
        &self,
        tickers: &[Symbol],
        progress: Option<&ProgressBar>,
    ) -> BatchReport {
        let started = Instant::now();
        let run_date = self
            .options
            .run_date
            .unwrap_or_else(|| Local::now().date_naive());
        let total = tickers.len();
        let concurrency = self.options.concurrency.max(1);
        let history = PriceHistoryFetcher::new(Arc::clone(&self.source), self.options.history_period);
        let processed = AtomicUsize::new(0);

        info!(
            total,
            concurrency,
            run_date = %run_date,
            source = self.source.name(),
            "Starting update for {} tickers",
            total
        );
        if let Some(pb) = progress {
            pb.set_length(total as u64);
        }

        let outcomes: Vec<SecurityOutcome> = stream::iter(tickers.iter().cloned())
            .map(|symbol| {
                let history = &history;
                let processed = &processed;
                async move {
                    let outcome = self.process(symbol, run_date, history).await;
                    let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                    report_progress(&outcome, done, total, progress);
                    outcome
                }
            })
            .buffered(concurrency)
            .collect()
            .await;

        let mut report = BatchReport::new(run_date);
        for outcome in outcomes {
            report.record(outcome);
        }
        report.elapsed = started.elapsed();

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }
        report.log_summary();
        report
    }

    /// Processes one security. Never panics the batch and never returns an
    /// error; failures are folded into the outcome.
    async fn process(
        &self,
        symbol: Symbol,
        run_date: NaiveDate,
        history: &PriceHistoryFetcher,
    ) -> SecurityOutcome {
        let bundle = self.fetch_bundle(&symbol).await;
        if bundle.present_slices() == 0 {
            warn!(symbol = %symbol, "Skipping: no data returned");
            return SecurityOutcome::skipped(symbol);
        }

        let snapshot = engine::derive(&bundle, run_date);
        debug!(
            symbol = %symbol,
            slices = bundle.present_slices(),
            metrics = snapshot.present_metrics(),
            "Derived snapshot"
        );

        if let Err(e) = self.persist_snapshot(snapshot).await {
            error!(symbol = %symbol, error = %e, "Error processing security, rolled back");
            return SecurityOutcome::failed(symbol, e);
        }

        let mut outcome = SecurityOutcome::updated(symbol);
        match self.refresh_price_history(&outcome.symbol, history).await {
            Ok(rows) => outcome.price_rows = rows,
            Err(e) => {
                warn!(symbol = %outcome.symbol, error = %e, "Error updating price history");
                outcome.price_error = Some(e.to_string());
            }
        }
        outcome
    }

    /// Fetches every slice concurrently. A failed or empty slice is absent.
    async fn fetch_bundle(&self, symbol: &Symbol) -> RawStatementBundle {
        let retry = self.options.retry;
        let source = &self.source;

        let (income, balance_sheet, cashflow, annual, profile) = tokio::join!(
            retry.run(symbol, "quarterly income", move || {
                source.fetch_quarterly_income(symbol)
            }),
            retry.run(symbol, "quarterly balance sheet", move || {
                source.fetch_quarterly_balance_sheet(symbol)
            }),
            retry.run(symbol, "quarterly cash flow", move || {
                source.fetch_quarterly_cashflow(symbol)
            }),
            retry.run(symbol, "annual financials", move || {
                source.fetch_annual_financials(symbol)
            }),
            retry.run(symbol, "profile", move || source.fetch_profile(symbol)),
        );

        let mut bundle = RawStatementBundle::new(symbol.clone());
        let statements = [
            (StatementKind::QuarterlyIncome, income),
            (StatementKind::QuarterlyBalanceSheet, balance_sheet),
            (StatementKind::QuarterlyCashflow, cashflow),
            (StatementKind::AnnualFinancials, annual),
        ];
        for (kind, result) in statements {
            match result {
                Ok(statement) if statement.is_empty() => {
                    debug!(symbol = %symbol, "No periods in {}", kind);
                }
                Ok(statement) => bundle.set_statement(statement),
                Err(e) => log_fetch_failure(symbol, &kind, &e),
            }
        }
        match profile {
            Ok(profile) if profile.is_empty() => debug!(symbol = %symbol, "Empty profile"),
            Ok(profile) => bundle.profile = Some(profile),
            Err(e) => log_fetch_failure(symbol, &"profile", &e),
        }
        bundle
    }

    /// Ensures the security and replaces its snapshot in one transaction.
    async fn persist_snapshot(&self, snapshot: FundamentalSnapshot) -> Result<()> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            let security = Security::new(snapshot.symbol.clone(), snapshot.company_name.clone());
            let mut tx = store.begin()?;
            tx.ensure_security(&security)?;
            tx.replace_snapshot(&snapshot)?;
            tx.commit()
        })
        .await
        .map_err(|e| DataError::Other(e.to_string()))?
    }

    /// Replaces stored bars with a fresh fetch. An empty fetch keeps the
    /// stored bars and reports zero rows.
    async fn refresh_price_history(
        &self,
        symbol: &Symbol,
        history: &PriceHistoryFetcher,
    ) -> Result<usize> {
        let points = self
            .options
            .retry
            .run(symbol, "price history", move || history.fetch(symbol))
            .await?;

        if points.is_empty() {
            debug!(symbol = %symbol, "No price history returned, keeping stored rows");
            return Ok(0);
        }

        let rows = points.len();
        let store = Arc::clone(&self.store);
        let symbol = symbol.clone();
        tokio::task::spawn_blocking(move || store.replace_price_history(&symbol, &points))
            .await
            .map_err(|e| DataError::Other(e.to_string()))??;

        debug!("Added {} price history records", rows);
        Ok(rows)
    }
}

/// A failed slice is left out of the bundle either way; only the log level differs.
fn log_fetch_failure(symbol: &Symbol, what: &dyn fmt::Display, e: &DataError) {
    if e.is_source_unavailable() {
        warn!(symbol = %symbol, error = %e, "Could not fetch {}", what);
    } else {
        error!(symbol = %symbol, error = %e, "Unexpected error fetching {}", what);
    }
}

fn report_progress(
    outcome: &SecurityOutcome,
    done: usize,
    total: usize,
    progress: Option<&ProgressBar>,
) {
    let percent = if total == 0 {
        100.0
    } else {
        done as f64 / total as f64 * 100.0
    };
    let log = || match outcome.status {
        SecurityStatus::Updated => info!("[{:.2}%] Updated {}", percent, outcome.symbol),
        SecurityStatus::Skipped => info!("[{:.2}%] Skipped {}", percent, outcome.symbol),
        SecurityStatus::Failed => info!("[{:.2}%] Failed {}", percent, outcome.symbol),
    };

    match progress {
        Some(pb) => {
            pb.suspend(log);
            pb.set_message(outcome.symbol.to_string());
            pb.inc(1);
        }
        None => log(),
    }
}
