//! Environment-based configuration.

use std::str::FromStr;
use std::time::Duration;

use stockag::{BatchOptions, DataError, HistoryPeriod, Result, RetryPolicy, StoreLocation, Symbol};
use tracing::warn;

const DATABASE_URL: &str = "DATABASE_URL";
const TICKERS: &str = "STOCKAG_TICKERS";
const CONCURRENCY: &str = "STOCKAG_CONCURRENCY";
const REQUEST_DELAY_MS: &str = "STOCKAG_REQUEST_DELAY_MS";
const MAX_RETRIES: &str = "STOCKAG_MAX_RETRIES";
const BACKOFF_MS: &str = "STOCKAG_BACKOFF_MS";
const HISTORY_PERIOD: &str = "STOCKAG_HISTORY_PERIOD";

/// Runtime settings. Command-line flags override these.
#[derive(Debug, Clone)]
pub(crate) struct StockagConfig {
    /// Where snapshots are stored.
    pub(crate) database: StoreLocation,
    /// Default universe. May be empty.
    pub(crate) tickers: Vec<Symbol>,
    /// Securities processed at once.
    pub(crate) concurrency: usize,
    /// Minimum delay between source requests (milliseconds).
    pub(crate) request_delay_ms: u64,
    /// Rate-limit retries per source call.
    pub(crate) max_retries: u32,
    /// Base retry backoff (milliseconds).
    pub(crate) backoff_ms: u64,
    /// Price history window.
    pub(crate) history_period: HistoryPeriod,
}

impl StockagConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub(crate) fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup.
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup(DATABASE_URL)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                DataError::Configuration(format!("{DATABASE_URL} environment variable is not set"))
            })?;

        Ok(Self {
            database: StoreLocation::parse(&database_url)?,
            tickers: lookup(TICKERS)
                .map(|v| Symbol::parse_list(&v))
                .unwrap_or_default(),
            concurrency: parse_or(&lookup, CONCURRENCY, 1),
            request_delay_ms: parse_or(&lookup, REQUEST_DELAY_MS, 1000),
            max_retries: parse_or(&lookup, MAX_RETRIES, 2),
            backoff_ms: parse_or(&lookup, BACKOFF_MS, 2000),
            history_period: parse_or(&lookup, HISTORY_PERIOD, HistoryPeriod::FiveYears),
        })
    }

    /// Delay between source requests.
    pub(crate) const fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    /// Batch options for these settings.
    pub(crate) fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            concurrency: self.concurrency.max(1),
            history_period: self.history_period,
            run_date: None,
            retry: RetryPolicy {
                max_retries: self.max_retries,
                backoff: Duration::from_millis(self.backoff_ms),
            },
        }
    }
}

/// Parses a value, falling back to `default` when unset or invalid.
fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Invalid value, using default");
            default
        }),
    }
}
