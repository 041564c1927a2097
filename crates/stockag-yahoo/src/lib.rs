#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/stockag/stockag/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Yahoo Finance market data source.
//!
//! This crate provides a Yahoo Finance provider that implements the
//! [`DataProvider`] and [`MarketDataSource`] traits from `stockag-core`.
//!
//! # Features
//!
//! - Quarterly and annual statement line items from the fundamentals timeseries API
//! - Flat profile map merged from the quote and quote summary APIs
//! - Daily price bars from the chart API
//! - Built-in rate limiting (1 request per second by default)
//!
//! # Example
//!
//! ```no_run
//! use stockag_yahoo::YahooProvider;
//! use stockag_core::{HistoryPeriod, MarketDataSource, Symbol};
//!
//! # async fn example() -> stockag_core::Result<()> {
//! let provider = YahooProvider::new();
//! let symbol = Symbol::new("AAPL");
//!
//! let balance_sheet = provider.fetch_quarterly_balance_sheet(&symbol).await?;
//! let bars = provider
//!     .fetch_price_history(&symbol, HistoryPeriod::FiveYears)
//!     .await?;
//! println!("{} periods, {} bars", balance_sheet.periods().len(), bars.len());
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use stockag_core::profile::keys;
use stockag_core::{
    DataError, DataProvider, HistoryPeriod, LineItem, MarketDataSource, PeriodType,
    PriceHistoryPoint, ProfileMap, RawStatement, Result, StatementKind, StatementPeriod, Symbol,
};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Yahoo Finance chart API base URL.
const CHART_API_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Yahoo Finance quote API base URL.
const QUOTE_URL: &str = "https://query1.finance.yahoo.com/v7/finance/quote";

/// Yahoo Finance quote summary API base URL.
const QUOTE_SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";

/// Yahoo Finance fundamentals timeseries API base URL.
const TIMESERIES_URL: &str =
    "https://query2.finance.yahoo.com/ws/fundamentals-timeseries/v1/finance/timeseries";

/// Quote summary modules merged into the profile.
const SUMMARY_MODULES: &str = "price,summaryDetail,defaultKeyStatistics,financialData";

/// How far back statement line items are requested.
const STATEMENT_LOOKBACK_DAYS: i64 = 6 * 365;

/// Profile keys filled from an equivalent key when the source omits them.
const PROFILE_ALIASES: [(&str, &str); 3] = [
    (keys::CURRENT_PRICE, "regularMarketPrice"),
    (keys::TRAILING_EPS, "epsTrailingTwelveMonths"),
    (keys::TRAILING_PEG, "pegRatio"),
];

/// Default rate limit delay in milliseconds.
const DEFAULT_RATE_LIMIT_MS: u64 = 1000;

/// Provider name used in errors and logs.
const PROVIDER_NAME: &str = "Yahoo Finance";

/// User agent for HTTP requests.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

/// Yahoo Finance market data source.
///
/// Implements [`DataProvider`] and [`MarketDataSource`].
#[derive(Debug)]
pub struct YahooProvider {
    client: reqwest::Client,
    rate_limiter: Mutex<RateLimiter>,
}

/// Spaces requests at least `min_interval` apart.
///
/// Callers queue on the provider's lock, which is held across the sleep, so
/// concurrent requests are released one interval apart.
#[derive(Debug)]
struct RateLimiter {
    last_request: Option<Instant>,
    min_interval: Duration,
}

impl RateLimiter {
    const fn new(min_interval: Duration) -> Self {
        Self {
            last_request: None,
            min_interval,
        }
    }

    async fn wait(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                debug!("Rate limiting: waiting {:?}", wait_time);
                sleep(wait_time).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}

impl YahooProvider {
    /// Create a new Yahoo Finance provider with default settings.
    ///
    /// Uses built-in rate limiting of 1 request per second.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rate_limit(Duration::from_millis(DEFAULT_RATE_LIMIT_MS))
    }

    /// Create a new Yahoo Finance provider with a custom HTTP client.
    ///
    /// Uses the provided client for all HTTP requests. Rate limiting
    /// is still applied.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            rate_limiter: Mutex::new(RateLimiter::new(Duration::from_millis(
                DEFAULT_RATE_LIMIT_MS,
            ))),
        }
    }

    /// Create a new Yahoo Finance provider with custom rate limiting.
    #[must_use]
    pub fn with_rate_limit(rate_limit: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to configure HTTP client, using defaults: {}", e);
                reqwest::Client::new()
            });

        Self {
            client,
            rate_limiter: Mutex::new(RateLimiter::new(rate_limit)),
        }
    }

    /// Apply rate limiting before making a request.
    async fn apply_rate_limit(&self) {
        self.rate_limiter.lock().await.wait().await;
    }

    /// GET a JSON document, mapping HTTP failures onto [`DataError`].
    async fn get_json<T: DeserializeOwned>(&self, url: &str, symbol: &Symbol) -> Result<T> {
        self.apply_rate_limit().await;
        debug!("Fetching: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DataError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(DataError::RateLimited {
                provider: PROVIDER_NAME.to_string(),
                retry_after,
            });
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DataError::SymbolNotFound(symbol.to_string()));
        }

        if !status.is_success() {
            return Err(DataError::Network(format!("HTTP {} for {}", status, symbol)));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| DataError::Parse(e.to_string()))
    }

    /// Build the timeseries URL for every line item of a statement.
    fn build_timeseries_url(symbol: &Symbol, kind: StatementKind, now: DateTime<Utc>) -> String {
        let prefix = timeseries_prefix(kind);
        let types = kind
            .line_items()
            .iter()
            .map(|item| format!("{prefix}{}", item.key()))
            .collect::<Vec<_>>()
            .join(",");
        let start = now - chrono::Duration::days(STATEMENT_LOOKBACK_DAYS);

        format!(
            "{}/{}?symbol={}&type={}&period1={}&period2={}",
            TIMESERIES_URL,
            symbol.as_str(),
            symbol.as_str(),
            types,
            start.timestamp(),
            now.timestamp()
        )
    }

    /// Build the chart API URL for a symbol and date range.
    fn build_chart_url(symbol: &Symbol, start: NaiveDate, end: NaiveDate) -> String {
        let start_ts = start
            .and_hms_opt(0, 0, 0)
            .map(|dt| Utc.from_utc_datetime(&dt).timestamp())
            .unwrap_or(0);

        let end_ts = end
            .and_hms_opt(23, 59, 59)
            .map(|dt| Utc.from_utc_datetime(&dt).timestamp())
            .unwrap_or(0);

        format!(
            "{}/{}?period1={}&period2={}&interval=1d",
            CHART_API_URL,
            symbol.as_str(),
            start_ts,
            end_ts
        )
    }

    /// Fetch the flat quote record for a symbol.
    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Map<String, Value>> {
        let url = format!("{}?symbols={}", QUOTE_URL, symbol.as_str());
        let response: QuoteResponse = self.get_json(&url, symbol).await?;
        if let Some(error) = response.quote_response.error {
            return Err(api_error(symbol, "quote", error));
        }
        response
            .quote_response
            .result
            .into_iter()
            .next()
            .ok_or_else(|| DataError::SymbolNotFound(symbol.to_string()))
    }

    /// Fetch quote summary modules for a symbol.
    async fn fetch_quote_summary(&self, symbol: &Symbol) -> Result<Map<String, Value>> {
        let url = format!(
            "{}/{}?modules={}",
            QUOTE_SUMMARY_URL,
            symbol.as_str(),
            SUMMARY_MODULES
        );
        let response: QuoteSummaryResponse = self.get_json(&url, symbol).await?;
        if let Some(error) = response.quote_summary.error {
            return Err(api_error(symbol, "quote summary", error));
        }
        response
            .quote_summary
            .result
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| DataError::SymbolNotFound(symbol.to_string()))
    }
}

impl Default for YahooProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DataProvider for YahooProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn description(&self) -> &str {
        "Yahoo Finance statements, quote profile and daily prices"
    }
}

#[async_trait]
impl MarketDataSource for YahooProvider {
    async fn fetch_statement(&self, symbol: &Symbol, kind: StatementKind) -> Result<RawStatement> {
        let url = Self::build_timeseries_url(symbol, kind, Utc::now());
        let response: TimeseriesResponse = self.get_json(&url, symbol).await?;
        let statement = parse_timeseries(symbol, kind, response)?;
        debug!(
            "Fetched {} with {} periods for {}",
            kind,
            statement.periods().len(),
            symbol
        );
        Ok(statement)
    }

    async fn fetch_profile(&self, symbol: &Symbol) -> Result<ProfileMap> {
        let mut profile = ProfileMap::new();
        let mut failures = Vec::new();

        match self.fetch_quote(symbol).await {
            Ok(quote) => merge_quote(&mut profile, quote),
            Err(e) => {
                warn!("Quote lookup failed for {}: {}", symbol, e);
                failures.push(e);
            }
        }

        match self.fetch_quote_summary(symbol).await {
            Ok(summary) => merge_summary(&mut profile, summary),
            Err(e) => {
                warn!("Quote summary lookup failed for {}: {}", symbol, e);
                failures.push(e);
            }
        }

        if failures.len() == 2 {
            return Err(pick_error(failures));
        }

        apply_aliases(&mut profile);
        Ok(profile)
    }

    async fn fetch_price_history(
        &self,
        symbol: &Symbol,
        period: HistoryPeriod,
    ) -> Result<Vec<PriceHistoryPoint>> {
        let end = Utc::now().date_naive();
        let start = period.start_from(end);
        let url = Self::build_chart_url(symbol, start, end);

        let response: ChartResponse = self.get_json(&url, symbol).await?;
        parse_chart_response(symbol, response)
    }
}

fn timeseries_prefix(kind: StatementKind) -> &'static str {
    match kind.period_type() {
        PeriodType::Annual => "annual",
        PeriodType::Quarterly => "quarterly",
    }
}

fn api_error(symbol: &Symbol, what: &str, error: ApiError) -> DataError {
    if error.code == "Not Found" {
        return DataError::SymbolNotFound(symbol.to_string());
    }
    DataError::DataNotAvailable {
        symbol: symbol.to_string(),
        what: format!("{what} ({}: {})", error.code, error.description),
    }
}

/// Prefers a rate-limit error so callers know a retry may help.
fn pick_error(errors: Vec<DataError>) -> DataError {
    let mut fallback = None;
    for error in errors {
        if matches!(error, DataError::RateLimited { .. }) {
            return error;
        }
        fallback.get_or_insert(error);
    }
    fallback.unwrap_or_else(|| DataError::Other("no error recorded".to_string()))
}

/// Group timeseries entries into statement periods by `asOfDate`.
fn parse_timeseries(
    symbol: &Symbol,
    kind: StatementKind,
    response: TimeseriesResponse,
) -> Result<RawStatement> {
    if let Some(error) = response.timeseries.error {
        return Err(api_error(symbol, "timeseries", error));
    }

    let prefix = timeseries_prefix(kind);
    let mut periods: BTreeMap<NaiveDate, StatementPeriod> = BTreeMap::new();

    for series in &response.timeseries.result {
        let Some(type_name) = series.pointer("/meta/type/0").and_then(Value::as_str) else {
            continue;
        };
        let Some(item) = type_name
            .strip_prefix(prefix)
            .and_then(LineItem::from_label)
        else {
            debug!("Ignoring timeseries {}", type_name);
            continue;
        };
        let Some(entries) = series.get(type_name).and_then(Value::as_array) else {
            continue;
        };

        for entry in entries {
            let date = entry
                .get("asOfDate")
                .and_then(Value::as_str)
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());
            let value = entry.pointer("/reportedValue/raw").and_then(Value::as_f64);
            if let (Some(date), Some(value)) = (date, value) {
                periods
                    .entry(date)
                    .or_insert_with(|| StatementPeriod::new(date))
                    .set(item, value);
            }
        }
    }

    Ok(RawStatement::new(kind, periods.into_values().collect()))
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Number(_) | Value::String(_))
}

/// Quote records are already flat.
fn merge_quote(profile: &mut ProfileMap, quote: Map<String, Value>) {
    for (key, value) in quote {
        if is_scalar(&value) {
            profile.insert_missing(key, value);
        }
    }
}

/// Flattens `{module: {field: {raw, fmt}}}` into `field -> raw`.
fn merge_summary(profile: &mut ProfileMap, modules: Map<String, Value>) {
    for module in modules.into_values() {
        let Value::Object(fields) = module else {
            continue;
        };
        for (key, value) in fields {
            let value = match value {
                Value::Object(mut wrapped) => wrapped.remove("raw").filter(is_scalar),
                other if is_scalar(&other) => Some(other),
                _ => None,
            };
            if let Some(value) = value {
                profile.insert_missing(key, value);
            }
        }
    }
}

fn apply_aliases(profile: &mut ProfileMap) {
    for (target, source) in PROFILE_ALIASES {
        if profile.contains(target) {
            continue;
        }
        if let Some(value) = profile.get(source).cloned() {
            profile.insert(target, value);
        }
    }
}

/// Parse a chart response into daily bars in source order.
///
/// A response without timestamps yields no bars.
fn parse_chart_response(symbol: &Symbol, response: ChartResponse) -> Result<Vec<PriceHistoryPoint>> {
    if let Some(error) = response.chart.error {
        return Err(api_error(symbol, "chart", error));
    }

    let result = response
        .chart
        .result
        .unwrap_or_default()
        .into_iter()
        .next()
        .ok_or_else(|| DataError::SymbolNotFound(symbol.to_string()))?;

    let timestamps = result.timestamp.unwrap_or_default();
    if timestamps.is_empty() {
        return Ok(Vec::new());
    }

    // Shift to exchange local time so bars land on their trading date.
    let offset = result.meta.map(|m| m.gmtoffset).unwrap_or(0);
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let at = |values: &[Option<f64>], i: usize| values.get(i).copied().flatten();

    let points = timestamps
        .iter()
        .enumerate()
        .filter_map(|(i, &ts)| {
            let date = Utc.timestamp_opt(ts + offset, 0).single()?.date_naive();
            Some(
                PriceHistoryPoint {
                    date,
                    open: at(&quote.open, i),
                    high: at(&quote.high, i),
                    low: at(&quote.low, i),
                    close: at(&quote.close, i),
                    volume: at(&quote.volume, i),
                }
                .sanitized(),
            )
        })
        .collect();

    Ok(points)
}

// ============================================================================
// Yahoo Finance API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    description: String,
}

/// Chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteData>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Quote API response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    quote_response: QuoteResult,
}

#[derive(Debug, Deserialize)]
struct QuoteResult {
    #[serde(default)]
    result: Vec<Map<String, Value>>,
    error: Option<ApiError>,
}

/// Quote Summary API response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResponse {
    quote_summary: QuoteSummaryResult,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryResult {
    result: Option<Vec<Map<String, Value>>>,
    error: Option<ApiError>,
}

/// Fundamentals timeseries API response.
#[derive(Debug, Deserialize)]
struct TimeseriesResponse {
    timeseries: TimeseriesResult,
}

#[derive(Debug, Deserialize)]
struct TimeseriesResult {
    #[serde(default)]
    result: Vec<Value>,
    error: Option<ApiError>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_rate_limiting() {
        let provider = YahooProvider::with_rate_limit(Duration::from_millis(100));
        provider.apply_rate_limit().await;

        let start = Instant::now();
        tokio::join!(
            provider.apply_rate_limit(),
            provider.apply_rate_limit(),
            provider.apply_rate_limit(),
            provider.apply_rate_limit(),
        );

        // Four concurrent requests after the first need four intervals
        assert!(start.elapsed() >= Duration::from_millis(390));
    }

    #[tokio::test]
    async fn test_first_request_not_delayed() {
        let provider = YahooProvider::with_rate_limit(Duration::from_secs(5));
        let start = Instant::now();
        provider.apply_rate_limit().await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_build_timeseries_url() {
        let symbol = Symbol::new("AAPL");
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let url =
            YahooProvider::build_timeseries_url(&symbol, StatementKind::QuarterlyBalanceSheet, now);

        assert!(url.contains("/AAPL?symbol=AAPL"));
        assert!(url.contains("quarterlyTotalDebt"));
        assert!(url.contains("quarterlyStockholdersEquity"));
        assert!(url.contains(&format!("period2={}", now.timestamp())));

        let annual =
            YahooProvider::build_timeseries_url(&symbol, StatementKind::AnnualFinancials, now);
        assert!(annual.contains("annualTotalRevenue"));
        assert!(!annual.contains("quarterly"));
    }

    #[test]
    fn test_build_chart_url() {
        let symbol = Symbol::new("AAPL");
        let url = YahooProvider::build_chart_url(&symbol, date(2024, 1, 1), date(2024, 1, 31));

        assert!(url.contains("AAPL"));
        assert!(url.contains("interval=1d"));
        assert!(url.contains("period1=1704067200"));
    }

    #[test]
    fn test_parse_timeseries() {
        let body = json!({
            "timeseries": {
                "result": [
                    {
                        "meta": {"symbol": ["AAPL"], "type": ["annualTotalRevenue"]},
                        "timestamp": [1664496000, 1696032000],
                        "annualTotalRevenue": [
                            {"asOfDate": "2022-09-30", "reportedValue": {"raw": 394328000000.0, "fmt": "394.33B"}},
                            {"asOfDate": "2023-09-30", "reportedValue": {"raw": 383285000000.0, "fmt": "383.29B"}},
                            null
                        ]
                    },
                    {
                        "meta": {"symbol": ["AAPL"], "type": ["annualInterestExpense"]},
                        "annualInterestExpense": [
                            {"asOfDate": "2023-09-30", "reportedValue": {"raw": 3933000000.0}}
                        ]
                    },
                    {
                        "meta": {"symbol": ["AAPL"], "type": ["annualGoodwill"]},
                        "annualGoodwill": [
                            {"asOfDate": "2023-09-30", "reportedValue": {"raw": 1.0}}
                        ]
                    },
                    {"meta": {"symbol": ["AAPL"], "type": ["annualNetIncome"]}}
                ],
                "error": null
            }
        });
        let response: TimeseriesResponse = serde_json::from_value(body).unwrap();
        let stmt = parse_timeseries(
            &Symbol::new("AAPL"),
            StatementKind::AnnualFinancials,
            response,
        )
        .unwrap();

        assert_eq!(stmt.periods().len(), 2);
        assert_eq!(stmt.latest().unwrap().period_end, date(2023, 9, 30));
        assert_eq!(stmt.lookup(LineItem::TotalRevenue), Some(383_285_000_000.0));
        assert_eq!(stmt.lookup(LineItem::InterestExpense), Some(3_933_000_000.0));
        assert_eq!(stmt.lookup(LineItem::NetIncome), None);
        assert_eq!(stmt.periods()[1].lookup(LineItem::InterestExpense), None);
    }

    #[test]
    fn test_parse_timeseries_empty() {
        let body = json!({"timeseries": {"result": [], "error": null}});
        let response: TimeseriesResponse = serde_json::from_value(body).unwrap();
        let stmt =
            parse_timeseries(&Symbol::new("X"), StatementKind::QuarterlyCashflow, response)
                .unwrap();
        assert!(stmt.is_empty());
    }

    #[test]
    fn test_merge_profile_sources() {
        let quote = json!({
            "symbol": "AAPL",
            "displayName": "Apple",
            "shortName": "Apple Inc.",
            "marketCap": 3.0e12,
            "regularMarketPrice": 190.5,
            "epsTrailingTwelveMonths": 6.4,
            "fiftyTwoWeekRange": "164.08 - 237.23",
            "averageAnalystRating": "2.0 - Buy",
            "corporateActions": []
        });
        let summary = json!({
            "financialData": {
                "returnOnEquity": {"raw": 1.56, "fmt": "156%"},
                "profitMargins": {"raw": 0.26, "fmt": "26%"},
                "currentPrice": {}
            },
            "defaultKeyStatistics": {
                "52WeekChange": {"raw": 0.12},
                "beta": {"raw": 1.24},
                "pegRatio": {"raw": 2.1}
            },
            "summaryDetail": {
                "marketCap": {"raw": 1.0},
                "maxAge": 1
            }
        });

        let mut profile = ProfileMap::new();
        merge_quote(&mut profile, serde_json::from_value(quote).unwrap());
        merge_summary(&mut profile, serde_json::from_value(summary).unwrap());
        apply_aliases(&mut profile);

        assert_eq!(profile.text(keys::DISPLAY_NAME), Some("Apple"));
        assert_eq!(profile.number(keys::MARKET_CAP), Some(3.0e12));
        assert_eq!(profile.number(keys::RETURN_ON_EQUITY), Some(1.56));
        assert_eq!(profile.number(keys::FIFTY_TWO_WEEK_CHANGE), Some(0.12));
        assert_eq!(profile.number(keys::CURRENT_PRICE), Some(190.5));
        assert_eq!(profile.number(keys::TRAILING_EPS), Some(6.4));
        assert_eq!(profile.number(keys::TRAILING_PEG), Some(2.1));
        assert_eq!(profile.text(keys::FIFTY_TWO_WEEK_RANGE), Some("164.08 - 237.23"));
        assert!(!profile.contains("corporateActions"));
    }

    #[test]
    fn test_parse_chart_response() {
        let body = json!({
            "chart": {
                "result": [{
                    "meta": {"symbol": "AAPL", "gmtoffset": -14400},
                    "timestamp": [1704205800, 1704292200],
                    "indicators": {
                        "quote": [{
                            "open": [187.15, null],
                            "high": [188.44, 185.88],
                            "low": [183.89, 183.43],
                            "close": [185.64, 184.25],
                            "volume": [82488700, null]
                        }]
                    }
                }],
                "error": null
            }
        });
        let response: ChartResponse = serde_json::from_value(body).unwrap();
        let points = parse_chart_response(&Symbol::new("AAPL"), response).unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, date(2024, 1, 2));
        assert_eq!(points[0].volume, Some(82_488_700.0));
        assert_eq!(points[1].date, date(2024, 1, 3));
        assert_eq!(points[1].open, None);
        assert_eq!(points[1].close, Some(184.25));
    }

    #[test]
    fn test_parse_chart_not_found() {
        let body = json!({
            "chart": {
                "result": null,
                "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}
            }
        });
        let response: ChartResponse = serde_json::from_value(body).unwrap();
        let err = parse_chart_response(&Symbol::new("ZZZZ"), response).unwrap_err();
        assert!(matches!(err, DataError::SymbolNotFound(_)));
    }

    #[test]
    fn test_pick_error_prefers_rate_limit() {
        let err = pick_error(vec![
            DataError::Network("timeout".to_string()),
            DataError::RateLimited {
                provider: PROVIDER_NAME.to_string(),
                retry_after: None,
            },
        ]);
        assert!(matches!(err, DataError::RateLimited { .. }));
    }

    #[test]
    fn test_provider_info() {
        let provider = YahooProvider::default();
        assert_eq!(provider.name(), "Yahoo Finance");
        assert!(!provider.description().is_empty());
    }
}
