//! stockag CLI binary.
//!
//! Runs the fundamentals batch and queries the stored snapshots.

mod config;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use polars::prelude::{CsvWriter, DataFrame, SerWriter};
use serde::Serialize;
use serde_json::json;
use stockag::store::DEFAULT_PAGE_LIMIT;
use stockag::{
    BatchOrchestrator, DataError, HistoryPeriod, MemoryStore, NumericMetric, RangeFilter, Result,
    ScreenerQuery, SnapshotStore, SortColumn, SortOrder, SqliteStore, Symbol, YahooProvider,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::StockagConfig;

#[derive(Parser)]
#[command(name = "stockag")]
#[command(about = "Fundamentals snapshot pipeline and screener", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh snapshots and price history for a universe
    Update {
        /// Comma separated tickers (overrides STOCKAG_TICKERS)
        #[arg(long)]
        tickers: Option<String>,

        /// File with one or more tickers per line
        #[arg(long)]
        tickers_file: Option<PathBuf>,

        /// Securities processed at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Price history window (5D, 1M, 6M, 1Y, 5Y)
        #[arg(long)]
        history_period: Option<HistoryPeriod>,

        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,

        /// Derive and report without writing to the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Filter and sort stored snapshots
    Screen(ScreenArgs),

    /// Show the stored snapshot for a ticker
    Show {
        /// Stock symbol
        ticker: String,
    },

    /// Show stored price history for a ticker
    History {
        /// Stock symbol
        ticker: String,

        /// Trailing window (5D, 1M, 6M, 1Y, 5Y)
        #[arg(long, default_value = "1Y")]
        period: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = HistoryFormat::Json)]
        format: HistoryFormat,
    },

    /// List stored securities
    Stocks,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum HistoryFormat {
    Json,
    Csv,
}

#[derive(Args)]
struct ScreenArgs {
    /// Case-insensitive ticker substring
    #[arg(long)]
    ticker: Option<String>,

    /// Range filter as COLUMN=MIN..MAX; either bound may be omitted
    #[arg(long = "filter", short = 'f', value_parser = parse_range)]
    filters: Vec<(NumericMetric, RangeFilter)>,

    /// Require positive (true) or non-positive (false) free cash flow
    #[arg(long)]
    fcf_positive: Option<bool>,

    /// Case-insensitive analyst rating substring
    #[arg(long)]
    rating: Option<String>,

    /// Sort column; unknown names sort by market_cap
    #[arg(long, default_value = "market_cap")]
    sort_by: String,

    /// Sort direction (asc or desc)
    #[arg(long, default_value = "desc")]
    order: SortOrder,

    /// One-based page number
    #[arg(long, default_value_t = 1)]
    page: u32,

    /// Page size (at most 100)
    #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
    limit: u32,
}

impl ScreenArgs {
    fn into_query(self) -> ScreenerQuery {
        let mut query = ScreenerQuery::new()
            .sorted_by(SortColumn::parse_or_default(&self.sort_by), self.order)
            .paged(self.page, self.limit);
        for (metric, range) in self.filters {
            query = query.with_range(metric, range.min, range.max);
        }
        query.ticker_search = self.ticker;
        query.fcf_positive = self.fcf_positive;
        query.analyst_rating = self.rating;
        query
    }
}

/// Parses `market_cap=1e9..`, `pe_ttm=..25` or `roe=0.1..0.4`.
fn parse_range(s: &str) -> std::result::Result<(NumericMetric, RangeFilter), String> {
    let (column, bounds) = s
        .split_once('=')
        .ok_or_else(|| format!("expected COLUMN=MIN..MAX, got {s}"))?;
    let metric: NumericMetric = column.parse().map_err(|e: DataError| e.to_string())?;
    let (min, max) = bounds
        .split_once("..")
        .ok_or_else(|| format!("expected MIN..MAX, got {bounds}"))?;

    let bound = |raw: &str| -> std::result::Result<Option<f64>, String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse()
            .map(Some)
            .map_err(|_| format!("invalid bound {raw} for {column}"))
    };
    Ok((metric, RangeFilter::new(bound(min)?, bound(max)?)))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    if let Err(e) = run(cli.command).await {
        eprintln!("Error: {}", e);
        let code = if matches!(e, DataError::Configuration(_)) { 2 } else { 1 };
        process::exit(code);
    }
}

fn init_logging(level: &str) {
    let default_filter = format!(
        "stockag={level},stockag_core={level},stockag_store={level},stockag_yahoo={level}"
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(command: Commands) -> Result<()> {
    let config = StockagConfig::from_env()?;

    match command {
        Commands::Update {
            tickers,
            tickers_file,
            concurrency,
            history_period,
            no_progress,
            dry_run,
        } => {
            let universe = resolve_universe(&config, tickers.as_deref(), tickers_file.as_deref())?;
            let mut options = config.batch_options();
            if let Some(concurrency) = concurrency {
                options.concurrency = concurrency.max(1);
            }
            if let Some(period) = history_period {
                options.history_period = period;
            }

            let store: Arc<dyn SnapshotStore> = if dry_run {
                info!("Dry run, results are kept in memory");
                Arc::new(MemoryStore::new())
            } else {
                info!(database = %config.database, "Opening store");
                open_store(&config)?
            };
            let source = Arc::new(YahooProvider::with_rate_limit(config.request_delay()));

            let orchestrator = BatchOrchestrator::new(source, store).with_options(options);
            let report = if no_progress {
                orchestrator.run(&universe).await
            } else {
                let pb = progress_bar(universe.len());
                orchestrator.run_with_progress(&universe, Some(&pb)).await
            };
            print_json(&report)
        }
        Commands::Screen(args) => {
            let store = open_store(&config)?;
            let page = store.screen(&args.into_query())?;
            print_json(&page)
        }
        Commands::Show { ticker } => {
            let store = open_store(&config)?;
            let symbol = Symbol::new(ticker);
            let snapshot = store
                .snapshot(&symbol)?
                .ok_or_else(|| DataError::SymbolNotFound(symbol.to_string()))?;
            print_json(&snapshot)
        }
        Commands::History {
            ticker,
            period,
            format,
        } => {
            let store = open_store(&config)?;
            let symbol = Symbol::new(ticker);
            let period = HistoryPeriod::parse_or_default(&period);
            let since = period.start_from(Local::now().date_naive());
            match format {
                HistoryFormat::Json => {
                    let rows = store.price_history(&symbol, Some(since))?;
                    print_json(&json!({
                        "ticker": symbol,
                        "period": period.code(),
                        "since": since,
                        "rows": rows,
                    }))
                }
                HistoryFormat::Csv => {
                    let mut df = store.price_history_frame(&symbol, Some(since))?;
                    write_csv(&mut df, io::stdout().lock())
                }
            }
        }
        Commands::Stocks => {
            let store = open_store(&config)?;
            print_json(&store.securities()?)
        }
    }
}

/// Flag, then file, then environment. An empty universe is a configuration error.
fn resolve_universe(
    config: &StockagConfig,
    tickers: Option<&str>,
    tickers_file: Option<&Path>,
) -> Result<Vec<Symbol>> {
    let universe = match (tickers, tickers_file) {
        (Some(list), _) => Symbol::parse_list(list),
        (None, Some(path)) => {
            let contents = std::fs::read_to_string(path).map_err(|e| {
                DataError::Configuration(format!("cannot read {}: {}", path.display(), e))
            })?;
            Symbol::parse_list(&contents)
        }
        (None, None) => config.tickers.clone(),
    };

    if universe.is_empty() {
        return Err(DataError::Configuration(
            "no tickers: pass --tickers, --tickers-file or set STOCKAG_TICKERS".to_string(),
        ));
    }
    Ok(universe)
}

fn open_store(config: &StockagConfig) -> Result<Arc<SqliteStore>> {
    SqliteStore::open(&config.database).map(Arc::new)
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .map(|s| s.progress_chars("█▓░"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).map_err(|e| DataError::Parse(e.to_string()))?;
    println!("{out}");
    Ok(())
}

/// Writes the frame with a header row.
fn write_csv(df: &mut DataFrame, mut out: impl Write) -> Result<()> {
    CsvWriter::new(&mut out)
        .include_header(true)
        .finish(df)
        .map_err(|e| DataError::Other(e.to_string()))?;
    out.flush().map_err(|e| DataError::Other(e.to_string()))
}
