#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/stockag/stockag/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stockag::{BatchOrchestrator, SqliteStore, Symbol, YahooProvider};
//!
//! #[tokio::main]
//! async fn main() -> stockag::Result<()> {
//!     let source = Arc::new(YahooProvider::new());
//!     let store = Arc::new(SqliteStore::new("stockag.db")?);
//!
//!     let tickers = Symbol::parse_list("AAPL, MSFT, GOOG");
//!     let report = BatchOrchestrator::new(source, store).run(&tickers).await;
//!     println!("{} updated, {} failed", report.updated, report.failed);
//!
//!     Ok(())
//! }
//! ```

// Core types and traits
pub use stockag_core::*;

// Stores
pub use stockag_store::{MemoryStore, StoreLocation};
#[cfg(feature = "store-sqlite")]
pub use stockag_store::SqliteStore;

// Sources
#[cfg(feature = "yahoo")]
pub use stockag_yahoo::YahooProvider;

pub mod engine;
pub mod history;
mod orchestrator;
mod report;

pub use engine::{MetricError, derive};
pub use history::PriceHistoryFetcher;
pub use orchestrator::{BatchOptions, BatchOrchestrator, RetryPolicy};
pub use report::{BatchReport, SecurityOutcome, SecurityStatus};
