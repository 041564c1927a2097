#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/stockag/stockag/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for the fundamentals pipeline.
//!
//! This crate provides the foundational abstractions:
//!
//! - [`MarketDataSource`](provider::MarketDataSource) - Statements, profile and prices
//! - [`SnapshotStore`](store::SnapshotStore) - Transactional persistence
//! - [`RawStatementBundle`](statement::RawStatementBundle) - Raw inputs for one security
//! - [`FundamentalSnapshot`](snapshot::FundamentalSnapshot) - Derived metrics

/// Error types for data operations.
pub mod error;
/// Polars conversions.
pub mod frame;
/// Reporting period and history window definitions.
pub mod period;
/// Flat market-data profile map.
pub mod profile;
/// Provider traits for fetching market data.
pub mod provider;
/// Fundamentals snapshot.
pub mod snapshot;
/// Raw statement slices.
pub mod statement;
/// Persistence traits and screener queries.
pub mod store;
/// Core data types (Symbol, Security, PriceHistoryPoint).
pub mod types;

// Re-export commonly used items at crate root
pub use error::{DataError, Result};
pub use period::{HistoryPeriod, PeriodType};
pub use profile::ProfileMap;
pub use provider::{DataProvider, MarketDataSource};
pub use snapshot::{FundamentalSnapshot, NumericMetric};
pub use statement::{LineItem, RawStatement, RawStatementBundle, StatementKind, StatementPeriod};
pub use store::{
    RangeFilter, ScreenerPage, ScreenerQuery, SnapshotStore, SortColumn, SortOrder,
    StoreTransaction,
};
pub use types::{PriceHistoryPoint, Security, Symbol};
