#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/stockag/stockag/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Snapshot store implementations.
//!
//! This crate provides implementations of the [`SnapshotStore`] trait from `stockag-core`:
//!
//! - [`SqliteStore`] - Persistent SQLite store (default, requires `sqlite` feature)
//! - [`MemoryStore`] - In-memory store for testing

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use stockag_core::{DataError, Result};

/// In-memory store implementation.
pub mod memory;

/// SQLite-based store implementation.
#[cfg(feature = "sqlite")]
pub mod sqlite;

// Re-export the trait for convenience
pub use stockag_core::{SnapshotStore, StoreTransaction};

// Re-export implementations
pub use memory::MemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Where a store keeps its data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreLocation {
    /// Private in-process database.
    InMemory,
    /// Database file.
    File(PathBuf),
}

impl StoreLocation {
    /// Parses a database URL.
    ///
    /// Accepts `sqlite://path`, `sqlite:path`, `:memory:` and bare paths.
    /// `postgres://` URLs are normalized to `postgresql://` and rejected.
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(DataError::Configuration(
                "database URL is empty".to_string(),
            ));
        }

        let url = match url.strip_prefix("postgres://") {
            Some(rest) => format!("postgresql://{rest}"),
            None => url.to_string(),
        };
        if url.starts_with("postgresql://") {
            return Err(DataError::Configuration(format!(
                "unsupported database URL {url}: only SQLite is available"
            )));
        }

        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(&url);

        if path.is_empty() {
            return Err(DataError::Configuration(format!(
                "database URL {url} has no path"
            )));
        }
        if path == ":memory:" {
            return Ok(Self::InMemory);
        }
        if path.contains("://") {
            return Err(DataError::Configuration(format!(
                "unsupported database URL {url}"
            )));
        }
        Ok(Self::File(PathBuf::from(path)))
    }
}

impl FromStr for StoreLocation {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InMemory => f.write_str("sqlite::memory:"),
            Self::File(path) => write!(f, "sqlite://{}", path.display()),
        }
    }
}
