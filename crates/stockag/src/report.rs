//! Batch run summary.

use chrono::NaiveDate;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use stockag_core::Symbol;

/// What happened to one security.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SecurityStatus {
    /// Snapshot committed.
    Updated,
    /// Every source call failed or returned nothing; nothing was written.
    Skipped,
    /// Processing failed; the security's writes were rolled back.
    Failed,
}

/// Per-security result of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityOutcome {
    /// The security.
    pub symbol: Symbol,
    /// Snapshot status.
    pub status: SecurityStatus,
    /// Price rows written. Zero when the stored history was left untouched.
    pub price_rows: usize,
    /// Snapshot failure, if any.
    pub error: Option<String>,
    /// Price history failure, if any. Does not affect `status`.
    pub price_error: Option<String>,
}

impl SecurityOutcome {
    /// A committed snapshot.
    #[must_use]
    pub const fn updated(symbol: Symbol) -> Self {
        Self {
            symbol,
            status: SecurityStatus::Updated,
            price_rows: 0,
            error: None,
            price_error: None,
        }
    }

    /// A security with no data.
    #[must_use]
    pub const fn skipped(symbol: Symbol) -> Self {
        Self {
            symbol,
            status: SecurityStatus::Skipped,
            price_rows: 0,
            error: None,
            price_error: None,
        }
    }

    /// A failed security.
    #[must_use]
    pub fn failed(symbol: Symbol, error: impl ToString) -> Self {
        Self {
            symbol,
            status: SecurityStatus::Failed,
            price_rows: 0,
            error: Some(error.to_string()),
            price_error: None,
        }
    }
}

/// Summary of one batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// Date stamped on every snapshot.
    pub run_date: NaiveDate,
    /// Securities processed.
    pub total: usize,
    /// Snapshots committed.
    pub updated: usize,
    /// Securities with no data.
    pub skipped: usize,
    /// Securities rolled back.
    pub failed: usize,
    /// Price rows written across all securities.
    pub price_rows: usize,
    /// Securities whose price history could not be refreshed.
    pub price_failures: usize,
    /// Every per-security outcome, in input order.
    pub outcomes: Vec<SecurityOutcome>,
    /// Wall time.
    #[serde(skip)]
    pub elapsed: Duration,
}

impl BatchReport {
    /// An empty report.
    #[must_use]
    pub const fn new(run_date: NaiveDate) -> Self {
        Self {
            run_date,
            total: 0,
            updated: 0,
            skipped: 0,
            failed: 0,
            price_rows: 0,
            price_failures: 0,
            outcomes: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Adds one outcome.
    pub fn record(&mut self, outcome: SecurityOutcome) {
        self.total += 1;
        match outcome.status {
            SecurityStatus::Updated => self.updated += 1,
            SecurityStatus::Skipped => self.skipped += 1,
            SecurityStatus::Failed => self.failed += 1,
        }
        self.price_rows += outcome.price_rows;
        if outcome.price_error.is_some() {
            self.price_failures += 1;
        }
        self.outcomes.push(outcome);
    }

    /// Outcome for a security, if it was processed.
    #[must_use]
    pub fn outcome(&self, symbol: &Symbol) -> Option<&SecurityOutcome> {
        self.outcomes.iter().find(|o| &o.symbol == symbol)
    }

    /// Share of securities updated, in percent.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.updated as f64 / self.total as f64) * 100.0
        }
    }

    /// Returns true if no security failed.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.failed == 0
    }

    /// Logs the run summary and every failure.
    pub fn log_summary(&self) {
        for outcome in &self.outcomes {
            if let Some(error) = &outcome.error {
                warn!(symbol = %outcome.symbol, error = %error, "Security failed");
            }
        }
        info!(
            run_date = %self.run_date,
            total = self.total,
            updated = self.updated,
            skipped = self.skipped,
            failed = self.failed,
            price_rows = self.price_rows,
            price_failures = self.price_failures,
            success_rate = format!("{:.1}%", self.success_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "All updates completed"
        );
    }
}
