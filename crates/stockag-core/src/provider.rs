//! Provider traits for fetching market data.
//!
//! This module defines the core provider traits:
//!
//! - [`DataProvider`] - Base trait for all data providers
//! - [`MarketDataSource`] - Statements, profile and price history for one security

use async_trait::async_trait;
use std::fmt::Debug;

use crate::{
    error::Result,
    period::HistoryPeriod,
    profile::ProfileMap,
    statement::{RawStatement, StatementKind},
    types::{PriceHistoryPoint, Symbol},
};

/// Base trait for all data providers.
///
/// All data providers must implement this trait to provide basic metadata
/// about the provider.
pub trait DataProvider: Send + Sync + Debug {
    /// Returns the name of this provider (e.g., "Yahoo Finance").
    fn name(&self) -> &str;

    /// Returns a description of this provider.
    fn description(&self) -> &str;
}

/// Source of raw fundamentals and prices for a single security.
///
/// Every call may fail independently or return partial data. Callers treat a
/// failed call as an absent slice rather than a failed security.
#[async_trait]
pub trait MarketDataSource: DataProvider {
    /// Fetches one statement slice.
    ///
    /// An empty statement (no periods) is a valid answer.
    async fn fetch_statement(&self, symbol: &Symbol, kind: StatementKind) -> Result<RawStatement>;

    /// Fetches the quarterly income statement.
    async fn fetch_quarterly_income(&self, symbol: &Symbol) -> Result<RawStatement> {
        self.fetch_statement(symbol, StatementKind::QuarterlyIncome)
            .await
    }

    /// Fetches the quarterly balance sheet.
    async fn fetch_quarterly_balance_sheet(&self, symbol: &Symbol) -> Result<RawStatement> {
        self.fetch_statement(symbol, StatementKind::QuarterlyBalanceSheet)
            .await
    }

    /// Fetches the quarterly cash flow statement.
    async fn fetch_quarterly_cashflow(&self, symbol: &Symbol) -> Result<RawStatement> {
        self.fetch_statement(symbol, StatementKind::QuarterlyCashflow)
            .await
    }

    /// Fetches annual financials.
    async fn fetch_annual_financials(&self, symbol: &Symbol) -> Result<RawStatement> {
        self.fetch_statement(symbol, StatementKind::AnnualFinancials)
            .await
    }

    /// Fetches the flat market-data profile.
    async fn fetch_profile(&self, symbol: &Symbol) -> Result<ProfileMap>;

    /// Fetches daily bars over a trailing window ending today.
    ///
    /// Bars are returned in source order; callers normalize ordering.
    async fn fetch_price_history(
        &self,
        symbol: &Symbol,
        period: HistoryPeriod,
    ) -> Result<Vec<PriceHistoryPoint>>;
}
