//! In-memory store implementation.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use stockag_core::store::screen_snapshots;
use stockag_core::{
    DataError, FundamentalSnapshot, PriceHistoryPoint, Result, ScreenerPage, ScreenerQuery,
    Security, SnapshotStore, StoreTransaction, Symbol,
};
use tracing::{debug, instrument};

#[derive(Clone, Debug, Default)]
struct MemoryState {
    securities: BTreeMap<Symbol, String>,
    snapshots: BTreeMap<Symbol, FundamentalSnapshot>,
    prices: BTreeMap<Symbol, BTreeMap<NaiveDate, PriceHistoryPoint>>,
}

impl MemoryState {
    fn require_security(&self, symbol: &Symbol) -> Result<()> {
        if self.securities.contains_key(symbol) {
            Ok(())
        } else {
            Err(DataError::Persistence(format!(
                "unknown security {symbol}: ensure it before writing dependent rows"
            )))
        }
    }

    fn with_name(&self, mut snapshot: FundamentalSnapshot) -> FundamentalSnapshot {
        snapshot.company_name = self
            .securities
            .get(&snapshot.symbol)
            .cloned()
            .unwrap_or_default();
        snapshot
    }
}

/// In-memory [`SnapshotStore`] for testing and dry runs.
///
/// Follows the same rules as the SQLite store: writers are serialized,
/// uncommitted writes are discarded, and snapshots or prices for an unknown
/// security are rejected.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|e| DataError::Persistence(e.to_string()))
    }
}

/// Stages writes on a copy of the state and swaps it in on commit.
struct MemoryTransaction<'a> {
    guard: MutexGuard<'a, MemoryState>,
    staged: MemoryState,
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn ensure_security(&mut self, security: &Security) -> Result<()> {
        let name = self
            .staged
            .securities
            .entry(security.symbol.clone())
            .or_default();
        if !security.name.is_empty() {
            name.clone_from(&security.name);
        }
        Ok(())
    }

    fn replace_snapshot(&mut self, snapshot: &FundamentalSnapshot) -> Result<()> {
        self.staged.require_security(&snapshot.symbol)?;
        self.staged
            .snapshots
            .insert(snapshot.symbol.clone(), snapshot.clone());
        Ok(())
    }

    fn replace_price_history(
        &mut self,
        symbol: &Symbol,
        points: &[PriceHistoryPoint],
    ) -> Result<()> {
        if points.is_empty() {
            self.staged.prices.remove(symbol);
            return Ok(());
        }
        self.staged.require_security(symbol)?;
        let rows = points.iter().map(|p| (p.date, p.clone())).collect();
        self.staged.prices.insert(symbol.clone(), rows);
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let Self { mut guard, staged } = *self;
        *guard = staged;
        debug!("Memory transaction committed");
        Ok(())
    }
}

impl SnapshotStore for MemoryStore {
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>> {
        let guard = self.lock()?;
        let staged = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, staged }))
    }

    fn security(&self, symbol: &Symbol) -> Result<Option<Security>> {
        let state = self.lock()?;
        Ok(state
            .securities
            .get(symbol)
            .map(|name| Security::new(symbol.clone(), name.clone())))
    }

    fn securities(&self) -> Result<Vec<Security>> {
        let state = self.lock()?;
        Ok(state
            .securities
            .iter()
            .map(|(symbol, name)| Security::new(symbol.clone(), name.clone()))
            .collect())
    }

    #[instrument(skip(self), fields(symbol = %symbol))]
    fn snapshot(&self, symbol: &Symbol) -> Result<Option<FundamentalSnapshot>> {
        let state = self.lock()?;
        Ok(state
            .snapshots
            .get(symbol)
            .cloned()
            .map(|s| state.with_name(s)))
    }

    #[instrument(skip(self), fields(symbol = %symbol))]
    fn price_history(
        &self,
        symbol: &Symbol,
        since: Option<NaiveDate>,
    ) -> Result<Vec<PriceHistoryPoint>> {
        let state = self.lock()?;
        let Some(rows) = state.prices.get(symbol) else {
            return Ok(Vec::new());
        };
        let start = since.unwrap_or(NaiveDate::MIN);
        Ok(rows.range(start..).map(|(_, p)| p.clone()).collect())
    }

    fn screen(&self, query: &ScreenerQuery) -> Result<ScreenerPage> {
        let state = self.lock()?;
        let rows = state.snapshots.values().map(|s| state.with_name(s.clone()));
        Ok(screen_snapshots(rows, query))
    }
}
