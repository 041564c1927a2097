//! SQLite-based store implementation.

use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use stockag_core::{
    DataError, FundamentalSnapshot, PriceHistoryPoint, Result, ScreenerPage, ScreenerQuery,
    Security, SnapshotStore, SortColumn, StoreTransaction, Symbol,
};
use tracing::{debug, instrument, warn};

use crate::StoreLocation;

/// Snapshot columns in table order, after `ticker` and `snapshot_date`.
const SNAPSHOT_COLUMNS: &str = "revenue_growth_yoy, debt_to_equity, interest_coverage, \
     free_cash_flow_positive, roe, profit_margin, current_ratio, market_cap, eps_ttm, pe_ttm, \
     analyst_rating, peg_5y, week_range_52, day_range, current_price, perf_1y, beta, pe_trailing";

/// SQLite-backed [`SnapshotStore`].
///
/// One connection guarded by a mutex. Write transactions hold the lock from
/// `BEGIN IMMEDIATE` until commit or rollback, so writers are serialized.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database file.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or schema creation fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| DataError::Persistence(e.to_string()))?;
        Self::with_connection(conn)
    }

    /// Create a private in-memory database.
    ///
    /// Useful for testing; data is lost when the store is dropped.
    ///
    /// # Errors
    /// Returns an error if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DataError::Persistence(e.to_string()))?;
        Self::with_connection(conn)
    }

    /// Open the database at a parsed location.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or schema creation fails.
    pub fn open(location: &StoreLocation) -> Result<Self> {
        match location {
            StoreLocation::InMemory => Self::in_memory(),
            StoreLocation::File(path) => Self::new(path),
        }
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DataError::Persistence(e.to_string()))
    }

    /// Initialize the database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| DataError::Persistence(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS stock (
                ticker TEXT PRIMARY KEY,
                company_name TEXT NOT NULL DEFAULT ''
            )",
            [],
        )
        .map_err(|e| DataError::Persistence(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS fundamentals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker TEXT NOT NULL REFERENCES stock(ticker) ON DELETE CASCADE,
                snapshot_date TEXT NOT NULL,
                revenue_growth_yoy REAL,
                debt_to_equity REAL,
                interest_coverage REAL,
                free_cash_flow_positive INTEGER,
                roe REAL,
                profit_margin REAL,
                current_ratio REAL,
                market_cap REAL,
                eps_ttm REAL,
                pe_ttm REAL,
                analyst_rating TEXT,
                peg_5y REAL,
                week_range_52 TEXT,
                day_range TEXT,
                current_price REAL,
                perf_1y REAL,
                beta REAL,
                pe_trailing REAL
            )",
            [],
        )
        .map_err(|e| DataError::Persistence(e.to_string()))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_fundamentals_ticker ON fundamentals(ticker)",
            [],
        )
        .map_err(|e| DataError::Persistence(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS price_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker TEXT NOT NULL REFERENCES stock(ticker) ON DELETE CASCADE,
                date TEXT NOT NULL,
                open_price REAL,
                high_price REAL,
                low_price REAL,
                close_price REAL,
                volume REAL,
                UNIQUE (ticker, date)
            )",
            [],
        )
        .map_err(|e| DataError::Persistence(e.to_string()))?;

        debug!("SQLite store schema initialized");
        Ok(())
    }

    fn security_from_row(row: &Row<'_>) -> rusqlite::Result<Security> {
        Ok(Security::new(
            Symbol::new(row.get::<_, String>(0)?),
            row.get::<_, String>(1)?,
        ))
    }

    /// Maps `ticker, snapshot_date, company_name, SNAPSHOT_COLUMNS`.
    fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<FundamentalSnapshot> {
        Ok(FundamentalSnapshot {
            symbol: Symbol::new(row.get::<_, String>(0)?),
            snapshot_date: row.get(1)?,
            company_name: row.get(2)?,
            revenue_growth_yoy: row.get(3)?,
            debt_to_equity: row.get(4)?,
            interest_coverage: row.get(5)?,
            free_cash_flow_positive: row.get(6)?,
            roe: row.get(7)?,
            profit_margin: row.get(8)?,
            current_ratio: row.get(9)?,
            market_cap: row.get(10)?,
            eps_ttm: row.get(11)?,
            pe_ttm: row.get(12)?,
            analyst_rating: row.get(13)?,
            peg_5y: row.get(14)?,
            week_range_52: row.get(15)?,
            day_range: row.get(16)?,
            current_price: row.get(17)?,
            perf_1y: row.get(18)?,
            beta: row.get(19)?,
            pe_trailing: row.get(20)?,
        })
    }

    fn snapshot_select() -> String {
        format!(
            "SELECT f.ticker, f.snapshot_date, COALESCE(s.company_name, ''), {}
             FROM fundamentals f LEFT JOIN stock s ON s.ticker = f.ticker",
            SNAPSHOT_COLUMNS
                .split(", ")
                .map(|c| format!("f.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        )
    }

    /// WHERE clause and bind values for a screener query.
    fn screen_filter(query: &ScreenerQuery) -> (String, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if let Some(term) = query.ticker_term() {
            clauses.push("instr(UPPER(f.ticker), UPPER(?)) > 0".to_string());
            values.push(Value::Text(term.to_string()));
        }
        if let Some(term) = query.rating_term() {
            clauses.push("instr(LOWER(f.analyst_rating), LOWER(?)) > 0".to_string());
            values.push(Value::Text(term.to_string()));
        }
        if let Some(wanted) = query.fcf_positive {
            clauses.push("f.free_cash_flow_positive = ?".to_string());
            values.push(Value::Integer(i64::from(wanted)));
        }
        for (metric, filter) in &query.ranges {
            if let Some(min) = filter.min {
                clauses.push(format!("f.{} >= ?", metric.column()));
                values.push(Value::Real(min));
            }
            if let Some(max) = filter.max {
                clauses.push(format!("f.{} <= ?", metric.column()));
                values.push(Value::Real(max));
            }
        }

        let sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        (sql, values)
    }
}

/// Write transaction over the locked connection.
///
/// Rolls back on drop unless committed.
struct SqliteTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    committed: bool,
}

impl<'a> SqliteTransaction<'a> {
    fn begin(conn: MutexGuard<'a, Connection>) -> Result<Self> {
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| DataError::Persistence(e.to_string()))?;
        Ok(Self {
            conn,
            committed: false,
        })
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!("Rollback failed: {}", e);
            }
        }
    }
}

impl StoreTransaction for SqliteTransaction<'_> {
    fn ensure_security(&mut self, security: &Security) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO stock (ticker, company_name) VALUES (?1, ?2)
                 ON CONFLICT(ticker) DO UPDATE SET company_name = excluded.company_name
                 WHERE excluded.company_name <> ''",
                params![security.symbol.as_str(), security.name],
            )
            .map_err(|e| DataError::Persistence(e.to_string()))?;
        Ok(())
    }

    fn replace_snapshot(&mut self, snapshot: &FundamentalSnapshot) -> Result<()> {
        let ticker = snapshot.symbol.as_str();
        self.conn
            .execute("DELETE FROM fundamentals WHERE ticker = ?1", params![ticker])
            .map_err(|e| DataError::Persistence(e.to_string()))?;

        let sql = format!(
            "INSERT INTO fundamentals (ticker, snapshot_date, {SNAPSHOT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)"
        );
        self.conn
            .execute(
                &sql,
                params![
                    ticker,
                    snapshot.snapshot_date,
                    snapshot.revenue_growth_yoy,
                    snapshot.debt_to_equity,
                    snapshot.interest_coverage,
                    snapshot.free_cash_flow_positive,
                    snapshot.roe,
                    snapshot.profit_margin,
                    snapshot.current_ratio,
                    snapshot.market_cap,
                    snapshot.eps_ttm,
                    snapshot.pe_ttm,
                    snapshot.analyst_rating,
                    snapshot.peg_5y,
                    snapshot.week_range_52,
                    snapshot.day_range,
                    snapshot.current_price,
                    snapshot.perf_1y,
                    snapshot.beta,
                    snapshot.pe_trailing,
                ],
            )
            .map_err(|e| DataError::Persistence(e.to_string()))?;
        Ok(())
    }

    fn replace_price_history(
        &mut self,
        symbol: &Symbol,
        points: &[PriceHistoryPoint],
    ) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM price_history WHERE ticker = ?1",
                params![symbol.as_str()],
            )
            .map_err(|e| DataError::Persistence(e.to_string()))?;

        let mut stmt = self
            .conn
            .prepare(
                "INSERT INTO price_history
                 (ticker, date, open_price, high_price, low_price, close_price, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(ticker, date) DO UPDATE SET
                    open_price = excluded.open_price,
                    high_price = excluded.high_price,
                    low_price = excluded.low_price,
                    close_price = excluded.close_price,
                    volume = excluded.volume",
            )
            .map_err(|e| DataError::Persistence(e.to_string()))?;

        for point in points {
            stmt.execute(params![
                symbol.as_str(),
                point.date,
                point.open,
                point.high,
                point.low,
                point.close,
                point.volume,
            ])
            .map_err(|e| DataError::Persistence(e.to_string()))?;
        }
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| DataError::Persistence(e.to_string()))?;
        self.committed = true;
        Ok(())
    }
}

impl SnapshotStore for SqliteStore {
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>> {
        let tx = SqliteTransaction::begin(self.lock()?)?;
        Ok(Box::new(tx))
    }

    #[instrument(skip(self), fields(symbol = %symbol))]
    fn security(&self, symbol: &Symbol) -> Result<Option<Security>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT ticker, company_name FROM stock WHERE ticker = ?1",
            params![symbol.as_str()],
            Self::security_from_row,
        )
        .optional()
        .map_err(|e| DataError::Persistence(e.to_string()))
    }

    #[instrument(skip(self))]
    fn securities(&self) -> Result<Vec<Security>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT ticker, company_name FROM stock ORDER BY ticker ASC")
            .map_err(|e| DataError::Persistence(e.to_string()))?;
        let rows = stmt
            .query_map([], Self::security_from_row)
            .map_err(|e| DataError::Persistence(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| DataError::Persistence(e.to_string()))
    }

    #[instrument(skip(self), fields(symbol = %symbol))]
    fn snapshot(&self, symbol: &Symbol) -> Result<Option<FundamentalSnapshot>> {
        let conn = self.lock()?;
        let sql = format!(
            "{} WHERE f.ticker = ?1 ORDER BY f.id DESC LIMIT 1",
            Self::snapshot_select()
        );
        conn.query_row(&sql, params![symbol.as_str()], Self::snapshot_from_row)
            .optional()
            .map_err(|e| DataError::Persistence(e.to_string()))
    }

    #[instrument(skip(self), fields(symbol = %symbol))]
    fn price_history(
        &self,
        symbol: &Symbol,
        since: Option<NaiveDate>,
    ) -> Result<Vec<PriceHistoryPoint>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT date, open_price, high_price, low_price, close_price, volume
                 FROM price_history
                 WHERE ticker = ?1 AND (?2 IS NULL OR date >= ?2)
                 ORDER BY date ASC",
            )
            .map_err(|e| DataError::Persistence(e.to_string()))?;

        let rows = stmt
            .query_map(params![symbol.as_str(), since], |row| {
                Ok(PriceHistoryPoint {
                    date: row.get(0)?,
                    open: row.get(1)?,
                    high: row.get(2)?,
                    low: row.get(3)?,
                    close: row.get(4)?,
                    volume: row.get(5)?,
                })
            })
            .map_err(|e| DataError::Persistence(e.to_string()))?;

        let points = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| DataError::Persistence(e.to_string()))?;
        debug!("Found {} price rows", points.len());
        Ok(points)
    }

    #[instrument(skip(self, query))]
    fn screen(&self, query: &ScreenerQuery) -> Result<ScreenerPage> {
        let (filter, values) = Self::screen_filter(query);
        let conn = self.lock()?;

        let count_sql = format!(
            "SELECT COUNT(*) FROM fundamentals f LEFT JOIN stock s ON s.ticker = f.ticker{filter}"
        );
        let total: i64 = conn
            .query_row(&count_sql, params_from_iter(values.iter()), |row| row.get(0))
            .map_err(|e| DataError::Persistence(e.to_string()))?;

        let sort_column = match query.sort_by {
            SortColumn::Ticker => "f.ticker".to_string(),
            SortColumn::Metric(m) => format!("f.{}", m.column()),
        };
        let limit = query.effective_limit();
        let sql = format!(
            "{}{filter} ORDER BY {sort_column} {}, f.ticker ASC LIMIT {limit} OFFSET {}",
            Self::snapshot_select(),
            query.sort_order.sql(),
            query.offset(),
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| DataError::Persistence(e.to_string()))?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), Self::snapshot_from_row)
            .map_err(|e| DataError::Persistence(e.to_string()))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| DataError::Persistence(e.to_string()))?;

        Ok(ScreenerPage::new(
            rows,
            u64::try_from(total).unwrap_or_default(),
            query.effective_page(),
            limit,
        ))
    }
}
