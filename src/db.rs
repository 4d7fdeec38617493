//! Database Setup
//!
//! Opens the sqlite database, creates the schema, and owns instrument
//! lookups. Price history, trades, and wallets live in the same database
//! so a trade and its wallet mutation can share one transaction.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::market::error::MarketError;
use crate::models::Instrument;

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).context("open stocksim db")?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory db")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS instruments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS prices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                instrument_id INTEGER NOT NULL,
                price_date TEXT NOT NULL,
                low INTEGER NOT NULL,
                avg INTEGER NOT NULL,
                high INTEGER NOT NULL,
                FOREIGN KEY (instrument_id) REFERENCES instruments(id)
            )",
            [],
        )?;
        // One point per (instrument, calendar day); same-day regeneration
        // overwrites through this key.
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_prices_instrument_date
             ON prices(instrument_id, price_date)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                instrument_id INTEGER NOT NULL,
                member_id INTEGER NOT NULL,
                kind TEXT NOT NULL CHECK (kind IN ('BUY', 'SELL')),
                points INTEGER NOT NULL,
                price_per_unit INTEGER NOT NULL,
                quantity INTEGER NOT NULL,
                trade_date TEXT NOT NULL,
                closed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                FOREIGN KEY (instrument_id) REFERENCES instruments(id)
            )",
            [],
        )?;
        // Backstop for the daily-uniqueness invariant: at most one BUY and
        // one SELL per (member, instrument, day) even under races.
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_trades_daily_unique
             ON trades(member_id, instrument_id, trade_date, kind)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_member_instrument
             ON trades(member_id, instrument_id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS wallets (
                member_id INTEGER PRIMARY KEY,
                points INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    /// Clone of the shared connection handle for the stores built on it.
    pub fn conn(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    /// Insert the configured instruments if the table is empty.
    pub async fn seed_instruments(&self, names: &[String]) -> Result<()> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM instruments", [], |row| row.get(0))?;
        if count > 0 {
            return Ok(());
        }
        for name in names {
            conn.execute(
                "INSERT OR IGNORE INTO instruments (name) VALUES (?1)",
                params![name],
            )?;
        }
        info!("Seeded {} instruments", names.len());
        Ok(())
    }

    pub async fn list_instruments(&self) -> Result<Vec<Instrument>, MarketError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached("SELECT id, name FROM instruments ORDER BY id ASC")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Instrument {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub async fn instrument(&self, instrument_id: i64) -> Result<Option<Instrument>, MarketError> {
        let conn = self.conn.lock().await;
        instrument_by_id(&conn, instrument_id).map_err(MarketError::from)
    }

    /// Create an instrument, returning its id. Idempotent on name.
    pub async fn create_instrument(&self, name: &str) -> Result<Instrument, MarketError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO instruments (name) VALUES (?1)",
            params![name],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM instruments WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(Instrument {
            id,
            name: name.to_string(),
        })
    }
}

/// Row-level lookup shared with the trade ledger, which needs the check
/// inside its own transaction.
pub(crate) fn instrument_by_id(
    conn: &Connection,
    instrument_id: i64,
) -> rusqlite::Result<Option<Instrument>> {
    let mut stmt = conn.prepare_cached("SELECT id, name FROM instruments WHERE id = ?1")?;
    let mut rows = stmt.query(params![instrument_id])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    Ok(Some(Instrument {
        id: row.get(0)?,
        name: row.get(1)?,
    }))
}
