//! Trade Ledger
//!
//! Orchestrates buy/sell execution against the daily price. The whole
//! read-then-write sequence (uniqueness check, price read, wallet
//! mutation, lot write) runs inside one sqlite transaction on the shared
//! connection, so two concurrent requests for the same
//! (member, instrument, day) key cannot both observe "no trade today";
//! the UNIQUE index on the trades table is the backstop. Every failure
//! rolls the transaction back with no partial effects.
//!
//! Serialization is connection-wide: trades on unrelated keys queue on
//! the same mutex, each holding it for one short single-pass
//! transaction. Per-key granularity would need a connection pool.

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::error::MarketError;
use super::history;
use super::position;
use crate::db;
use crate::models::{TradeKind, TradeLot, TradeOutcome};
use crate::wallet;

#[derive(Clone)]
pub struct TradeLedger {
    conn: Arc<Mutex<Connection>>,
}

impl TradeLedger {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Invest `points_to_invest` points at today's average price.
    ///
    /// Quantity is `points / price` with floor (integer) division; an
    /// order too small to buy a single unit is rejected. The wallet debit
    /// and the lot write commit together or not at all.
    pub async fn buy(
        &self,
        member_id: i64,
        instrument_id: i64,
        points_to_invest: i64,
        today: NaiveDate,
    ) -> Result<TradeLot, MarketError> {
        if points_to_invest <= 0 {
            return Err(MarketError::InvalidInput {
                message: format!("points to invest must be positive, got {}", points_to_invest),
            });
        }

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        if db::instrument_by_id(&tx, instrument_id)?.is_none() {
            return Err(MarketError::InstrumentNotFound { instrument_id });
        }
        if trade_exists(&tx, member_id, instrument_id, today, TradeKind::Buy)? {
            return Err(MarketError::DuplicateTrade {
                kind: TradeKind::Buy,
            });
        }

        let price = history::today_price(&tx, instrument_id, today)?
            .ok_or(MarketError::PriceUnavailable { instrument_id })?;
        let quantity = points_to_invest / price.avg;
        if quantity == 0 {
            return Err(MarketError::InvalidInput {
                message: format!(
                    "{} points cannot buy a single unit at price {}",
                    points_to_invest, price.avg
                ),
            });
        }

        wallet::debit(&tx, member_id, points_to_invest)?;

        let created_at = Utc::now();
        tx.execute(
            "INSERT INTO trades
                (instrument_id, member_id, kind, points, price_per_unit, quantity,
                 trade_date, closed, created_at)
             VALUES (?1, ?2, 'BUY', ?3, ?4, ?5, ?6, 0, ?7)",
            params![
                instrument_id,
                member_id,
                points_to_invest,
                price.avg,
                quantity,
                today.to_string(),
                created_at.to_rfc3339()
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        info!(
            member_id,
            instrument_id, points_to_invest, quantity, price = price.avg, "Buy executed"
        );

        Ok(TradeLot {
            id,
            instrument_id,
            member_id,
            kind: TradeKind::Buy,
            points: points_to_invest,
            price_per_unit: price.avg,
            quantity,
            date: today,
            closed: false,
            created_at,
        })
    }

    /// Liquidate the member's entire open position at today's average.
    ///
    /// The consumed BUY lots are marked closed in the same transaction as
    /// the SELL lot, so a later sell cannot aggregate them again.
    pub async fn sell(
        &self,
        member_id: i64,
        instrument_id: i64,
        today: NaiveDate,
    ) -> Result<TradeOutcome, MarketError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        if db::instrument_by_id(&tx, instrument_id)?.is_none() {
            return Err(MarketError::InstrumentNotFound { instrument_id });
        }
        if trade_exists(&tx, member_id, instrument_id, today, TradeKind::Sell)? {
            return Err(MarketError::DuplicateTrade {
                kind: TradeKind::Sell,
            });
        }

        let lots = open_buy_lots(&tx, member_id, instrument_id)?;
        if lots.is_empty() {
            return Err(MarketError::NoPosition);
        }
        let summary = position::aggregate(&lots)?;

        let today_avg = history::today_price(&tx, instrument_id, today)?
            .map(|p| p.avg)
            .ok_or(MarketError::PriceUnavailable { instrument_id })?;

        let total_proceeds = summary.total_quantity * today_avg;
        let earned_points = total_proceeds - summary.total_invested;

        wallet::credit(&tx, member_id, total_proceeds)?;

        tx.execute(
            "INSERT INTO trades
                (instrument_id, member_id, kind, points, price_per_unit, quantity,
                 trade_date, closed, created_at)
             VALUES (?1, ?2, 'SELL', ?3, ?4, ?5, ?6, 0, ?7)",
            params![
                instrument_id,
                member_id,
                total_proceeds,
                today_avg,
                summary.total_quantity,
                today.to_string(),
                Utc::now().to_rfc3339()
            ],
        )?;
        tx.execute(
            "UPDATE trades SET closed = 1
             WHERE member_id = ?1 AND instrument_id = ?2 AND kind = 'BUY' AND closed = 0",
            params![member_id, instrument_id],
        )?;
        tx.commit()?;

        info!(
            member_id,
            instrument_id,
            total_proceeds,
            earned_points,
            price = today_avg,
            "Sell executed"
        );

        Ok(TradeOutcome {
            total_proceeds,
            total_invested: summary.total_invested,
            earned_points,
        })
    }

    /// Open BUY lots for one (member, instrument) pair.
    pub async fn open_lots(
        &self,
        member_id: i64,
        instrument_id: i64,
    ) -> Result<Vec<TradeLot>, MarketError> {
        let conn = self.conn.lock().await;
        open_buy_lots(&conn, member_id, instrument_id).map_err(MarketError::from)
    }

    /// All of a member's open BUY lots, across instruments.
    pub async fn holdings(&self, member_id: i64) -> Result<Vec<TradeLot>, MarketError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, instrument_id, member_id, kind, points, price_per_unit,
                    quantity, trade_date, closed, created_at
             FROM trades
             WHERE member_id = ?1 AND kind = 'BUY' AND closed = 0
             ORDER BY instrument_id ASC, trade_date ASC",
        )?;
        let lots = stmt
            .query_map(params![member_id], lot_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lots)
    }

    /// One page of a member's trade history, newest first.
    pub async fn trade_history(
        &self,
        member_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TradeLot>, MarketError> {
        let limit = limit.clamp(1, 1000);
        let offset = offset.max(0);
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, instrument_id, member_id, kind, points, price_per_unit,
                    quantity, trade_date, closed, created_at
             FROM trades
             WHERE member_id = ?1
             ORDER BY trade_date DESC, id DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let lots = stmt
            .query_map(params![member_id, limit, offset], lot_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lots)
    }
}

fn trade_exists(
    conn: &Connection,
    member_id: i64,
    instrument_id: i64,
    date: NaiveDate,
    kind: TradeKind,
) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare_cached(
        "SELECT 1 FROM trades
         WHERE member_id = ?1 AND instrument_id = ?2 AND trade_date = ?3 AND kind = ?4
         LIMIT 1",
    )?;
    let mut rows = stmt.query(params![
        member_id,
        instrument_id,
        date.to_string(),
        kind.as_str()
    ])?;
    Ok(rows.next()?.is_some())
}

fn open_buy_lots(
    conn: &Connection,
    member_id: i64,
    instrument_id: i64,
) -> rusqlite::Result<Vec<TradeLot>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, instrument_id, member_id, kind, points, price_per_unit,
                quantity, trade_date, closed, created_at
         FROM trades
         WHERE member_id = ?1 AND instrument_id = ?2 AND kind = 'BUY' AND closed = 0
         ORDER BY trade_date ASC",
    )?;
    let lots = stmt
        .query_map(params![member_id, instrument_id], lot_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lots)
}

fn lot_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TradeLot> {
    let kind_text: String = row.get(3)?;
    let kind = TradeKind::from_str(&kind_text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown trade kind {:?}", kind_text).into(),
        )
    })?;
    let date_text: String = row.get(7)?;
    let date = date_text.parse::<NaiveDate>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let created_text: String = row.get(9)?;
    let created_at = chrono::DateTime::parse_from_rfc3339(&created_text)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
        })?
        .with_timezone(&Utc);

    Ok(TradeLot {
        id: row.get(0)?,
        instrument_id: row.get(1)?,
        member_id: row.get(2)?,
        kind,
        points: row.get(4)?,
        price_per_unit: row.get(5)?,
        quantity: row.get(6)?,
        date,
        closed: row.get::<_, i64>(8)? == 1,
        created_at,
    })
}
