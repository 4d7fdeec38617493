//! Price History Store
//!
//! Daily price points in a rolling two-week window: prune-then-insert on
//! each new trading day, point lookups for trade execution, and the
//! past/future range queries backing the chart API. All access is
//! serialized on the shared connection, so every query observes a
//! consistent snapshot relative to concurrent prune/insert.

use chrono::{Days, NaiveDate};
use rusqlite::{params, Connection};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::error::MarketError;
use crate::models::PricePoint;

/// Trailing (and forward) window length kept for charting.
pub const RETENTION_DAYS: u64 = 14;

#[derive(Clone)]
pub struct PriceHistoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl PriceHistoryStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Insert one price point. Upsert keyed by (instrument, day): a second
    /// generation for the same day overwrites.
    pub async fn insert(&self, point: &PricePoint) -> Result<(), MarketError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO prices (instrument_id, price_date, low, avg, high)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(instrument_id, price_date) DO UPDATE SET
                low = excluded.low,
                avg = excluded.avg,
                high = excluded.high",
            params![
                point.instrument_id,
                point.date.to_string(),
                point.low,
                point.avg,
                point.high
            ],
        )?;
        Ok(())
    }

    /// Delete all points older than `cutoff`, across all instruments.
    pub async fn prune(&self, cutoff: NaiveDate) -> Result<usize, MarketError> {
        let conn = self.conn.lock().await;
        let deleted = conn.execute(
            "DELETE FROM prices WHERE price_date < ?1",
            params![cutoff.to_string()],
        )?;
        Ok(deleted)
    }

    /// The most recent point dated on or before `today`; `None` on the
    /// first run for a new instrument.
    pub async fn latest(
        &self,
        instrument_id: i64,
        today: NaiveDate,
    ) -> Result<Option<PricePoint>, MarketError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT instrument_id, price_date, low, avg, high FROM prices
             WHERE instrument_id = ?1 AND price_date <= ?2
             ORDER BY price_date DESC LIMIT 1",
        )?;
        let mut rows = stmt.query(params![instrument_id, today.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(point_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// The point for `today`, the authoritative traded price.
    pub async fn today(
        &self,
        instrument_id: i64,
        today: NaiveDate,
    ) -> Result<Option<PricePoint>, MarketError> {
        let conn = self.conn.lock().await;
        today_price(&conn, instrument_id, today).map_err(MarketError::from)
    }

    /// Today's average, failing when no point exists yet.
    pub async fn today_avg(&self, instrument_id: i64, today: NaiveDate) -> Result<i64, MarketError> {
        let conn = self.conn.lock().await;
        today_price(&conn, instrument_id, today)?
            .map(|p| p.avg)
            .ok_or(MarketError::PriceUnavailable { instrument_id })
    }

    /// Points in `[today - 2 weeks, today]`, ascending.
    pub async fn window_past(
        &self,
        instrument_id: i64,
        today: NaiveDate,
    ) -> Result<Vec<PricePoint>, MarketError> {
        let start = today - Days::new(RETENTION_DAYS);
        self.range(instrument_id, start, today).await
    }

    /// Points in `(today, today + 2 weeks]`, ascending. Non-empty only if
    /// something pre-generated forward-dated points; daily generation
    /// never does.
    pub async fn window_future(
        &self,
        instrument_id: i64,
        today: NaiveDate,
    ) -> Result<Vec<PricePoint>, MarketError> {
        let start = today + Days::new(1);
        let end = today + Days::new(RETENTION_DAYS);
        self.range(instrument_id, start, end).await
    }

    /// Points with date in `[start, end]`, ascending.
    async fn range(
        &self,
        instrument_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, MarketError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT instrument_id, price_date, low, avg, high FROM prices
             WHERE instrument_id = ?1 AND price_date >= ?2 AND price_date <= ?3
             ORDER BY price_date ASC",
        )?;
        let rows = stmt
            .query_map(
                params![instrument_id, start.to_string(), end.to_string()],
                |row| point_from_row(row),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// Today-price lookup shared with the trade ledger, which reads it inside
/// its own transaction.
pub(crate) fn today_price(
    conn: &Connection,
    instrument_id: i64,
    today: NaiveDate,
) -> rusqlite::Result<Option<PricePoint>> {
    let mut stmt = conn.prepare_cached(
        "SELECT instrument_id, price_date, low, avg, high FROM prices
         WHERE instrument_id = ?1 AND price_date = ?2",
    )?;
    let mut rows = stmt.query(params![instrument_id, today.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(point_from_row(row)?)),
        None => Ok(None),
    }
}

fn point_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PricePoint> {
    let date_text: String = row.get(1)?;
    let date = date_text.parse::<NaiveDate>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(PricePoint {
        instrument_id: row.get(0)?,
        date,
        low: row.get(2)?,
        avg: row.get(3)?,
        high: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn point(instrument_id: i64, date: NaiveDate, avg: i64) -> PricePoint {
        PricePoint {
            instrument_id,
            date,
            low: avg - 1_000,
            avg,
            high: avg + 1_000,
        }
    }

    async fn seeded_store() -> (Database, PriceHistoryStore, NaiveDate) {
        let db = Database::open_in_memory().unwrap();
        let stock = db.create_instrument("Test Stock").await.unwrap();
        let store = PriceHistoryStore::new(db.conn());
        let today = day(2024, 6, 28);

        // Three weeks back through one week forward, one point per week.
        let id = stock.id;
        store.insert(&point(id, today - Days::new(21), 9_000)).await.unwrap();
        store.insert(&point(id, today - Days::new(14), 10_000)).await.unwrap();
        store.insert(&point(id, today - Days::new(7), 11_000)).await.unwrap();
        store.insert(&point(id, today, 12_000)).await.unwrap();
        store.insert(&point(id, today + Days::new(7), 13_000)).await.unwrap();

        (db, store, today)
    }

    #[tokio::test]
    async fn test_prune_deletes_only_older_than_cutoff() {
        let (_db, store, today) = seeded_store().await;
        let cutoff = today - Days::new(15);

        let deleted = store.prune(cutoff).await.unwrap();
        assert_eq!(deleted, 1);

        let remaining = store.window_past(1, today).await.unwrap();
        assert!(remaining.iter().all(|p| p.date >= cutoff));
    }

    #[tokio::test]
    async fn test_latest_ignores_future_points() {
        let (_db, store, today) = seeded_store().await;
        let latest = store.latest(1, today).await.unwrap().unwrap();
        assert_eq!(latest.avg, 12_000);
        assert_eq!(latest.date, today);
    }

    #[tokio::test]
    async fn test_today_and_today_avg() {
        let (_db, store, today) = seeded_store().await;
        assert_eq!(store.today(1, today).await.unwrap().unwrap().avg, 12_000);
        assert_eq!(store.today_avg(1, today).await.unwrap(), 12_000);

        let missing = store.today_avg(2, today).await;
        assert!(matches!(
            missing,
            Err(MarketError::PriceUnavailable { instrument_id: 2 })
        ));
    }

    #[tokio::test]
    async fn test_window_past_is_inclusive_and_ascending() {
        let (_db, store, today) = seeded_store().await;
        let past = store.window_past(1, today).await.unwrap();

        // Exactly-two-weeks-ago is inside the window; three weeks ago is not.
        assert_eq!(past.len(), 3);
        assert_eq!(past[0].avg, 10_000);
        assert_eq!(past[2].avg, 12_000);
        assert!(past.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[tokio::test]
    async fn test_window_future_excludes_today() {
        let (_db, store, today) = seeded_store().await;
        let future = store.window_future(1, today).await.unwrap();
        assert_eq!(future.len(), 1);
        assert_eq!(future[0].avg, 13_000);
        assert!(future.iter().all(|p| p.date > today));
    }

    #[tokio::test]
    async fn test_same_day_insert_overwrites() {
        let (_db, store, today) = seeded_store().await;
        store.insert(&point(1, today, 12_500)).await.unwrap();

        assert_eq!(store.today_avg(1, today).await.unwrap(), 12_500);
        // Still a single point for today.
        let past = store.window_past(1, today).await.unwrap();
        assert_eq!(past.iter().filter(|p| p.date == today).count(), 1);
    }

    #[tokio::test]
    async fn test_empty_store_for_new_instrument() {
        let db = Database::open_in_memory().unwrap();
        let store = PriceHistoryStore::new(db.conn());
        let today = day(2024, 6, 28);

        assert!(store.latest(7, today).await.unwrap().is_none());
        assert!(store.today(7, today).await.unwrap().is_none());
        assert!(store.window_past(7, today).await.unwrap().is_empty());
    }
}
