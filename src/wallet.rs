//! Point Wallet
//!
//! Holds each member's point balance. The trade ledger composes the
//! debit/credit contract inside its own transaction, so the row-level
//! operations here take a plain `&Connection` (a `rusqlite::Transaction`
//! derefs to one); the async store wraps them for direct API access.

use chrono::Utc;
use rusqlite::{params, Connection};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::market::error::MarketError;

#[derive(Clone)]
pub struct WalletStore {
    conn: Arc<Mutex<Connection>>,
}

impl WalletStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Register a member with a starting balance. Overwrites an existing
    /// balance; registration is an admin/bootstrap operation.
    pub async fn register(&self, member_id: i64, starting_points: i64) -> Result<(), MarketError> {
        if starting_points < 0 {
            return Err(MarketError::InvalidInput {
                message: format!("starting points must be >= 0, got {}", starting_points),
            });
        }
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO wallets (member_id, points, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(member_id) DO UPDATE SET
                points = excluded.points,
                updated_at = excluded.updated_at",
            params![member_id, starting_points, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub async fn balance(&self, member_id: i64) -> Result<i64, MarketError> {
        let conn = self.conn.lock().await;
        balance_of(&conn, member_id)
    }
}

pub fn balance_of(conn: &Connection, member_id: i64) -> Result<i64, MarketError> {
    let mut stmt = conn.prepare_cached("SELECT points FROM wallets WHERE member_id = ?1")?;
    let mut rows = stmt.query(params![member_id])?;
    match rows.next()? {
        Some(row) => Ok(row.get(0)?),
        None => Err(MarketError::MemberNotFound { member_id }),
    }
}

/// Debit `amount` points, refusing to overdraw.
pub fn debit(conn: &Connection, member_id: i64, amount: i64) -> Result<(), MarketError> {
    if amount <= 0 {
        return Err(MarketError::InvalidInput {
            message: format!("debit amount must be positive, got {}", amount),
        });
    }
    let available = balance_of(conn, member_id)?;
    if available < amount {
        return Err(MarketError::InsufficientFunds {
            required: amount,
            available,
        });
    }
    conn.execute(
        "UPDATE wallets SET points = points - ?1, updated_at = ?2 WHERE member_id = ?3",
        params![amount, Utc::now().to_rfc3339(), member_id],
    )?;
    Ok(())
}

/// Credit `amount` points to an existing member.
pub fn credit(conn: &Connection, member_id: i64, amount: i64) -> Result<(), MarketError> {
    if amount < 0 {
        return Err(MarketError::InvalidInput {
            message: format!("credit amount must be >= 0, got {}", amount),
        });
    }
    let updated = conn.execute(
        "UPDATE wallets SET points = points + ?1, updated_at = ?2 WHERE member_id = ?3",
        params![amount, Utc::now().to_rfc3339(), member_id],
    )?;
    if updated == 0 {
        return Err(MarketError::MemberNotFound { member_id });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup() -> (Database, WalletStore) {
        let db = Database::open_in_memory().unwrap();
        let wallet = WalletStore::new(db.conn());
        (db, wallet)
    }

    #[tokio::test]
    async fn test_register_and_balance() {
        let (_db, wallet) = setup().await;
        wallet.register(1, 100_000).await.unwrap();
        assert_eq!(wallet.balance(1).await.unwrap(), 100_000);
    }

    #[tokio::test]
    async fn test_unknown_member() {
        let (_db, wallet) = setup().await;
        assert!(matches!(
            wallet.balance(42).await,
            Err(MarketError::MemberNotFound { member_id: 42 })
        ));
    }

    #[tokio::test]
    async fn test_debit_refuses_overdraw() {
        let (db, wallet) = setup().await;
        wallet.register(1, 500).await.unwrap();

        let conn = db.conn();
        let conn = conn.lock().await;
        let err = debit(&conn, 1, 600).unwrap_err();
        assert!(matches!(
            err,
            MarketError::InsufficientFunds {
                required: 600,
                available: 500
            }
        ));
        // Balance untouched after the refusal.
        assert_eq!(balance_of(&conn, 1).unwrap(), 500);
    }

    #[tokio::test]
    async fn test_debit_then_credit_round() {
        let (db, wallet) = setup().await;
        wallet.register(1, 1_000).await.unwrap();

        let conn = db.conn();
        let conn = conn.lock().await;
        debit(&conn, 1, 400).unwrap();
        credit(&conn, 1, 250).unwrap();
        assert_eq!(balance_of(&conn, 1).unwrap(), 850);
    }
}
