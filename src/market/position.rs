//! Position Accounting
//!
//! Aggregates a member's open BUY lots into a weighted-average cost basis.
//! Pure; no I/O. Callers check for an open position before invoking.

use super::error::MarketError;
use crate::models::{TradeKind, TradeLot};

/// Aggregate view of an open position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionSummary {
    pub total_quantity: i64,
    pub total_invested: i64,
    /// Weighted-average points paid per unit (floor division)
    pub avg_cost: i64,
}

/// Aggregate open BUY lots. Empty input is a precondition violation.
pub fn aggregate(lots: &[TradeLot]) -> Result<PositionSummary, MarketError> {
    if lots.is_empty() {
        return Err(MarketError::NoPosition);
    }
    debug_assert!(lots.iter().all(|l| l.kind == TradeKind::Buy));

    let total_quantity: i64 = lots.iter().map(|l| l.quantity).sum();
    let total_invested: i64 = lots.iter().map(|l| l.points).sum();
    if total_quantity <= 0 {
        return Err(MarketError::NoPosition);
    }

    Ok(PositionSummary {
        total_quantity,
        total_invested,
        avg_cost: total_invested / total_quantity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn buy_lot(points: i64, price: i64, quantity: i64) -> TradeLot {
        TradeLot {
            id: 0,
            instrument_id: 1,
            member_id: 1,
            kind: TradeKind::Buy,
            points,
            price_per_unit: price,
            quantity,
            date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            closed: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_input_is_no_position() {
        assert!(matches!(aggregate(&[]), Err(MarketError::NoPosition)));
    }

    #[test]
    fn test_single_lot() {
        let summary = aggregate(&[buy_lot(1000, 100, 10)]).unwrap();
        assert_eq!(summary.total_quantity, 10);
        assert_eq!(summary.total_invested, 1000);
        assert_eq!(summary.avg_cost, 100);
    }

    #[test]
    fn test_weighted_average_across_lots() {
        // 10 units at 100 plus 5 units at 120 -> 1600 invested over 15 units
        let summary = aggregate(&[buy_lot(1000, 100, 10), buy_lot(600, 120, 5)]).unwrap();
        assert_eq!(summary.total_quantity, 15);
        assert_eq!(summary.total_invested, 1600);
        assert_eq!(summary.avg_cost, 106);
    }
}
