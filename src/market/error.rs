//! Trade and price-simulation error types

use crate::models::TradeKind;

/// Typed failures surfaced by the market engine.
///
/// None of these are retried inside the core; trade failures always abort
/// the whole operation with no partial ledger or wallet mutation.
#[derive(Debug)]
pub enum MarketError {
    /// A lot of this kind already exists for (member, instrument, today).
    DuplicateTrade { kind: TradeKind },
    /// No price point has been generated for today.
    PriceUnavailable { instrument_id: i64 },
    /// Sell attempted with no open BUY lots.
    NoPosition,
    /// Wallet balance is below the requested debit.
    InsufficientFunds { required: i64, available: i64 },
    InstrumentNotFound { instrument_id: i64 },
    MemberNotFound { member_id: i64 },
    /// Non-positive amount/price or a zero-quantity order.
    InvalidInput { message: String },
    /// Underlying persistence fault.
    Storage(rusqlite::Error),
}

impl std::fmt::Display for MarketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketError::DuplicateTrade { kind } => {
                write!(f, "a {} already exists for this instrument today", kind.as_str())
            }
            MarketError::PriceUnavailable { instrument_id } => {
                write!(f, "no price available today for instrument {}", instrument_id)
            }
            MarketError::NoPosition => write!(f, "no open position to sell"),
            MarketError::InsufficientFunds { required, available } => {
                write!(
                    f,
                    "insufficient funds: required {} points, available {}",
                    required, available
                )
            }
            MarketError::InstrumentNotFound { instrument_id } => {
                write!(f, "instrument {} not found", instrument_id)
            }
            MarketError::MemberNotFound { member_id } => {
                write!(f, "member {} not found", member_id)
            }
            MarketError::InvalidInput { message } => write!(f, "invalid input: {}", message),
            MarketError::Storage(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl std::error::Error for MarketError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MarketError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for MarketError {
    fn from(e: rusqlite::Error) -> Self {
        MarketError::Storage(e)
    }
}
