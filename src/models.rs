use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A synthetic tradable instrument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub id: i64,
    pub name: String,
}

/// One daily price sample for an instrument
///
/// Invariant: `0 < low <= avg <= high`. At most one point per
/// (instrument, calendar day).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub instrument_id: i64,
    pub date: NaiveDate,
    pub low: i64,
    pub avg: i64,
    pub high: i64,
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeKind {
    Buy,
    Sell,
}

impl TradeKind {
    pub fn as_str(&self) -> &str {
        match self {
            TradeKind::Buy => "BUY",
            TradeKind::Sell => "SELL",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "BUY" => Some(TradeKind::Buy),
            "SELL" => Some(TradeKind::Sell),
            _ => None,
        }
    }
}

/// One recorded trade event. Append-only; never mutated after creation
/// except for the `closed` flag on BUY lots, set when a SELL liquidates
/// the position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeLot {
    pub id: i64,
    pub instrument_id: i64,
    pub member_id: i64,
    pub kind: TradeKind,
    /// Points invested (BUY) or proceeds received (SELL)
    pub points: i64,
    pub price_per_unit: i64,
    pub quantity: i64,
    pub date: NaiveDate,
    pub closed: bool,
    pub created_at: DateTime<Utc>,
}

/// Result of a full-position liquidation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub total_proceeds: i64,
    pub total_invested: i64,
    /// Realized P&L; negative on a loss
    pub earned_points: i64,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub port: u16,
    /// How often the scheduler wakes up to check for a new trading day
    pub price_interval_secs: u64,
    /// Seed average used the first time an instrument has no price history
    pub initial_price: i64,
    /// Instruments seeded into an empty database
    pub stock_names: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "./stocksim.db".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        let price_interval_secs = std::env::var("PRICE_INTERVAL_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .unwrap_or(3600);

        let initial_price = std::env::var("INITIAL_PRICE")
            .unwrap_or_else(|_| "50000".to_string())
            .parse()
            .unwrap_or(50000);

        let stock_names = std::env::var("STOCK_NAMES")
            .unwrap_or_else(|_| "Samsung Electronics,Hyundai Motor,Kakao,Naver,Posco".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            database_path,
            port,
            price_interval_secs,
            initial_price,
            stock_names,
        })
    }
}
