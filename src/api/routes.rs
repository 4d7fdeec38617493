use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db::Database;
use crate::market::error::MarketError;
use crate::market::history::PriceHistoryStore;
use crate::market::ledger::TradeLedger;
use crate::models::{Instrument, PricePoint, TradeLot, TradeOutcome};
use crate::wallet::WalletStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub history: PriceHistoryStore,
    pub ledger: TradeLedger,
    pub wallet: WalletStore,
}

impl AppState {
    pub fn new(db: Database) -> Self {
        let conn = db.conn();
        Self {
            db,
            history: PriceHistoryStore::new(conn.clone()),
            ledger: TradeLedger::new(conn.clone()),
            wallet: WalletStore::new(conn),
        }
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/stocks", get(list_stocks))
        .route("/api/stocks/:id/chart", get(stock_chart))
        .route("/api/stocks/:id/price", get(stock_price))
        .route("/api/stocks/:id/buy", post(buy_stock))
        .route("/api/stocks/:id/sell", post(sell_stock))
        .route("/api/members", post(register_member))
        .route("/api/members/:id/holdings", get(member_holdings))
        .route("/api/members/:id/wallet", get(member_wallet))
        .route("/api/members/:id/trades", get(member_trades))
        .with_state(state)
}

// ===== Route Handlers =====

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// List all tradable instruments
async fn list_stocks(State(state): State<AppState>) -> Result<Json<StocksResponse>, ApiError> {
    let stocks = state.db.list_instruments().await?;
    Ok(Json(StocksResponse {
        count: stocks.len(),
        stocks,
    }))
}

/// Two-week chart window: past and any pre-generated future points as one
/// ascending sequence
async fn stock_chart(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ChartResponse>, ApiError> {
    require_instrument(&state, id).await?;
    let today = Utc::now().date_naive();

    let mut points = state.history.window_past(id, today).await?;
    points.extend(state.history.window_future(id, today).await?);

    Ok(Json(ChartResponse {
        count: points.len(),
        points,
    }))
}

/// Today's price point for an instrument
async fn stock_price(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PricePoint>, ApiError> {
    require_instrument(&state, id).await?;
    let today = Utc::now().date_naive();
    state
        .history
        .today(id, today)
        .await?
        .map(Json)
        .ok_or(ApiError::from(MarketError::PriceUnavailable {
            instrument_id: id,
        }))
}

/// Invest points into an instrument at today's price
async fn buy_stock(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<BuyRequest>,
) -> Result<Json<TradeLot>, ApiError> {
    let today = Utc::now().date_naive();
    let lot = state.ledger.buy(req.member_id, id, req.points, today).await?;
    Ok(Json(lot))
}

/// Liquidate the member's whole open position at today's price
async fn sell_stock(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<SellRequest>,
) -> Result<Json<TradeOutcome>, ApiError> {
    let today = Utc::now().date_naive();
    let outcome = state.ledger.sell(req.member_id, id, today).await?;
    Ok(Json(outcome))
}

/// Register a member wallet with a starting point balance
async fn register_member(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.wallet.register(req.member_id, req.points).await?;
    Ok(Json(json!({
        "member_id": req.member_id,
        "points": req.points,
    })))
}

/// Open lots grouped per instrument
async fn member_holdings(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<HoldingResponse>>, ApiError> {
    let lots = state.ledger.holdings(id).await?;
    let instruments = state.db.list_instruments().await?;

    let mut holdings: Vec<HoldingResponse> = Vec::new();
    for instrument in instruments {
        let owned: Vec<TradeLot> = lots
            .iter()
            .filter(|l| l.instrument_id == instrument.id)
            .cloned()
            .collect();
        if !owned.is_empty() {
            holdings.push(HoldingResponse {
                stock: instrument,
                lots: owned,
            });
        }
    }
    Ok(Json(holdings))
}

/// Current wallet balance
async fn member_wallet(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<WalletResponse>, ApiError> {
    let points = state.wallet.balance(id).await?;
    Ok(Json(WalletResponse {
        member_id: id,
        points,
    }))
}

/// One page of trade history, newest first
async fn member_trades(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<TradesQuery>,
) -> Result<Json<Vec<TradeLot>>, ApiError> {
    let limit = params.limit.unwrap_or(100);
    let offset = params.offset.unwrap_or(0);
    let trades = state.ledger.trade_history(id, limit, offset).await?;
    Ok(Json(trades))
}

async fn require_instrument(state: &AppState, id: i64) -> Result<Instrument, ApiError> {
    state
        .db
        .instrument(id)
        .await?
        .ok_or(ApiError::from(MarketError::InstrumentNotFound {
            instrument_id: id,
        }))
}

// ===== Request/Response Types =====

#[derive(Deserialize)]
struct BuyRequest {
    member_id: i64,
    points: i64,
}

#[derive(Deserialize)]
struct SellRequest {
    member_id: i64,
}

#[derive(Deserialize)]
struct RegisterRequest {
    member_id: i64,
    points: i64,
}

#[derive(Deserialize)]
struct TradesQuery {
    /// Page size, clamped to 1000
    limit: Option<i64>,
    /// Rows to skip
    offset: Option<i64>,
}

#[derive(Serialize)]
struct StocksResponse {
    count: usize,
    stocks: Vec<Instrument>,
}

#[derive(Serialize)]
struct ChartResponse {
    count: usize,
    points: Vec<PricePoint>,
}

#[derive(Serialize)]
struct HoldingResponse {
    stock: Instrument,
    lots: Vec<TradeLot>,
}

#[derive(Serialize)]
struct WalletResponse {
    member_id: i64,
    points: i64,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

// ===== Error Handling =====

#[derive(Debug)]
struct ApiError(MarketError);

impl From<MarketError> for ApiError {
    fn from(err: MarketError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            MarketError::DuplicateTrade { .. } | MarketError::NoPosition => StatusCode::CONFLICT,
            MarketError::PriceUnavailable { .. }
            | MarketError::InstrumentNotFound { .. }
            | MarketError::MemberNotFound { .. } => StatusCode::NOT_FOUND,
            MarketError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
            MarketError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            MarketError::Storage(err) => {
                tracing::error!("Database error: {}", err);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response();
            }
        };

        let body = Json(json!({
            "error": self.0.to_string(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TradeKind;

    #[test]
    fn test_error_status_mapping() {
        let dup = ApiError::from(MarketError::DuplicateTrade {
            kind: TradeKind::Buy,
        });
        assert_eq!(dup.into_response().status(), StatusCode::CONFLICT);

        let poor = ApiError::from(MarketError::InsufficientFunds {
            required: 10,
            available: 5,
        });
        assert_eq!(poor.into_response().status(), StatusCode::PAYMENT_REQUIRED);

        let missing = ApiError::from(MarketError::PriceUnavailable { instrument_id: 1 });
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);

        let bad = ApiError::from(MarketError::InvalidInput {
            message: "points must be positive".to_string(),
        });
        assert_eq!(bad.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
