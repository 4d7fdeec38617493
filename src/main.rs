//! StockSim - Synthetic Market Paper-Trading Backend
//!
//! Wires configuration, storage, the daily price scheduler, and the HTTP
//! API together. All trading rules live in the `market` module.

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stocksim_backend::api::{create_router, AppState};
use stocksim_backend::db::Database;
use stocksim_backend::market::scheduler::run_price_scheduler;
use stocksim_backend::models::Config;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    info!("Starting stocksim backend");

    let db = Database::new(&config.database_path)
        .with_context(|| format!("Failed to open database at {}", config.database_path))?;
    db.seed_instruments(&config.stock_names)
        .await
        .context("Failed to seed instruments")?;
    info!("Database initialized at: {}", config.database_path);

    let state = AppState::new(db.clone());

    // Daily price generation runs independently of request handling.
    tokio::spawn(run_price_scheduler(
        db,
        state.history.clone(),
        config.price_interval_secs,
        config.initial_price,
    ));

    let app = create_router(state).layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("API server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stocksim_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
