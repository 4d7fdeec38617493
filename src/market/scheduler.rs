//! Daily Price Scheduler
//!
//! Runs price generation once per instrument per trading day:
//! prune-then-insert against the history store. A per-instrument failure
//! is logged and skipped; the bounded walk self-corrects from the last
//! available price on the next run.

use chrono::{Days, NaiveDate, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::Duration;
use tracing::{info, warn};

use super::history::{PriceHistoryStore, RETENTION_DAYS};
use super::price_gen;
use crate::db::Database;
use crate::models::Instrument;

/// Generate today's price for every instrument.
///
/// Each instrument is seeded from its latest stored average, falling back
/// to `initial_price` on the first run. Re-running on the same day
/// overwrites through the history store's upsert, so the trigger is
/// idempotent.
pub async fn generate_daily(
    store: &PriceHistoryStore,
    instruments: &[Instrument],
    today: NaiveDate,
    initial_price: i64,
    rng: &mut (impl Rng + Send),
) -> usize {
    let cutoff = today - Days::new(RETENTION_DAYS);
    if let Err(e) = store.prune(cutoff).await {
        warn!("Price pruning failed: {}", e);
    }

    let mut generated = 0;
    for instrument in instruments {
        let last_avg = match store.latest(instrument.id, today).await {
            Ok(Some(p)) => p.avg,
            Ok(None) => initial_price,
            Err(e) => {
                warn!(
                    instrument_id = instrument.id,
                    "Skipping price generation, latest lookup failed: {}", e
                );
                continue;
            }
        };

        let point = match price_gen::generate(instrument.id, last_avg, today, rng) {
            Ok(p) => p,
            Err(e) => {
                warn!(
                    instrument_id = instrument.id,
                    "Skipping price generation: {}", e
                );
                continue;
            }
        };

        match store.insert(&point).await {
            Ok(()) => generated += 1,
            Err(e) => warn!(
                instrument_id = instrument.id,
                "Failed to store generated price: {}", e
            ),
        }
    }

    info!(
        day = %today,
        generated,
        total = instruments.len(),
        "Daily price generation complete"
    );
    generated
}

/// Background loop: wake on a fixed cadence and run generation when the
/// calendar day changes.
pub async fn run_price_scheduler(
    db: Database,
    store: PriceHistoryStore,
    interval_secs: u64,
    initial_price: i64,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    let mut last_generated: Option<NaiveDate> = None;

    loop {
        ticker.tick().await;
        let today = Utc::now().date_naive();
        if last_generated == Some(today) {
            continue;
        }

        let instruments = match db.list_instruments().await {
            Ok(list) => list,
            Err(e) => {
                warn!("Scheduler could not list instruments: {}", e);
                continue;
            }
        };

        let mut rng = ChaCha8Rng::seed_from_u64(rand::random());
        generate_daily(&store, &instruments, today, initial_price, &mut rng).await;
        last_generated = Some(today);
    }
}
