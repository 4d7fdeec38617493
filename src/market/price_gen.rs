//! Daily Price Generator
//!
//! Produces the next bounded-random price sample from the previous day's
//! average: a +/-5% random walk on the average, with independently
//! randomized high/low spreads around it. Randomness is injected so the
//! walk is reproducible in tests; there is no hidden global RNG state.

use chrono::NaiveDate;
use rand::Rng;

use super::error::MarketError;
use crate::models::PricePoint;

/// Maximum daily move of the average, as a fraction of the previous average.
pub const DAILY_MOVE_PCT: f64 = 0.05;

/// Maximum high/low spread, as a fraction of the new average.
pub const SPREAD_PCT: f64 = 0.10;

/// Generate the price point for `as_of` from the previous day's average.
///
/// Pure with respect to history: depends only on `last_avg`, `as_of` and
/// the supplied RNG. `last_avg <= 0` is a precondition violation, not
/// something to clamp.
pub fn generate(
    instrument_id: i64,
    last_avg: i64,
    as_of: NaiveDate,
    rng: &mut impl Rng,
) -> Result<PricePoint, MarketError> {
    if last_avg <= 0 {
        return Err(MarketError::InvalidInput {
            message: format!("last_avg must be positive, got {}", last_avg),
        });
    }

    let max_move = (last_avg as f64 * DAILY_MOVE_PCT).round() as i64;
    let delta = rng.gen_range(-max_move..=max_move);
    // Keep the walk strictly positive even for tiny prices.
    let avg = (last_avg + delta).max(1);

    let max_spread = (avg as f64 * SPREAD_PCT).round() as i64;
    let high = avg + rng.gen_range(0..=max_spread);
    let low = (avg - rng.gen_range(0..=max_spread)).max(1);

    Ok(PricePoint {
        instrument_id,
        date: as_of,
        low,
        avg,
        high,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
    }

    #[test]
    fn test_rejects_non_positive_basis() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(generate(1, 0, day(), &mut rng).is_err());
        assert!(generate(1, -500, day(), &mut rng).is_err());
    }

    #[test]
    fn test_ordering_invariant_holds() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut last_avg = 50_000;
        for _ in 0..500 {
            let p = generate(1, last_avg, day(), &mut rng).unwrap();
            assert!(p.low >= 1);
            assert!(p.low <= p.avg, "low {} > avg {}", p.low, p.avg);
            assert!(p.avg <= p.high, "avg {} > high {}", p.avg, p.high);
            last_avg = p.avg;
        }
    }

    #[test]
    fn test_daily_move_stays_within_five_percent() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..1000 {
            let p = generate(1, 50_000, day(), &mut rng).unwrap();
            assert!(
                (47_500..=52_500).contains(&p.avg),
                "avg {} escaped the +/-5% band",
                p.avg
            );
        }
    }

    #[test]
    fn test_walk_survives_tiny_prices() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut last_avg = 2;
        for _ in 0..200 {
            let p = generate(1, last_avg, day(), &mut rng).unwrap();
            assert!(p.low >= 1 && p.avg >= 1);
            last_avg = p.avg;
        }
    }

    #[test]
    fn test_same_seed_same_series() {
        let mut a = ChaCha8Rng::seed_from_u64(9);
        let mut b = ChaCha8Rng::seed_from_u64(9);
        let pa = generate(1, 50_000, day(), &mut a).unwrap();
        let pb = generate(1, 50_000, day(), &mut b).unwrap();
        assert_eq!(pa.avg, pb.avg);
        assert_eq!(pa.low, pb.low);
        assert_eq!(pa.high, pb.high);
    }
}
