use crate::models::Candle;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Max close-to-close move per candle (±0.5%)
const CLOSE_STEP: f64 = 0.01;
/// Max wick extension beyond the body (0.5%)
const WICK_STEP: f64 = 0.005;

/// Derive the next synthetic candle from the previous one
///
/// The new candle opens at the previous close and its close moves by up to
/// ±0.5%. Wicks extend up to 0.5% beyond the body and volume varies between
/// 80% and 120% of the previous volume. The timestamp steps by `interval`,
/// falling back to now if that overflows.
pub fn simulate_new_candle<R: Rng + ?Sized>(rng: &mut R, prev: &Candle, interval: Duration) -> Candle {
    let open = prev.close;
    let close = open * (1.0 + (rng.gen::<f64>() - 0.5) * CLOSE_STEP);
    let high = open.max(close) * (1.0 + rng.gen::<f64>() * WICK_STEP);
    let low = open.min(close) * (1.0 - rng.gen::<f64>() * WICK_STEP);
    let volume = (prev.volume as f64 * (0.8 + rng.gen::<f64>() * 0.4)).round() as u64;

    let timestamp = prev
        .timestamp
        .checked_add_signed(interval)
        .unwrap_or_else(Utc::now);

    Candle {
        timestamp,
        open,
        high,
        low,
        close,
        volume,
    }
}

/// Seeded generator of synthetic candles
///
/// Used to run the simulated feed reproducibly, and to build a lookback
/// window offline when no market data provider is reachable.
pub struct SyntheticDataGenerator {
    rng: StdRng,
    interval: Duration,
}

impl SyntheticDataGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64, interval_minutes: i64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            interval: Duration::minutes(interval_minutes),
        }
    }

    /// Create a generator seeded from system entropy
    pub fn from_entropy(interval_minutes: i64) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            interval: Duration::minutes(interval_minutes),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Next candle following `prev`
    pub fn next_candle(&mut self, prev: &Candle) -> Candle {
        simulate_new_candle(&mut self.rng, prev, self.interval)
    }

    /// Random walk of `num_candles` candles starting at `start_time`
    pub fn generate(
        &mut self,
        start_time: DateTime<Utc>,
        start_price: f64,
        base_volume: u64,
        num_candles: usize,
    ) -> Vec<Candle> {
        let mut candles = Vec::with_capacity(num_candles);
        if num_candles == 0 {
            return candles;
        }

        let first = Candle {
            timestamp: start_time,
            open: start_price,
            high: start_price * (1.0 + WICK_STEP),
            low: start_price * (1.0 - WICK_STEP),
            close: start_price,
            volume: base_volume,
        };
        candles.push(first);

        for _ in 1..num_candles {
            let prev = candles[candles.len() - 1];
            candles.push(self.next_candle(&prev));
        }

        candles
    }
}
