use crate::api::YahooFinanceClient;
use crate::backtest::SyntheticDataGenerator;
use crate::models::Candle;
use crate::Result;
use std::collections::HashMap;
use std::future::Future;

/// Source of new candles, polled one symbol at a time by the strategy loop
pub trait CandleFeed {
    /// Next candle for `symbol`
    ///
    /// `Ok(None)` means no sample is available this cycle, which is not an
    /// error. Provider failures come back as `Err` and are recoverable.
    fn next_candle(&mut self, symbol: &str) -> impl Future<Output = Result<Option<Candle>>> + Send;

    /// Whether produced candles should be appended to the lookback window
    fn extends_history(&self) -> bool {
        false
    }

    fn name(&self) -> &str;
}

/// Synthetic random-walk feed
///
/// Each symbol's walk starts from the candle it was seeded with (normally the
/// last candle of its lookback window).
pub struct SimulatedFeed {
    generator: SyntheticDataGenerator,
    last: HashMap<String, Candle>,
}

impl SimulatedFeed {
    pub fn new(generator: SyntheticDataGenerator) -> Self {
        Self {
            generator,
            last: HashMap::new(),
        }
    }

    /// Start (or restart) the walk for `symbol` from `candle`
    pub fn seed(&mut self, symbol: &str, candle: Candle) {
        self.last.insert(symbol.to_string(), candle);
    }
}

impl CandleFeed for SimulatedFeed {
    async fn next_candle(&mut self, symbol: &str) -> Result<Option<Candle>> {
        let Some(prev) = self.last.get(symbol).copied() else {
            return Ok(None);
        };

        let candle = self.generator.next_candle(&prev);
        self.last.insert(symbol.to_string(), candle);

        Ok(Some(candle))
    }

    fn extends_history(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

/// Feed polling the market-data provider for the latest 1-minute candle
pub struct LiveFeed {
    client: YahooFinanceClient,
}

impl LiveFeed {
    pub fn new(client: YahooFinanceClient) -> Self {
        Self { client }
    }
}

impl CandleFeed for LiveFeed {
    async fn next_candle(&mut self, symbol: &str) -> Result<Option<Candle>> {
        let latest = self.client.get_latest(symbol).await?;

        match &latest {
            Some(candle) => tracing::info!(
                symbol = %symbol,
                price = candle.close,
                "Fetched real-time candle"
            ),
            None => tracing::warn!(symbol = %symbol, "No real-time data available"),
        }

        Ok(latest)
    }

    fn name(&self) -> &str {
        "live"
    }
}
