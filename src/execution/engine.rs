use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::watch;

use crate::api::YahooFinanceClient;
use crate::backtest::SyntheticDataGenerator;
use crate::config::BotConfig;
use crate::db::TradeLedger;
use crate::execution::gateway::OrderGateway;
use crate::execution::position_manager::{PositionManager, Transition};
use crate::execution::price_feed::{CandleFeed, SimulatedFeed};
use crate::execution::HistoricalWindow;
use crate::models::{Candle, OrderRecord, OrderSide};
use crate::strategy::{BreakoutDetector, OpeningRange};

const ENTRY_REASON: &str = "Breakout found";

/// Counts for one pass over the symbol list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub processed: usize,
    pub skipped: usize,
    pub opened: usize,
    pub closed: usize,
}

/// Single cooperative strategy loop over every symbol
///
/// Owns the per-symbol lookback windows and the position manager. Symbols are processed sequentially in list order.
pub struct StrategyEngine<G, L> {
    detector: BreakoutDetector,
    windows: HashMap<String, HistoricalWindow>,
    positions: PositionManager,
    gateway: G,
    ledger: L,
}

impl<G: OrderGateway, L: TradeLedger> StrategyEngine<G, L> {
    pub fn new(config: &BotConfig, gateway: G, ledger: L) -> Self {
        Self {
            detector: BreakoutDetector::new(config.flat_history),
            windows: HashMap::new(),
            positions: PositionManager::new(config.max_investment),
            gateway,
            ledger,
        }
    }

    pub fn set_window(&mut self, symbol: &str, window: HistoricalWindow) {
        self.windows.insert(symbol.to_string(), window);
    }

    pub fn window(&self, symbol: &str) -> Option<&HistoricalWindow> {
        self.windows.get(symbol)
    }

    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Seed lookback windows from the market-data provider
    ///
    /// Symbols without data are logged and left without a window, so no
    /// breakout can fire for them. Returns how many windows were loaded.
    pub async fn load_history(
        &mut self,
        client: &YahooFinanceClient,
        symbols: &[String],
        days: i64,
        interval_minutes: i64,
    ) -> usize {
        let mut loaded = 0;

        for symbol in symbols {
            match client.get_history(symbol, days, interval_minutes).await {
                Ok(candles) if !candles.is_empty() => {
                    tracing::info!(
                        symbol = %symbol,
                        candles = candles.len(),
                        "Downloaded historical data"
                    );
                    self.set_window(symbol, HistoricalWindow::from_candles(candles));
                    loaded += 1;
                }
                Ok(_) => {
                    tracing::warn!(symbol = %symbol, "No historical data available");
                }
                Err(e) => {
                    tracing::warn!(symbol = %symbol, "Error downloading data: {}", e);
                }
            }
        }

        loaded
    }

    /// Seed lookback windows with synthetic candles (offline simulation)
    pub fn load_synthetic_history(
        &mut self,
        generator: &mut SyntheticDataGenerator,
        symbols: &[String],
        candles_per_symbol: usize,
    ) {
        let start = Utc::now() - generator.interval() * candles_per_symbol as i32;

        for (i, symbol) in symbols.iter().enumerate() {
            let start_price = 50.0 + 25.0 * i as f64;
            let candles = generator.generate(start, start_price, 100_000, candles_per_symbol);
            self.set_window(symbol, HistoricalWindow::from_candles(candles));
        }
    }

    /// Start each symbol's random walk at the last candle of its window
    pub fn seed_simulated_feed(&self, feed: &mut SimulatedFeed) {
        for (symbol, window) in &self.windows {
            if let Some(last) = window.last() {
                feed.seed(symbol, *last);
            }
        }
    }

    /// Run detection and position transitions for one new candle
    ///
    /// The candle itself is the current-session data, so only a missing
    /// lookback window suppresses detection. Order and ledger failures are
    /// logged; the loop carries on.
    pub async fn on_new_candle(&mut self, symbol: &str, candle: Candle) -> Option<Transition> {
        let breakout = match self.windows.get(symbol) {
            Some(window) if self.detector.detect(window, &candle) => OpeningRange::from_window(window),
            _ => None,
        };

        match self
            .positions
            .on_candle(symbol, &candle, breakout, &self.gateway)
        {
            Ok(Some(transition)) => {
                self.persist(&transition).await;
                Some(transition)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(symbol = %symbol, "Order not placed: {}", e);
                None
            }
        }
    }

    async fn persist(&self, transition: &Transition) {
        match transition {
            Transition::Opened { order_id, position } => {
                let order = OrderRecord {
                    order_id: *order_id,
                    symbol: position.symbol.clone(),
                    side: OrderSide::Buy,
                    order_time: Utc::now(),
                    price: position.entry_price,
                    quantity: position.quantity,
                    reason: ENTRY_REASON.to_string(),
                };
                if let Err(e) = self.ledger.record_order(&order).await {
                    tracing::error!(symbol = %order.symbol, "Failed to log order: {}", e);
                }
            }
            Transition::Closed { order_id, trade } => {
                // The position is already flat; a failed write loses only the row
                if let Err(e) = self.ledger.record(trade).await {
                    tracing::error!(symbol = %trade.symbol, "Failed to record trade: {}", e);
                }

                let order = OrderRecord {
                    order_id: *order_id,
                    symbol: trade.symbol.clone(),
                    side: OrderSide::Sell,
                    order_time: Utc::now(),
                    price: trade.exit_price,
                    quantity: trade.quantity,
                    reason: trade.exit_reason.to_string(),
                };
                if let Err(e) = self.ledger.record_order(&order).await {
                    tracing::error!(symbol = %order.symbol, "Failed to log order: {}", e);
                }
            }
        }
    }

    /// One pass over `symbols`: fetch, evaluate, trade, persist
    pub async fn run_cycle<F: CandleFeed>(&mut self, feed: &mut F, symbols: &[String]) -> CycleSummary {
        let mut summary = CycleSummary::default();

        for symbol in symbols {
            let candle = match feed.next_candle(symbol).await {
                Ok(Some(candle)) => candle,
                Ok(None) => {
                    tracing::info!(symbol = %symbol, feed = feed.name(), "No candle this cycle");
                    summary.skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(symbol = %symbol, "Market data fetch failed: {}", e);
                    summary.skipped += 1;
                    continue;
                }
            };

            match self.on_new_candle(symbol, candle).await {
                Some(Transition::Opened { .. }) => summary.opened += 1,
                Some(Transition::Closed { .. }) => summary.closed += 1,
                None => {}
            }

            // Evaluated against the prior window; the walk then continues from it
            if feed.extends_history() {
                if let Some(window) = self.windows.get_mut(symbol) {
                    window.push(candle);
                }
            }

            summary.processed += 1;
            tracing::debug!(symbol = %symbol, timestamp = %candle.timestamp, "Processed new candle");
        }

        tracing::info!(
            processed = summary.processed,
            skipped = summary.skipped,
            open_positions = self.positions.open_positions().len(),
            realized_pnl = self.positions.total_pnl(),
            "Cycle complete"
        );

        summary
    }

    /// Run up to `periods` back-to-back cycles
    ///
    /// `stop` is checked between cycles, never inside one, so every
    /// transition of a started cycle is fully persisted.
    pub async fn run_simulation<F: CandleFeed>(
        &mut self,
        feed: &mut F,
        symbols: &[String],
        periods: usize,
        stop: &watch::Receiver<bool>,
    ) -> Vec<CycleSummary> {
        let mut summaries = Vec::with_capacity(periods);

        for period in 1..=periods {
            if *stop.borrow() {
                tracing::info!("Simulation stopped after {}/{} periods", period - 1, periods);
                break;
            }
            summaries.push(self.run_cycle(feed, symbols).await);
            tracing::info!("Completed simulation period {}/{}", period, periods);
        }

        summaries
    }

    /// Run cycles until `shutdown` flips to true or its sender is dropped
    ///
    /// The wait between cycles ends as soon as the stop signal arrives.
    pub async fn run_live<F: CandleFeed>(
        &mut self,
        feed: &mut F,
        symbols: &[String],
        poll_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> usize {
        let mut cycles = 0;

        while !*shutdown.borrow() {
            self.run_cycle(feed, symbols).await;
            cycles += 1;

            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        tracing::info!("Stop handle dropped, ending live loop");
                        break;
                    }
                }
            }
        }

        tracing::info!(cycles, "Live strategy stopped");
        cycles
    }
}
