use breakoutbot::api::YahooFinanceClient;
use breakoutbot::backtest::SyntheticDataGenerator;
use breakoutbot::config::BotConfig;
use breakoutbot::db::{MemoryLedger, SqliteLedger};
use breakoutbot::execution::{
    BrokerSession, CandleFeed, HistoricalWindow, LiveFeed, OrderIdSequence, PaperGateway,
    SimulatedFeed, StrategyEngine, Transition,
};
use breakoutbot::{Candle, ExitReason, OrderSide};
use chrono::{Duration, TimeZone, Utc};
use mockito::Matcher;
use std::collections::{HashMap, VecDeque};
use tokio::sync::watch;

struct ScriptedFeed {
    candles: HashMap<String, VecDeque<Candle>>,
}

impl ScriptedFeed {
    fn new(script: Vec<(&str, Vec<Candle>)>) -> Self {
        Self {
            candles: script
                .into_iter()
                .map(|(symbol, candles)| (symbol.to_string(), candles.into()))
                .collect(),
        }
    }
}

impl CandleFeed for ScriptedFeed {
    async fn next_candle(&mut self, symbol: &str) -> breakoutbot::Result<Option<Candle>> {
        Ok(self.candles.get_mut(symbol).and_then(|q| q.pop_front()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn candle(minute: i64, high: f64, low: f64, close: f64) -> Candle {
    Candle {
        timestamp: Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap() + Duration::minutes(minute),
        open: close,
        high,
        low,
        close,
        volume: 5_000,
    }
}

/// Opening range 99..101, average range 1.0
fn window() -> HistoricalWindow {
    HistoricalWindow::from_candles(vec![
        candle(-20, 101.0, 99.0, 100.0),
        candle(-15, 100.25, 99.75, 99.8),
        candle(-10, 99.5, 98.5, 99.0),
        candle(-5, 98.5, 98.0, 98.0),
    ])
}

#[tokio::test]
async fn test_e2e_breakout_round_trips_through_ledger() {
    let _ = tracing_subscriber::fmt::try_init();

    let ledger = SqliteLedger::connect("sqlite::memory:").await.unwrap();
    let session = BrokerSession::start();
    let gateway = PaperGateway::connect(&session, 1).await.unwrap();

    let mut engine = StrategyEngine::new(&BotConfig::default(), gateway, ledger.clone());
    engine.set_window("AAPL", window());
    engine.set_window("MSFT", window());

    // AAPL breaks out then hits its stop; MSFT stays quiet
    let mut feed = ScriptedFeed::new(vec![
        (
            "AAPL",
            vec![
                candle(0, 103.5, 101.0, 102.0),
                candle(5, 102.5, 100.5, 101.0),
                candle(10, 101.0, 98.0, 98.5),
            ],
        ),
        (
            "MSFT",
            vec![
                candle(0, 100.0, 99.5, 99.8),
                candle(5, 100.0, 99.5, 99.9),
                candle(10, 100.0, 99.5, 99.7),
            ],
        ),
    ]);
    let symbols = vec!["AAPL".to_string(), "MSFT".to_string()];

    let (_stop_tx, stop_rx) = watch::channel(false);
    let summaries = engine.run_simulation(&mut feed, &symbols, 3, &stop_rx).await;
    assert_eq!(summaries.iter().map(|s| s.opened).sum::<usize>(), 1);
    assert_eq!(summaries.iter().map(|s| s.closed).sum::<usize>(), 1);
    assert!(engine.positions().open_positions().is_empty());

    let trades = ledger.load_trades().await.unwrap();
    assert_eq!(trades.len(), 1);
    let trade = &trades[0];
    assert_eq!(trade.symbol, "AAPL");
    assert_eq!(trade.exit_reason, ExitReason::StopLossHit);
    assert_eq!(trade.entry_price, 102.0);
    assert_eq!(trade.exit_price, 98.5);
    assert_eq!(trade.quantity, 1);
    assert_eq!(trade.profit_loss, (98.5 - 102.0) * 1.0);
    assert_eq!(engine.positions().total_pnl(), trade.profit_loss);
    assert_eq!(ledger.order_count().await.unwrap(), 2);

    let placed = engine.gateway().placed();
    assert_eq!(placed.len(), 2);
    assert_eq!(placed[0].order_id, 1);
    assert_eq!(placed[0].request.side, OrderSide::Buy);
    assert_eq!(placed[1].order_id, 2);
    assert_eq!(placed[1].request.side, OrderSide::Sell);

    drop(engine);
    session.shutdown().await;
    ledger.close().await;
}

#[tokio::test]
async fn test_e2e_simulation_invariants() {
    let ids = OrderIdSequence::new();
    ids.seed(1);
    let ledger = MemoryLedger::new();
    let config = BotConfig {
        max_investment: 1_000.0,
        ..BotConfig::default()
    };

    let mut engine = StrategyEngine::new(&config, PaperGateway::new(ids), ledger.clone());
    let symbols: Vec<String> = ["AAPL", "MSFT", "TSLA", "NVDA"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut history = SyntheticDataGenerator::new(11, 5);
    engine.load_synthetic_history(&mut history, &symbols, 78);

    let mut feed = SimulatedFeed::new(SyntheticDataGenerator::new(12, 5));
    engine.seed_simulated_feed(&mut feed);

    let (_stop_tx, stop_rx) = watch::channel(false);
    let summaries = engine.run_simulation(&mut feed, &symbols, 200, &stop_rx).await;
    assert_eq!(summaries.len(), 200);

    // At most one position per symbol, with consistent levels
    let open = engine.positions().open_positions();
    assert!(open.len() <= symbols.len());
    for position in &open {
        assert!(position.quantity > 0);
        assert!(position.stop_loss_price < position.entry_price);
        assert!(position.entry_price < position.target_price);
    }

    let trades = ledger.trades();
    assert_eq!(trades.len(), engine.positions().closed_trades());
    for trade in &trades {
        assert!(trade.quantity > 0);
        assert_eq!(
            trade.profit_loss,
            (trade.exit_price - trade.entry_price) * trade.quantity as f64
        );
    }
    let realized: f64 = trades.iter().map(|t| t.profit_loss).sum();
    assert!((realized - engine.positions().total_pnl()).abs() < 1e-9);

    // Every trade has a BUY and SELL; open positions have only a BUY
    assert_eq!(ledger.orders_for(OrderSide::Sell).len(), trades.len());
    assert_eq!(
        ledger.orders_for(OrderSide::Buy).len(),
        trades.len() + open.len()
    );

    // Order ids are unique and strictly increasing
    let placed = engine.gateway().placed();
    assert!(placed.windows(2).all(|w| w[0].order_id < w[1].order_id));

    // Per symbol, sides alternate starting with BUY
    for symbol in &symbols {
        let sides: Vec<OrderSide> = placed
            .iter()
            .filter(|o| &o.request.symbol == symbol)
            .map(|o| o.request.side)
            .collect();
        for (i, side) in sides.iter().enumerate() {
            let expected = if i % 2 == 0 { OrderSide::Buy } else { OrderSide::Sell };
            assert_eq!(*side, expected);
        }
    }
}

#[tokio::test]
async fn test_e2e_live_feed_against_mock_provider() {
    let mut server = mockito::Server::new_async().await;

    let history_body = r#"{"chart": {"result": [{
        "timestamp": [1709649600, 1709649900, 1709650200, 1709650500],
        "indicators": {"quote": [{
            "open":   [100.0, 99.8, 99.0, 98.0],
            "high":   [101.0, 100.25, 99.5, 98.5],
            "low":    [99.0, 99.75, 98.5, 98.0],
            "close":  [100.0, 99.8, 99.0, 98.0],
            "volume": [1000, 1200, 900, 800]
        }]}
    }], "error": null}}"#;
    let latest_body = r#"{"chart": {"result": [{
        "timestamp": [1709650740, 1709650800],
        "indicators": {"quote": [{
            "open":   [98.0, 101.5],
            "high":   [98.4, 103.5],
            "low":    [97.9, 101.0],
            "close":  [98.2, 102.0],
            "volume": [300, 4000]
        }]}
    }], "error": null}}"#;

    let _history = server
        .mock("GET", "/AAPL")
        .match_query(Matcher::UrlEncoded("interval".into(), "5m".into()))
        .with_status(200)
        .with_body(history_body)
        .create_async()
        .await;
    let _latest = server
        .mock("GET", "/AAPL")
        .match_query(Matcher::UrlEncoded("interval".into(), "1m".into()))
        .with_status(200)
        .with_body(latest_body)
        .create_async()
        .await;
    let _missing = server
        .mock("GET", "/ZZZZ")
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body("Not Found")
        .create_async()
        .await;

    let client = YahooFinanceClient::with_base_url(&server.url());
    let ids = OrderIdSequence::new();
    ids.seed(7);
    let mut engine = StrategyEngine::new(&BotConfig::default(), PaperGateway::new(ids), MemoryLedger::new());
    let symbols = vec!["AAPL".to_string(), "ZZZZ".to_string()];

    let loaded = engine.load_history(&client, &symbols, 2, 5).await;
    assert_eq!(loaded, 1);
    assert_eq!(engine.window("AAPL").unwrap().average_range(), 1.0);
    assert!(engine.window("ZZZZ").is_none());

    let mut feed = LiveFeed::new(client);
    let summary = engine.run_cycle(&mut feed, &symbols).await;
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.opened, 1);

    let position = engine.positions().get_open_position("AAPL").unwrap();
    assert_eq!(position.entry_price, 102.0);
    assert_eq!(position.target_price, 103.0);
    assert_eq!(position.stop_loss_price, 99.0);
    assert_eq!(position.quantity, 1);

    // Live candles do not extend the lookback
    assert_eq!(engine.window("AAPL").unwrap().len(), 4);

    let orders = engine.ledger().orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].order_id, 7);
    assert_eq!(orders[0].reason, "Breakout found");
}

#[tokio::test]
async fn test_e2e_one_position_per_symbol() {
    let ids = OrderIdSequence::new();
    ids.seed(1);
    let mut engine = StrategyEngine::new(&BotConfig::default(), PaperGateway::new(ids), MemoryLedger::new());
    engine.set_window("AAPL", window());

    // Two consecutive breakout candles below target: only the first opens
    let first = engine.on_new_candle("AAPL", candle(0, 103.5, 101.0, 102.0)).await;
    let second = engine.on_new_candle("AAPL", candle(5, 104.0, 101.5, 102.5)).await;

    assert!(matches!(first, Some(Transition::Opened { .. })));
    assert!(second.is_none());
    assert_eq!(engine.positions().open_positions().len(), 1);
    assert_eq!(engine.gateway().placed().len(), 1);
}

#[tokio::test(flavor = "current_thread")]
async fn test_e2e_first_breakout_after_handshake_is_traded() {
    let session = BrokerSession::start();
    let gateway = PaperGateway::connect(&session, 1).await.unwrap();

    let mut engine = StrategyEngine::new(&BotConfig::default(), gateway, MemoryLedger::new());
    engine.set_window("AAPL", window());

    // No other await between the handshake and the first candle
    let transition = engine.on_new_candle("AAPL", candle(0, 103.5, 101.0, 102.0)).await;

    match transition {
        Some(Transition::Opened { order_id, position }) => {
            assert_eq!(order_id, 1);
            assert_eq!(position.quantity, 1);
        }
        other => panic!("expected an opened position, got {:?}", other),
    }
    assert_eq!(engine.ledger().orders_for(OrderSide::Buy).len(), 1);

    drop(engine);
    session.shutdown().await;
}
