use anyhow::Context;
use breakoutbot::api::YahooFinanceClient;
use breakoutbot::backtest::SyntheticDataGenerator;
use breakoutbot::config::BotConfig;
use breakoutbot::db::SqliteLedger;
use breakoutbot::execution::{
    BrokerSession, LiveFeed, OrderId, PaperGateway, SimulatedFeed, StrategyEngine,
};
use breakoutbot::symbols::load_symbols;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

const FIRST_ORDER_ID: OrderId = 1;

// Regular US session: 6.5 hours
const SESSION_MINUTES: i64 = 390;

#[derive(Parser, Debug)]
#[command(name = "breakoutbot", about = "Intraday opening-range breakout trading bot")]
struct Args {
    /// Poll live market data instead of running the simulation
    #[arg(long)]
    arm: bool,

    /// Seed lookback windows with synthetic candles instead of downloading them
    #[arg(long)]
    offline: bool,

    /// RNG seed for the simulated feed
    #[arg(long)]
    seed: Option<u64>,

    /// Number of simulation cycles
    #[arg(long)]
    periods: Option<usize>,

    /// Config file name, without extension
    #[arg(short, long, default_value = "breakoutbot")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();

    let mut config = BotConfig::load_from(&args.config).context("Failed to load configuration")?;
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(periods) = args.periods {
        config.simulation_periods = periods;
    }

    let symbols = load_symbols(&config.symbols_file)
        .with_context(|| format!("Failed to read symbols from {}", config.symbols_file))?;
    if symbols.is_empty() {
        anyhow::bail!("No symbols found in {}", config.symbols_file);
    }

    tracing::info!("Breakout bot starting");
    tracing::info!("  Mode: {}", if args.arm { "live" } else { "simulation" });
    tracing::info!("  Symbols: {}", symbols.join(", "));
    tracing::info!("  Max investment per entry: ${:.2}", config.max_investment);
    tracing::info!("  Candle interval: {} min", config.interval_minutes);

    // Start: ledger, broker session and gateway handshake
    let ledger = SqliteLedger::connect(&config.database_url)
        .await
        .context("Failed to open trade ledger")?;
    let session = BrokerSession::start();
    let gateway = PaperGateway::connect(&session, FIRST_ORDER_ID)
        .await
        .context("Broker handshake failed")?;
    let client = YahooFinanceClient::with_base_url(&config.data_url);

    let mut engine = StrategyEngine::new(&config, gateway, ledger.clone());

    seed_windows(&mut engine, &client, &symbols, &config, &args).await;

    let (stop_tx, stop_rx) = watch::channel(false);
    spawn_stop_listeners(Arc::new(stop_tx));

    if args.arm {
        tracing::info!("Press Enter or Ctrl+C to stop...");
        let mut feed = LiveFeed::new(client);
        engine
            .run_live(
                &mut feed,
                &symbols,
                Duration::from_secs(config.poll_interval_secs),
                stop_rx,
            )
            .await;
    } else {
        let generator = match config.seed {
            Some(seed) => SyntheticDataGenerator::new(seed, config.interval_minutes),
            None => SyntheticDataGenerator::from_entropy(config.interval_minutes),
        };
        let mut feed = SimulatedFeed::new(generator);
        engine.seed_simulated_feed(&mut feed);

        engine
            .run_simulation(&mut feed, &symbols, config.simulation_periods, &stop_rx)
            .await;
    }

    let positions = engine.positions();
    tracing::info!("Summary:");
    tracing::info!("  Closed trades: {}", positions.closed_trades());
    tracing::info!("  Realized P&L: ${:.2}", positions.total_pnl());
    for position in positions.open_positions() {
        tracing::info!(
            "  Still open: {} x{} @ ${:.2} (target ${:.2}, stop ${:.2})",
            position.symbol,
            position.quantity,
            position.entry_price,
            position.target_price,
            position.stop_loss_price
        );
    }

    // Stop: release the gateway, end the broker session, flush the ledger
    drop(engine);
    session.shutdown().await;
    ledger.close().await;

    tracing::info!("Breakout bot stopped");
    Ok(())
}

fn setup_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("breakoutbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn seed_windows(
    engine: &mut StrategyEngine<PaperGateway, SqliteLedger>,
    client: &YahooFinanceClient,
    symbols: &[String],
    config: &BotConfig,
    args: &Args,
) {
    let candles_per_symbol =
        (config.history_days * SESSION_MINUTES / config.interval_minutes.max(1)).max(1) as usize;

    if !args.offline {
        let loaded = engine
            .load_history(client, symbols, config.history_days, config.interval_minutes)
            .await;
        tracing::info!("Seeded history for {}/{} symbols", loaded, symbols.len());

        if loaded > 0 || args.arm {
            return;
        }
        tracing::warn!("No history downloaded, falling back to synthetic history");
    }

    let mut generator = match config.seed {
        Some(seed) => SyntheticDataGenerator::new(seed.wrapping_add(1), config.interval_minutes),
        None => SyntheticDataGenerator::from_entropy(config.interval_minutes),
    };
    engine.load_synthetic_history(&mut generator, symbols, candles_per_symbol);
    tracing::info!("Seeded synthetic history ({} candles per symbol)", candles_per_symbol);
}

/// Flip the stop flag on Ctrl+C or when Enter is pressed
fn spawn_stop_listeners(stop: Arc<watch::Sender<bool>>) {
    let on_enter = stop.clone();
    // Plain thread: a blocked stdin read must not hold up runtime shutdown
    std::thread::spawn(move || {
        let mut line = String::new();
        if let Ok(n) = std::io::stdin().read_line(&mut line) {
            if n > 0 {
                tracing::info!("Stop requested");
                on_enter.send(true).ok();
            }
        }
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, stopping...");
            stop.send(true).ok();
        }
    });
}
