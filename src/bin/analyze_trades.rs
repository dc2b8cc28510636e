use anyhow::Context;
use breakoutbot::config::BotConfig;
use breakoutbot::db::SqliteLedger;
use breakoutbot::TradeRecord;
use std::collections::BTreeMap;

#[derive(Default)]
struct Tally {
    trades: usize,
    wins: usize,
    pnl: f64,
}

impl Tally {
    fn add(&mut self, trade: &TradeRecord) {
        self.trades += 1;
        if trade.profit_loss > 0.0 {
            self.wins += 1;
        }
        self.pnl += trade.profit_loss;
    }

    fn win_rate(&self) -> f64 {
        if self.trades == 0 {
            return 0.0;
        }
        self.wins as f64 / self.trades as f64 * 100.0
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter("breakoutbot=warn")
        .init();

    let config = BotConfig::load().context("Failed to load configuration")?;
    let ledger = SqliteLedger::connect(&config.database_url)
        .await
        .with_context(|| format!("Failed to open {}", config.database_url))?;
    let trades = ledger.load_trades().await?;
    ledger.close().await;

    println!("\n═══════════════════════════════════════════════════════");
    println!("              TRADE LEDGER ANALYSIS");
    println!("═══════════════════════════════════════════════════════\n");

    if trades.is_empty() {
        println!("No closed trades in {}", config.database_url);
        return Ok(());
    }

    let mut total = Tally::default();
    let mut by_symbol: BTreeMap<&str, Tally> = BTreeMap::new();
    let mut by_reason: BTreeMap<&str, Tally> = BTreeMap::new();

    for trade in &trades {
        total.add(trade);
        by_symbol.entry(trade.symbol.as_str()).or_default().add(trade);
        by_reason.entry(trade.exit_reason.as_str()).or_default().add(trade);
    }

    println!("Total Trades:        {}", total.trades);
    println!("Winning Trades:      {} ({:.1}%)", total.wins, total.win_rate());
    println!("Realized P&L:        ${:+.2}", total.pnl);
    println!("Average P&L:         ${:+.2}", total.pnl / total.trades as f64);

    println!("\n─────────────────────────────────────────────────────────");
    println!("Summary by Exit Reason:\n");
    for (reason, tally) in &by_reason {
        println!(
            "{:<16} {:>4} trades | Avg: ${:+8.2} | Total: ${:+9.2}",
            reason,
            tally.trades,
            tally.pnl / tally.trades as f64,
            tally.pnl
        );
    }

    println!("\n─────────────────────────────────────────────────────────");
    println!("Summary by Symbol:\n");
    for (symbol, tally) in &by_symbol {
        println!(
            "{:<8} {:>4} trades | Win: {:>5.1}% | Total: ${:+9.2}",
            symbol,
            tally.trades,
            tally.win_rate(),
            tally.pnl
        );
    }

    println!("\n═══════════════════════════════════════════════════════");
    println!("                DETAILED TRADE LIST");
    println!("═══════════════════════════════════════════════════════\n");
    println!(
        "{:<5} {:<8} {:<17} {:<17} {:>5} {:>10} {:>10} {:>10}  {}",
        "#", "Symbol", "Entry", "Exit", "Qty", "Entry$", "Exit$", "P&L$", "Reason"
    );
    println!("{}", "─".repeat(100));

    for (i, trade) in trades.iter().enumerate() {
        println!(
            "{:<5} {:<8} {:<17} {:<17} {:>5} {:>10.2} {:>10.2} {:>+10.2}  {}",
            i + 1,
            trade.symbol,
            trade.entry_time.format("%Y-%m-%d %H:%M"),
            trade.exit_time.format("%Y-%m-%d %H:%M"),
            trade.quantity,
            trade.entry_price,
            trade.exit_price,
            trade.profit_loss,
            trade.exit_reason
        );
    }

    Ok(())
}
