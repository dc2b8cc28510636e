use crate::Result;
use config::{Config, Environment, File};
use serde::Deserialize;

pub const DEFAULT_DATA_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// What to do when the lookback window has zero average candle range
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FlatHistoryPolicy {
    /// Keep the literal rule: any current range >= 0 passes the volatility check
    #[default]
    Literal,
    /// Treat a flat lookback as no signal
    Reject,
}

/// Runtime configuration
///
/// Layered as: built-in defaults, optional `breakoutbot.toml`, then `BREAKOUT_*`
/// environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub max_investment: f64,
    pub interval_minutes: i64,
    pub history_days: i64,
    pub simulation_periods: usize,
    pub poll_interval_secs: u64,
    pub symbols_file: String,
    pub database_url: String,
    pub flat_history: FlatHistoryPolicy,
    pub seed: Option<u64>,
    pub data_url: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            max_investment: 200.0,
            interval_minutes: 5,
            history_days: 2,
            simulation_periods: 100,
            poll_interval_secs: 300,
            symbols_file: "stocks.csv".to_string(),
            database_url: "sqlite://trades.db".to_string(),
            flat_history: FlatHistoryPolicy::Literal,
            seed: None,
            data_url: DEFAULT_DATA_URL.to_string(),
        }
    }
}

impl BotConfig {
    /// Load from `breakoutbot.toml` (if present) and the environment
    pub fn load() -> Result<Self> {
        Self::load_from("breakoutbot")
    }

    /// Load using `file_stem` as the optional config file name
    pub fn load_from(file_stem: &str) -> Result<Self> {
        let defaults = BotConfig::default();

        let settings = Config::builder()
            .set_default("max_investment", defaults.max_investment)?
            .set_default("interval_minutes", defaults.interval_minutes)?
            .set_default("history_days", defaults.history_days)?
            .set_default("simulation_periods", defaults.simulation_periods as u64)?
            .set_default("poll_interval_secs", defaults.poll_interval_secs)?
            .set_default("symbols_file", defaults.symbols_file)?
            .set_default("database_url", defaults.database_url)?
            .set_default("flat_history", "literal")?
            .set_default("data_url", defaults.data_url)?
            .add_source(File::with_name(file_stem).required(false))
            .add_source(Environment::with_prefix("BREAKOUT").try_parsing(true))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
