use thiserror::Error;

/// Errors raised by the breakout bot library
#[derive(Debug, Error)]
pub enum BotError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("symbol list error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("no market data available for {symbol}")]
    NoData { symbol: String },

    #[error("market data provider error for {symbol}: {message}")]
    Provider { symbol: String, message: String },

    #[error("no order id available yet (broker handshake pending)")]
    OrderIdUnavailable,

    #[error("order quantity must be positive, got {0}")]
    InvalidQuantity(u64),

    #[error("invalid levels for {symbol}: stop {stop:.4} < entry {entry:.4} < target {target:.4} does not hold")]
    InvalidLevels {
        symbol: String,
        entry: f64,
        target: f64,
        stop: f64,
    },

    #[error("already have open position for {0}")]
    PositionAlreadyOpen(String),
}
