use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// OHLCV candlestick for one fixed interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Candle {
    /// High minus low
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// MARKET when no limit price is supplied, LIMIT otherwise
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum OrderType {
    Market,
    Limit(f64),
}

impl OrderType {
    pub fn from_limit(limit_price: Option<f64>) -> Self {
        match limit_price {
            Some(price) => OrderType::Limit(price),
            None => OrderType::Market,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            OrderType::Market => "MKT",
            OrderType::Limit(_) => "LMT",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExitReason {
    TargetReached,
    StopLossHit,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::TargetReached => "target reached",
            ExitReason::StopLossHit => "stop loss hit",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A closed trade. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub quantity: u64,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    pub profit_loss: f64,
}

impl TradeRecord {
    /// Build a record, deriving profit/loss from the entry and exit fields
    pub fn new(
        symbol: String,
        entry_time: DateTime<Utc>,
        entry_price: f64,
        quantity: u64,
        exit_time: DateTime<Utc>,
        exit_price: f64,
        exit_reason: ExitReason,
    ) -> Self {
        Self {
            symbol,
            entry_time,
            entry_price,
            quantity,
            exit_time,
            exit_price,
            exit_reason,
            profit_loss: (exit_price - entry_price) * quantity as f64,
        }
    }
}

/// One placed order, as logged for later analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: i64,
    pub symbol: String,
    pub side: OrderSide,
    pub order_time: DateTime<Utc>,
    pub price: f64,
    pub quantity: u64,
    pub reason: String,
}
