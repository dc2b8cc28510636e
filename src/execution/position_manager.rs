use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::error::BotError;
use crate::execution::gateway::{OrderGateway, OrderId, OrderRequest};
use crate::models::{Candle, ExitReason, OrderSide, TradeRecord};
use crate::strategy::OpeningRange;
use crate::Result;

/// A live long position
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub quantity: u64,
    pub entry_price: f64,
    pub target_price: f64,
    pub stop_loss_price: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_reason: Option<ExitReason>,
}

impl Position {
    /// Build a position, enforcing `quantity > 0` and `stop < entry < target`
    pub fn new(
        symbol: &str,
        quantity: u64,
        entry_price: f64,
        target_price: f64,
        stop_loss_price: f64,
        entry_time: DateTime<Utc>,
    ) -> Result<Self> {
        if quantity == 0 {
            return Err(BotError::InvalidQuantity(quantity));
        }
        if !(stop_loss_price < entry_price && entry_price < target_price) {
            return Err(BotError::InvalidLevels {
                symbol: symbol.to_string(),
                entry: entry_price,
                target: target_price,
                stop: stop_loss_price,
            });
        }

        Ok(Self {
            symbol: symbol.to_string(),
            quantity,
            entry_price,
            target_price,
            stop_loss_price,
            entry_time,
            exit_reason: None,
        })
    }

    /// Exit check for a closing price. Target takes priority over stop.
    pub fn exit_signal(&self, close: f64) -> Option<ExitReason> {
        if close >= self.target_price {
            Some(ExitReason::TargetReached)
        } else if close <= self.stop_loss_price {
            Some(ExitReason::StopLossHit)
        } else {
            None
        }
    }


    fn into_trade(self, exit_price: f64, exit_time: DateTime<Utc>, reason: ExitReason) -> TradeRecord {
        TradeRecord::new(
            self.symbol,
            self.entry_time,
            self.entry_price,
            self.quantity,
            exit_time,
            exit_price,
            reason,
        )
    }
}

/// Per-symbol state: flat, or holding exactly one position
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PositionState {
    #[default]
    Flat,
    Open(Position),
}

/// Result of feeding one candle to the manager
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Opened {
        order_id: OrderId,
        position: Position,
    },
    Closed {
        order_id: OrderId,
        trade: TradeRecord,
    },
}

/// Owns the live position set and decides entries and exits
pub struct PositionManager {
    states: HashMap<String, PositionState>,
    max_investment: f64,
    total_pnl: f64,
    closed_trades: usize,
}

impl PositionManager {
    pub fn new(max_investment: f64) -> Self {
        Self {
            states: HashMap::new(),
            max_investment,
            total_pnl: 0.0,
            closed_trades: 0,
        }
    }

    pub fn state(&self, symbol: &str) -> &PositionState {
        self.states.get(symbol).unwrap_or(&PositionState::Flat)
    }

    pub fn is_open(&self, symbol: &str) -> bool {
        matches!(self.state(symbol), PositionState::Open(_))
    }

    pub fn get_open_position(&self, symbol: &str) -> Option<&Position> {
        match self.state(symbol) {
            PositionState::Open(position) => Some(position),
            PositionState::Flat => None,
        }
    }

    pub fn open_positions(&self) -> Vec<&Position> {
        self.states
            .values()
            .filter_map(|state| match state {
                PositionState::Open(position) => Some(position),
                PositionState::Flat => None,
            })
            .collect()
    }

    /// Realized P&L over every closed trade
    pub fn total_pnl(&self) -> f64 {
        self.total_pnl
    }

    pub fn closed_trades(&self) -> usize {
        self.closed_trades
    }

    /// Whole shares affordable with the per-entry budget
    pub fn position_size(&self, entry_price: f64) -> u64 {
        if entry_price <= 0.0 || !entry_price.is_finite() {
            return 0;
        }
        (self.max_investment / entry_price).floor() as u64
    }

    /// Advance the state machine for `symbol` with its newest candle
    ///
    /// `breakout` is the opening range when the detector fired on this candle.
    /// Open symbols are only checked for exits; flat symbols only for entries.
    pub fn on_candle<G: OrderGateway + ?Sized>(
        &mut self,
        symbol: &str,
        candle: &Candle,
        breakout: Option<OpeningRange>,
        gateway: &G,
    ) -> Result<Option<Transition>> {
        if self.is_open(symbol) {
            return self.check_exit(symbol, candle, gateway);
        }

        match breakout {
            Some(range) => self.open_position(symbol, candle, &range, gateway),
            None => Ok(None),
        }
    }

    /// Flat -> Open on a breakout candle
    ///
    /// Skipped (Ok(None)) when the budget buys zero shares or the levels would
    /// not bracket the entry price.
    pub fn open_position<G: OrderGateway + ?Sized>(
        &mut self,
        symbol: &str,
        candle: &Candle,
        range: &OpeningRange,
        gateway: &G,
    ) -> Result<Option<Transition>> {
        if self.is_open(symbol) {
            return Err(BotError::PositionAlreadyOpen(symbol.to_string()));
        }

        let entry_price = candle.close;
        let quantity = self.position_size(entry_price);
        if quantity == 0 {
            tracing::warn!(
                symbol = %symbol,
                entry_price,
                max_investment = self.max_investment,
                "Budget buys zero shares, skipping entry"
            );
            return Ok(None);
        }

        let position = match Position::new(
            symbol,
            quantity,
            entry_price,
            range.target(),
            range.stop_loss(),
            candle.timestamp,
        ) {
            Ok(position) => position,
            Err(e) => {
                tracing::warn!(symbol = %symbol, "Skipping entry: {}", e);
                return Ok(None);
            }
        };

        let order_id = gateway.place(&OrderRequest::market(symbol, OrderSide::Buy, quantity))?;

        tracing::info!(
            symbol = %symbol,
            quantity,
            entry = entry_price,
            target = position.target_price,
            stop = position.stop_loss_price,
            "Breakout detected, entered long position"
        );

        self.states
            .insert(symbol.to_string(), PositionState::Open(position.clone()));

        Ok(Some(Transition::Opened { order_id, position }))
    }

    /// Open -> Flat when the close reaches the target or the stop
    pub fn check_exit<G: OrderGateway + ?Sized>(
        &mut self,
        symbol: &str,
        candle: &Candle,
        gateway: &G,
    ) -> Result<Option<Transition>> {
        let Some(PositionState::Open(position)) = self.states.get_mut(symbol) else {
            return Ok(None);
        };

        let Some(reason) = position.exit_signal(candle.close) else {
            return Ok(None);
        };
        position.exit_reason = Some(reason);

        // A failed SELL leaves the position open for the next cycle
        let order_id = match gateway.place(&OrderRequest::market(
            symbol,
            OrderSide::Sell,
            position.quantity,
        )) {
            Ok(order_id) => order_id,
            Err(e) => {
                position.exit_reason = None;
                return Err(e);
            }
        };

        let Some(PositionState::Open(position)) = self.states.remove(symbol) else {
            return Ok(None);
        };
        let trade = position.into_trade(candle.close, candle.timestamp, reason);

        self.total_pnl += trade.profit_loss;
        self.closed_trades += 1;

        tracing::info!(
            symbol = %symbol,
            reason = %reason,
            exit = trade.exit_price,
            pnl = trade.profit_loss,
            "Closed position"
        );

        Ok(Some(Transition::Closed { order_id, trade }))
    }
}
