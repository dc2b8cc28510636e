// Strategy loop, order routing and per-symbol market state
pub mod engine;
pub mod gateway;
pub mod history;
pub mod position_manager;
pub mod price_feed;

pub use engine::{CycleSummary, StrategyEngine};
pub use gateway::{
    BrokerEvent, BrokerSession, OrderGateway, OrderId, OrderIdSequence, OrderRequest, PaperGateway,
};
pub use history::HistoricalWindow;
pub use position_manager::{Position, PositionManager, PositionState, Transition};
pub use price_feed::{CandleFeed, LiveFeed, SimulatedFeed};
