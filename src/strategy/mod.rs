// Opening-range breakout detection
pub mod breakout;

pub use breakout::{detect, BreakoutDetector, OpeningRange};
