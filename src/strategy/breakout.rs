use crate::config::FlatHistoryPolicy;
use crate::execution::HistoricalWindow;
use crate::models::Candle;

/// Required multiple of the average candle range for a breakout candle
const RANGE_MULTIPLIER: f64 = 2.0;

/// High/low band of the opening candle in the lookback window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpeningRange {
    pub high: f64,
    pub low: f64,
}

impl OpeningRange {
    pub fn from_window(window: &HistoricalWindow) -> Option<Self> {
        window.first().map(|opening| Self {
            high: opening.high,
            low: opening.low,
        })
    }

    pub fn width(&self) -> f64 {
        self.high - self.low
    }

    /// One opening-range width above the breakout level
    pub fn target(&self) -> f64 {
        self.high + self.width()
    }

    pub fn stop_loss(&self) -> f64 {
        self.low
    }
}

/// Opening-range breakout rule
///
/// Stateless: the same window and candle always give the same answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct BreakoutDetector {
    flat_history: FlatHistoryPolicy,
}

impl BreakoutDetector {
    pub fn new(flat_history: FlatHistoryPolicy) -> Self {
        Self { flat_history }
    }

    /// Does `candle` break out of the window's opening range?
    ///
    /// Requires the opening high to sit above the prior close (gap filter), the
    /// candle to close above the opening high, and the candle range to be at
    /// least twice the window's average range.
    pub fn detect(&self, window: &HistoricalWindow, candle: &Candle) -> bool {
        let (Some(opening), Some(prev)) = (window.first(), window.last()) else {
            return false;
        };

        if opening.high <= prev.close {
            return false;
        }

        let avg_range = window.average_range();
        if avg_range == 0.0 && self.flat_history == FlatHistoryPolicy::Reject {
            tracing::debug!("Flat lookback window, ignoring breakout candidate");
            return false;
        }

        candle.close > opening.high && candle.range() >= RANGE_MULTIPLIER * avg_range
    }
}

/// Breakout check with the literal flat-history behaviour
pub fn detect(window: &HistoricalWindow, candle: &Candle) -> bool {
    BreakoutDetector::default().detect(window, candle)
}
