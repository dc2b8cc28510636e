use crate::models::Candle;

/// Lookback window for one symbol
///
/// Append-only and chronological. Breakout evaluation only needs the opening
/// candle, the latest close and the mean candle range, so those are kept
/// directly and appends are O(1) rather than re-scanning or re-concatenating
/// the whole series.
#[derive(Debug, Clone, Default)]
pub struct HistoricalWindow {
    opening: Option<Candle>,
    last: Option<Candle>,
    range_sum: f64,
    len: usize,
}

impl HistoricalWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a window from candles in chronological order
    pub fn from_candles<I>(candles: I) -> Self
    where
        I: IntoIterator<Item = Candle>,
    {
        let mut window = Self::new();
        for candle in candles {
            window.push(candle);
        }
        window
    }

    /// Append a candle. Candles older than the current last one are dropped.
    pub fn push(&mut self, candle: Candle) {
        if let Some(last) = &self.last {
            if candle.timestamp < last.timestamp {
                tracing::warn!(
                    timestamp = %candle.timestamp,
                    last = %last.timestamp,
                    "Dropping out-of-order candle"
                );
                return;
            }
        }

        if self.opening.is_none() {
            self.opening = Some(candle);
        }
        self.range_sum += candle.range();
        self.len += 1;
        self.last = Some(candle);
    }

    /// The opening-period candle
    pub fn first(&self) -> Option<&Candle> {
        self.opening.as_ref()
    }

    /// The most recent candle; its close is the prior period's close
    pub fn last(&self) -> Option<&Candle> {
        self.last.as_ref()
    }

    /// Mean of high - low over every candle appended, 0 when empty
    pub fn average_range(&self) -> f64 {
        if self.len == 0 {
            return 0.0;
        }
        self.range_sum / self.len as f64
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candle(minute: i64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap()
                + Duration::minutes(minute),
            open: close,
            high,
            low,
            close,
            volume: 1000,
        }
    }

    #[test]
    fn test_empty_window() {
        let window = HistoricalWindow::new();
        assert!(window.is_empty());
        assert!(window.first().is_none());
        assert!(window.last().is_none());
        assert_eq!(window.average_range(), 0.0);
    }

    #[test]
    fn test_first_and_last() {
        let window = HistoricalWindow::from_candles(vec![
            candle(0, 101.0, 99.0, 100.0),
            candle(5, 100.5, 99.5, 100.2),
            candle(10, 99.0, 97.0, 98.0),
        ]);

        assert_eq!(window.len(), 3);
        assert_eq!(window.first().unwrap().high, 101.0);
        assert_eq!(window.last().unwrap().close, 98.0);
    }

    #[test]
    fn test_average_range_tracks_appends() {
        let mut window = HistoricalWindow::new();
        window.push(candle(0, 101.0, 99.0, 100.0)); // range 2
        assert_eq!(window.average_range(), 2.0);

        window.push(candle(5, 100.0, 100.0, 100.0)); // range 0
        assert_eq!(window.average_range(), 1.0);

        // Opening candle is pinned
        assert_eq!(window.first().unwrap().low, 99.0);
    }

    #[test]
    fn test_out_of_order_candle_is_dropped() {
        let mut window = HistoricalWindow::new();
        window.push(candle(10, 101.0, 99.0, 100.0));
        window.push(candle(5, 150.0, 50.0, 120.0));

        assert_eq!(window.len(), 1);
        assert_eq!(window.last().unwrap().close, 100.0);
    }
}
