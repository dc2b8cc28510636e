use crate::error::BotError;
use crate::models::Candle;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::config::DEFAULT_DATA_URL;

const RATE_LIMIT_RPM: u32 = 60;
const USER_AGENT: &str = "Mozilla/5.0 (compatible; breakoutbot/0.1)";

type ChartRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Client for the Yahoo Finance chart API
///
/// Cloneable; clones share one rate limiter. No retries: a failed request is
/// reported to the caller, and the next polling cycle is the retry.
#[derive(Clone)]
pub struct YahooFinanceClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<ChartRateLimiter>,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

/// Column-oriented OHLCV; missing samples come back as null
#[derive(Debug, Deserialize, Default)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

impl YahooFinanceClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_DATA_URL)
    }

    /// Point the client at another chart endpoint (used for tests)
    pub fn with_base_url(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());

        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap_or(NonZeroU32::MIN));

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// OHLCV rows for `symbol` between `start` and `end`, oldest first
    ///
    /// # Arguments
    /// * `interval` - Provider interval code, e.g. "1m" or "5m"
    pub async fn get_candles(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: &str,
    ) -> Result<Vec<Candle>> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/{}", self.base_url, symbol);
        let period1 = start.timestamp().to_string();
        let period2 = end.timestamp().to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("period1", period1.as_str()),
                ("period2", period2.as_str()),
                ("interval", interval),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        let parsed: ChartResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(BotError::Provider {
                    symbol: symbol.to_string(),
                    message: format!("HTTP {}", status),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let candles = parse_chart(symbol, parsed)?;

        tracing::debug!(
            symbol = %symbol,
            interval = %interval,
            rows = candles.len(),
            "Fetched chart data"
        );

        Ok(candles)
    }

    /// Lookback history at `interval_minutes` over the last `days` days
    pub async fn get_history(
        &self,
        symbol: &str,
        days: i64,
        interval_minutes: i64,
    ) -> Result<Vec<Candle>> {
        let end = Utc::now();
        let start = end - Duration::days(days);
        let interval = format!("{}m", interval_minutes);
        self.get_candles(symbol, start, end, &interval).await
    }

    /// Most recent 1-minute row over the last five minutes, if any
    pub async fn get_latest(&self, symbol: &str) -> Result<Option<Candle>> {
        let end = Utc::now();
        let start = end - Duration::minutes(5);
        let candles = self.get_candles(symbol, start, end, "1m").await?;
        Ok(candles.last().copied())
    }
}

impl Default for YahooFinanceClient {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_chart(symbol: &str, response: ChartResponse) -> Result<Vec<Candle>> {
    if let Some(error) = response.chart.error {
        return Err(BotError::Provider {
            symbol: symbol.to_string(),
            message: format!("{}: {}", error.code, error.description),
        });
    }

    let Some(result) = response.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Vec::new());
    };

    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

    let candles = result
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, &ts)| {
            let timestamp = DateTime::from_timestamp(ts, 0)?;
            let open = quote.open.get(i).copied().flatten()?;
            let high = quote.high.get(i).copied().flatten()?;
            let low = quote.low.get(i).copied().flatten()?;
            let close = quote.close.get(i).copied().flatten()?;
            let volume = quote.volume.get(i).copied().flatten().unwrap_or(0.0);

            Some(Candle {
                timestamp,
                open,
                high,
                low,
                close,
                volume: volume.max(0.0).round() as u64,
            })
        })
        .collect();

    Ok(candles)
}
