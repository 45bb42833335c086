use super::retry::retry_with_backoff;
use super::validation::{validate_quote, validate_symbol};
use super::{DataError, DataResult, MarketDataSource, Quote};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;

const POLYGON_BASE_URL: &str = "https://api.polygon.io";

/// Calendar days of daily bars requested; covers weekends and holidays
const DAILY_BAR_LOOKBACK_DAYS: i64 = 7;

/// Polygon.io aggregates response
#[derive(Debug, Deserialize)]
struct PolygonAggregatesResponse {
    results: Option<Vec<PolygonAggregate>>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct PolygonAggregate {
    #[serde(rename = "v")]
    volume: f64, // Polygon sometimes returns volume as float
    #[serde(rename = "c")]
    close: f64,
}

/// Build a quote from daily bars sorted newest first. The change is measured
/// against the prior session's close, 0 when only one session is available.
fn quote_from_daily_bars(symbol: &str, bars: &[PolygonAggregate]) -> DataResult<Quote> {
    let latest = bars
        .first()
        .ok_or_else(|| DataError::NoData(symbol.to_string()))?;

    let change_pct = match bars.get(1) {
        Some(previous) if previous.close > 0.0 => {
            (latest.close - previous.close) / previous.close * 100.0
        }
        _ => 0.0,
    };

    Ok(Quote {
        symbol: symbol.to_string(),
        price: latest.close,
        change_pct,
        volume: latest.volume as i64,
        source: "polygon".to_string(),
    })
}

/// Token bucket limiting outbound API calls
struct RateLimiter {
    tokens: f64,
    max_tokens: f64,
    refill_rate: f64, // tokens per second
    last_refill: DateTime<Utc>,
}

impl RateLimiter {
    fn new(max_tokens: f64, refill_rate: f64) -> Self {
        Self {
            tokens: max_tokens,
            max_tokens,
            refill_rate,
            last_refill: Utc::now(),
        }
    }

    fn refill(&mut self) {
        let now = Utc::now();
        let elapsed = (now - self.last_refill).num_milliseconds() as f64 / 1000.0;
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;
    }

    /// Take a token if one is available, otherwise report the wait in seconds
    fn try_acquire(&mut self) -> Result<(), f64> {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            Err((1.0 - self.tokens) / self.refill_rate)
        }
    }
}

/// Map our instrument symbols onto Polygon tickers (`BTC-USD` → `X:BTCUSD`)
pub fn polygon_ticker(symbol: &str) -> String {
    match symbol.strip_suffix("-USD") {
        Some(base) => format!("X:{}USD", base),
        None => symbol.to_string(),
    }
}

pub struct MarketDataClient {
    client: reqwest::Client,
    polygon_api_key: Option<String>,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl MarketDataClient {
    pub fn new(polygon_api_key: Option<String>) -> DataResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent(concat!("tradesage/", env!("CARGO_PKG_VERSION")))
            .build()?;

        // Free tier: 5 calls per minute, burst of 5
        let rate_limiter = Arc::new(Mutex::new(RateLimiter::new(5.0, 5.0 / 60.0)));

        Ok(Self {
            client,
            polygon_api_key,
            rate_limiter,
        })
    }

    async fn wait_for_token(&self) {
        loop {
            let wait = {
                let mut limiter = self.rate_limiter.lock().await;
                match limiter.try_acquire() {
                    Ok(()) => return,
                    Err(wait) => wait,
                }
            };
            tracing::info!("Rate limit: waiting {:.1}s before making API call", wait);
            tokio::time::sleep(std::time::Duration::from_secs_f64(wait.max(0.1))).await;
        }
    }

    async fn fetch_latest_sessions(&self, symbol: &str, api_key: &str) -> DataResult<Quote> {
        self.wait_for_token().await;

        let to = Utc::now().date_naive();
        let from = to - Duration::days(DAILY_BAR_LOOKBACK_DAYS);
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}?adjusted=true&sort=desc&limit=2&apiKey={}",
            POLYGON_BASE_URL,
            urlencoding::encode(&polygon_ticker(symbol)),
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d"),
            api_key
        );
        tracing::debug!("Polygon API request: GET {}", url.replace(api_key, "***"));

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status_code = response.status().as_u16();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            if status_code == 429 {
                return Err(DataError::RateLimit { retry_after: 12 });
            }
            return Err(DataError::api_error(
                status_code,
                format!("Polygon.io: {}", error_text),
            ));
        }

        let body: PolygonAggregatesResponse = response.json().await?;

        // DELAYED is returned for free/basic tier subscriptions
        match body.status.as_str() {
            "OK" | "DELAYED" => {}
            status => {
                return Err(DataError::parse_error(format!(
                    "Polygon.io returned status {}",
                    status
                )))
            }
        }

        quote_from_daily_bars(symbol, &body.results.unwrap_or_default())
    }
}

#[async_trait]
impl MarketDataSource for MarketDataClient {
    async fn get_quote(&self, symbol: &str) -> DataResult<Quote> {
        validate_symbol(symbol)?;

        let api_key = self.polygon_api_key.as_deref().ok_or_else(|| {
            DataError::Config("POLYGON_API_KEY environment variable must be set".to_string())
        })?;

        tracing::info!(symbol, "Fetching quote");
        let quote = retry_with_backoff(|| self.fetch_latest_sessions(symbol, api_key), 2).await?;
        validate_quote(&quote)?;

        Ok(quote)
    }
}
