//! Live retrieval sources: market quotes and news search

pub mod errors;
pub mod market;
pub mod news;
pub mod retry;

pub use errors::{DataError, DataResult};
pub use market::MarketDataClient;
pub use news::NewsClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest price snapshot for an instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub change_pct: f64,
    pub volume: i64,
    pub source: String,
}

/// News article with a keyword-based sentiment estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    pub summary: Option<String>,
    pub source: String,
    pub url: Option<String>,
    pub published: DateTime<Utc>,
    /// -1.0 (negative) to 1.0 (positive)
    pub sentiment: f32,
}

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn get_quote(&self, symbol: &str) -> DataResult<Quote>;
}

#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn search(&self, query: &str, days: u32) -> DataResult<Vec<NewsArticle>>;
}

/// Validation helpers
pub mod validation {
    use super::*;

    /// Accepts equity tickers plus the `-USD` crypto and `=F` futures forms
    pub fn validate_symbol(symbol: &str) -> DataResult<()> {
        if symbol.is_empty() {
            return Err(DataError::validation_error("symbol", "Symbol cannot be empty"));
        }

        if symbol.len() > 10 {
            return Err(DataError::validation_error("symbol", "Symbol too long (max 10 chars)"));
        }

        if !symbol
            .chars()
            .all(|c| c.is_ascii_uppercase() || c == '-' || c == '=')
        {
            return Err(DataError::InvalidSymbol(symbol.to_string()));
        }

        Ok(())
    }

    pub fn validate_quote(quote: &Quote) -> DataResult<()> {
        if !quote.price.is_finite() || quote.price <= 0.0 {
            return Err(DataError::validation_error("price", "Price must be positive"));
        }

        if quote.volume < 0 {
            return Err(DataError::validation_error("volume", "Volume cannot be negative"));
        }

        Ok(())
    }

}
