use super::retry::retry_with_backoff;
use super::{DataError, DataResult, NewsArticle, NewsSource};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

const NEWSAPI_URL: &str = "https://newsapi.org/v2/everything";
const PAGE_SIZE: usize = 10;

const POSITIVE_WORDS: [&str; 9] = [
    "gain", "surge", "rally", "jump", "rise", "bull", "strong", "positive", "growth",
];
const NEGATIVE_WORDS: [&str; 9] = [
    "fall", "drop", "crash", "decline", "bear", "weak", "negative", "loss", "concern",
];

pub struct NewsClient {
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl NewsClient {
    pub fn new(api_key: Option<String>) -> DataResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent(concat!("tradesage/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            api_key,
            http_client,
        })
    }

    async fn fetch_from_newsapi(
        &self,
        query: &str,
        from: DateTime<Utc>,
        api_key: &str,
    ) -> DataResult<Vec<NewsArticle>> {
        let url = format!(
            "{}?q={}&from={}&sortBy=publishedAt&language=en&pageSize={}&apiKey={}",
            NEWSAPI_URL,
            urlencoding::encode(query),
            from.format("%Y-%m-%d"),
            PAGE_SIZE,
            api_key
        );

        let response = self.http_client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DataError::api_error(
                status.as_u16(),
                format!("NewsAPI error: {}", error_text),
            ));
        }

        let body: serde_json::Value = response.json().await?;
        parse_articles(&body)
    }
}

/// Parse the NewsAPI `articles` array, skipping removed or untitled entries
pub fn parse_articles(body: &serde_json::Value) -> DataResult<Vec<NewsArticle>> {
    let articles = body["articles"]
        .as_array()
        .ok_or_else(|| DataError::parse_error("No articles array in response"))?;

    let parsed = articles
        .iter()
        .filter_map(|article| {
            let title = article["title"].as_str()?.trim();
            if title.is_empty() || title == "[Removed]" {
                return None;
            }

            let summary = article["description"].as_str().map(String::from);
            let published = article["publishedAt"]
                .as_str()
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(Utc::now);

            Some(NewsArticle {
                title: title.to_string(),
                sentiment: estimate_sentiment(title, summary.as_deref()),
                summary,
                source: article["source"]["name"]
                    .as_str()
                    .unwrap_or("Unknown")
                    .to_string(),
                url: article["url"].as_str().map(String::from),
                published,
            })
        })
        .collect();

    Ok(parsed)
}

/// Keyword sentiment in [-1, 1]: (positive - negative) / matched
pub fn estimate_sentiment(title: &str, description: Option<&str>) -> f32 {
    let text = format!(
        "{} {}",
        title.to_lowercase(),
        description.unwrap_or("").to_lowercase()
    );

    let positive = POSITIVE_WORDS.iter().filter(|w| text.contains(*w)).count();
    let negative = NEGATIVE_WORDS.iter().filter(|w| text.contains(*w)).count();

    let total = positive + negative;
    if total == 0 {
        return 0.0;
    }

    (positive as f32 - negative as f32) / total as f32
}

#[async_trait]
impl NewsSource for NewsClient {
    async fn search(&self, query: &str, days: u32) -> DataResult<Vec<NewsArticle>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| DataError::Config("NEWS_API_KEY not configured".to_string()))?;

        tracing::info!(query, days, "Searching news");
        let from = Utc::now() - Duration::days(days as i64);

        let articles = retry_with_backoff(|| self.fetch_from_newsapi(query, from, api_key), 2).await?;
        tracing::info!("Fetched {} news articles from NewsAPI", articles.len());

        Ok(articles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sentiment_estimate() {
        assert_eq!(estimate_sentiment("Stocks rally on strong earnings", None), 1.0);
        assert_eq!(estimate_sentiment("Shares fall amid concern", Some("weak guidance")), -1.0);
        assert_eq!(estimate_sentiment("Company holds annual meeting", None), 0.0);
    }

    #[test]
    fn test_parse_articles_skips_removed() {
        let body = json!({
            "articles": [
                {"title": "Apple shares rise", "description": "Gain after launch",
                 "source": {"name": "Reuters"}, "url": "https://r.com/a",
                 "publishedAt": "2024-05-01T12:00:00Z"},
                {"title": "[Removed]", "source": {"name": "x"}},
                {"description": "no title"}
            ]
        });

        let articles = parse_articles(&body).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].source, "Reuters");
        assert!(articles[0].sentiment > 0.0);
        assert_eq!(articles[0].published.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_parse_articles_requires_array() {
        assert!(parse_articles(&json!({"status": "error"})).is_err());
    }

    #[tokio::test]
    async fn test_missing_key_is_config_error() {
        let client = NewsClient::new(None).unwrap();
        assert!(matches!(
            client.search("bitcoin", 7).await,
            Err(DataError::Config(_))
        ));
    }
}
