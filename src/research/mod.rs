//! Hybrid retrieval: knowledge-base similarity search plus live market and
//! news fetches, merged into one research bundle.

pub mod bundle;
pub mod instruments;

pub use bundle::{HistoricalInsight, MarketSnapshot, ResearchBundle};
pub use instruments::{extract_instruments, news_query_for};

use crate::data::{MarketDataSource, NewsSource};
use crate::embeddings::Embedder;
use crate::vector::{KnowledgeBase, KnowledgeMatch};
use anyhow::Result;
use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Similarity thresholds tried in order until one yields a match
    pub thresholds: Vec<f64>,
    pub search_limit: usize,
    /// Concurrent external fetches within one retrieval
    pub max_concurrency: usize,
    pub news_lookback_days: u32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            thresholds: vec![0.4, 0.3, 0.2],
            search_limit: 10,
            max_concurrency: 2,
            news_lookback_days: 7,
        }
    }
}

/// Query the knowledge base at each threshold in turn, stopping at the first
/// that returns at least one match.
pub async fn cascade_search(
    knowledge_base: &dyn KnowledgeBase,
    embedding: &[f32],
    thresholds: &[f64],
    limit: usize,
) -> Result<(Option<f64>, Vec<KnowledgeMatch>)> {
    for &threshold in thresholds {
        let matches = knowledge_base.search(embedding, limit, threshold, None).await?;
        if !matches.is_empty() {
            info!(threshold, count = matches.len(), "Knowledge base matches found");
            return Ok((Some(threshold), matches));
        }
    }

    Ok((None, Vec::new()))
}

pub struct HybridResearcher {
    embedder: Arc<dyn Embedder>,
    knowledge_base: Arc<dyn KnowledgeBase>,
    market: Arc<dyn MarketDataSource>,
    news: Arc<dyn NewsSource>,
    config: RetrievalConfig,
}

impl HybridResearcher {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        knowledge_base: Arc<dyn KnowledgeBase>,
        market: Arc<dyn MarketDataSource>,
        news: Arc<dyn NewsSource>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            knowledge_base,
            market,
            news,
            config,
        }
    }

    /// Never fails: each source that errors is recorded in `source_errors`
    /// and contributes nothing to the bundle.
    pub async fn research(&self, hypothesis: &str) -> ResearchBundle {
        let instruments = extract_instruments(hypothesis);
        let news_query = news_query_for(hypothesis, &instruments);
        info!(?instruments, %news_query, "Starting hybrid research");

        let permits = Semaphore::new(self.config.max_concurrency.max(1));

        let knowledge = async {
            let _permit = permits.acquire().await;
            self.search_knowledge_base(hypothesis).await
        };

        let quotes = join_all(instruments.iter().map(|symbol| {
            let permits = &permits;
            async move {
                let _permit = permits.acquire().await;
                (symbol.clone(), self.market.get_quote(symbol).await)
            }
        }));

        let news = async {
            let _permit = permits.acquire().await;
            self.news
                .search(&news_query, self.config.news_lookback_days)
                .await
        };

        let (knowledge, quotes, news) = tokio::join!(knowledge, quotes, news);

        let mut bundle = ResearchBundle {
            instruments: instruments.clone(),
            news_query: news_query.clone(),
            created_at: Some(Utc::now()),
            ..Default::default()
        };

        match knowledge {
            Ok((threshold, matches)) => {
                bundle.matched_threshold = threshold;
                bundle.historical_insights = matches
                    .into_iter()
                    .map(|m| HistoricalInsight {
                        title: m.title,
                        content: m.content,
                        similarity: m.similarity,
                        instrument: m.instrument,
                        origin: "knowledge_base".to_string(),
                    })
                    .collect();
            }
            Err(e) => {
                warn!(error = %e, "Knowledge base search failed");
                bundle.source_errors.insert("knowledge_base".into(), e.to_string());
            }
        }

        for (symbol, result) in quotes {
            let snapshot = match result {
                Ok(quote) => MarketSnapshot::Ok { quote },
                Err(e) => {
                    warn!(%symbol, error = %e, "Market data fetch failed");
                    bundle
                        .source_errors
                        .insert(format!("market_data:{}", symbol), e.to_string());
                    MarketSnapshot::Error {
                        message: e.to_string(),
                    }
                }
            };
            bundle.market_data.insert(symbol, snapshot);
        }

        match news {
            Ok(articles) => bundle.news_items = articles,
            Err(e) => {
                warn!(error = %e, "News search failed");
                bundle.source_errors.insert("news".into(), e.to_string());
            }
        }

        bundle.finalize(hypothesis);
        info!(
            confidence = bundle.bundle_confidence,
            insights = bundle.historical_insights.len(),
            news = bundle.news_items.len(),
            errors = bundle.source_errors.len(),
            "Hybrid research complete"
        );
        bundle
    }

    async fn search_knowledge_base(
        &self,
        hypothesis: &str,
    ) -> Result<(Option<f64>, Vec<KnowledgeMatch>)> {
        let embedding = self.embedder.embed(hypothesis).await?;
        cascade_search(
            self.knowledge_base.as_ref(),
            &embedding,
            &self.config.thresholds,
            self.config.search_limit,
        )
        .await
    }
}
