//! In-memory fakes of the pipeline's capability traits

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tradesage::data::{DataError, DataResult, MarketDataSource, NewsArticle, NewsSource, Quote};
use tradesage::embeddings::Embedder;
use tradesage::llm::{GenerationOutput, TextGenerator};
use tradesage::research::{HybridResearcher, RetrievalConfig};
use tradesage::vector::{KnowledgeBase, KnowledgeMatch, SearchFilters};

/// Responds per stage (`context_id`); unknown stages fail
#[derive(Default)]
pub struct ScriptedGenerator {
    responses: HashMap<String, String>,
    hang_on: Option<String>,
    pub calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(responses: &[(&str, &str)]) -> Self {
        Self {
            responses: responses
                .iter()
                .map(|(stage, text)| (stage.to_string(), text.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    /// Never return for this stage
    pub fn hanging_on(mut self, stage: &str) -> Self {
        self.hang_on = Some(stage.to_string());
        self
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, _prompt: &str, context_id: &str) -> Result<GenerationOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.hang_on.as_deref() == Some(context_id) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        match self.responses.get(context_id) {
            Some(text) => Ok(GenerationOutput::text(text.clone())),
            None => Err(anyhow::anyhow!("model unavailable for {}", context_id)),
        }
    }
}

/// Tracks how many fake fetches run at once
#[derive(Default)]
pub struct InFlight {
    current: AtomicUsize,
    pub max: AtomicUsize,
    pub total: AtomicUsize,
}

impl InFlight {
    pub async fn track(&self, delay: Duration) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct FixedEmbedder;

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![0.1; 8])
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(anyhow::anyhow!("embedding service unreachable"))
    }
}

pub fn knowledge_match(title: &str, content: &str, similarity: f64) -> KnowledgeMatch {
    KnowledgeMatch {
        id: format!("doc-{}", title.len()),
        title: title.to_string(),
        content: content.to_string(),
        instrument: None,
        source_type: Some("research".to_string()),
        similarity,
        payload: serde_json::json!({}),
    }
}

/// Returns stored matches whose similarity reaches the threshold, like the
/// real store
pub struct FilteringKnowledgeBase {
    pub matches: Vec<KnowledgeMatch>,
    pub thresholds_seen: std::sync::Mutex<Vec<f64>>,
    pub in_flight: Option<Arc<InFlight>>,
}

impl FilteringKnowledgeBase {
    pub fn new(matches: Vec<KnowledgeMatch>) -> Self {
        Self {
            matches,
            thresholds_seen: std::sync::Mutex::new(Vec::new()),
            in_flight: None,
        }
    }
}

#[async_trait]
impl KnowledgeBase for FilteringKnowledgeBase {
    async fn search(
        &self,
        _embedding: &[f32],
        limit: usize,
        similarity_threshold: f64,
        _filters: Option<&SearchFilters>,
    ) -> Result<Vec<KnowledgeMatch>> {
        if let Some(tracker) = &self.in_flight {
            tracker.track(Duration::from_millis(50)).await;
        }
        self.thresholds_seen.lock().unwrap().push(similarity_threshold);

        let mut found: Vec<KnowledgeMatch> = self
            .matches
            .iter()
            .filter(|m| m.similarity >= similarity_threshold)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        found.truncate(limit);
        Ok(found)
    }
}

/// Returns a fixed set of matches only when queried at one exact threshold
pub struct ThresholdKnowledgeBase {
    pub at: f64,
    pub matches: Vec<KnowledgeMatch>,
}

#[async_trait]
impl KnowledgeBase for ThresholdKnowledgeBase {
    async fn search(
        &self,
        _embedding: &[f32],
        _limit: usize,
        similarity_threshold: f64,
        _filters: Option<&SearchFilters>,
    ) -> Result<Vec<KnowledgeMatch>> {
        if (similarity_threshold - self.at).abs() < 1e-9 {
            Ok(self.matches.clone())
        } else {
            Ok(Vec::new())
        }
    }
}

pub struct FakeMarket {
    pub fail: bool,
    pub in_flight: Option<Arc<InFlight>>,
}

impl FakeMarket {
    pub fn ok() -> Self {
        Self { fail: false, in_flight: None }
    }

    pub fn failing() -> Self {
        Self { fail: true, in_flight: None }
    }
}

#[async_trait]
impl MarketDataSource for FakeMarket {
    async fn get_quote(&self, symbol: &str) -> DataResult<Quote> {
        if let Some(tracker) = &self.in_flight {
            tracker.track(Duration::from_millis(50)).await;
        }
        if self.fail {
            return Err(DataError::NoData(format!("no quote for {}", symbol)));
        }
        Ok(Quote {
            symbol: symbol.to_string(),
            price: 212.5,
            change_pct: 1.25,
            volume: 1_000_000,
            source: "fake".to_string(),
        })
    }
}

pub struct FakeNews {
    pub fail: bool,
    pub in_flight: Option<Arc<InFlight>>,
}

impl FakeNews {
    pub fn ok() -> Self {
        Self { fail: false, in_flight: None }
    }

    pub fn failing() -> Self {
        Self { fail: true, in_flight: None }
    }
}

#[async_trait]
impl NewsSource for FakeNews {
    async fn search(&self, query: &str, _days: u32) -> DataResult<Vec<NewsArticle>> {
        if let Some(tracker) = &self.in_flight {
            tracker.track(Duration::from_millis(50)).await;
        }
        if self.fail {
            return Err(DataError::Timeout { timeout_seconds: 30 });
        }
        Ok(vec![NewsArticle {
            title: format!("Markets move on {}", query),
            summary: None,
            source: "fake".to_string(),
            url: None,
            published: Utc::now(),
            sentiment: 0.2,
        }])
    }
}

/// Researcher where every source fails
pub fn failing_researcher() -> Arc<HybridResearcher> {
    Arc::new(HybridResearcher::new(
        Arc::new(FailingEmbedder),
        Arc::new(FilteringKnowledgeBase::new(Vec::new())),
        Arc::new(FakeMarket::failing()),
        Arc::new(FakeNews::failing()),
        RetrievalConfig::default(),
    ))
}
