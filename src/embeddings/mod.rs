//! Text embeddings via an OpenAI-compatible embeddings endpoint

use anyhow::Result;
use async_openai::{
    config::OpenAIConfig,
    types::{CreateEmbeddingRequestArgs, EmbeddingInput},
    Client as OpenAIClient,
};
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
pub const DEFAULT_EMBEDDING_CACHE_CAPACITY: usize = 1024;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Embedding client with a bounded LRU cache keyed by input text
pub struct EmbeddingClient {
    client: OpenAIClient<OpenAIConfig>,
    model_name: String,
    cache: Arc<Mutex<LruCache<String, Vec<f32>>>>,
    dimension: usize,
}

impl EmbeddingClient {
    /// Without `api_key` the client falls back to `OPENAI_API_KEY`.
    /// `api_base` overrides the endpoint for OpenAI-compatible providers.
    pub fn new(api_key: Option<&str>, api_base: Option<&str>) -> Self {
        let mut config = OpenAIConfig::new();
        if let Some(key) = api_key {
            config = config.with_api_key(key);
        }
        if let Some(base) = api_base {
            config = config.with_api_base(base);
        }

        info!("Initializing embeddings client ({})", DEFAULT_EMBEDDING_MODEL);

        Self {
            client: OpenAIClient::with_config(config),
            model_name: DEFAULT_EMBEDDING_MODEL.to_string(),
            cache: Arc::new(Mutex::new(LruCache::new(cache_capacity(
                DEFAULT_EMBEDDING_CACHE_CAPACITY,
            )))),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }

    /// Keep at most `capacity` embeddings, evicting the least recently used
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = Arc::new(Mutex::new(LruCache::new(cache_capacity(capacity))));
        self
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub async fn cache_len(&self) -> usize {
        self.cache.lock().await.len()
    }
}

fn cache_capacity(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(embedding) = self.cache.lock().await.get(text) {
            debug!("Embedding cache hit");
            return Ok(embedding.clone());
        }

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model_name)
            .input(EmbeddingInput::String(text.to_string()))
            .build()?;

        let response = self.client.embeddings().create(request).await?;

        let embedding: Vec<f32> = response
            .data
            .first()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned"))?
            .embedding
            .iter()
            .map(|&v| v as f32)
            .collect();

        info!(
            "Generated embedding with {} dimensions for text (first 50 chars): {}",
            embedding.len(),
            text.chars().take(50).collect::<String>()
        );

        self.cache
            .lock()
            .await
            .put(text.to_string(), embedding.clone());

        Ok(embedding)
    }
}
