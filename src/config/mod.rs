use crate::evidence::{MergeConfig, ScoringConfig};
use crate::orchestrator::PipelineConfig;
use crate::research::RetrievalConfig;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub apis: ApiConfig,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    pub retrieval: RetrievalConfig,
    /// JSON keyword table replacing the built-in extraction vocabulary
    pub keyword_table_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub openai_api_key: Option<String>,
    pub openai_api_base: Option<String>,
    pub polygon_api_key: Option<String>,
    pub news_api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub ollama_url: String,
    pub primary_model: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

/// Parse an optional environment variable, falling back to `default`
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {} value: {}", key, raw)),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file - this sets env vars that aren't already set
        dotenv::dotenv().ok();

        // Database configuration - DATABASE_URL is required
        let database_url = env::var("DATABASE_URL")
            .context("DATABASE_URL environment variable is required but not set")?;

        let defaults = Config::default();

        let scoring = ScoringConfig {
            floor: env_or("CONFIDENCE_FLOOR", defaults.pipeline.scoring.floor)?,
            ceiling: env_or("CONFIDENCE_CEILING", defaults.pipeline.scoring.ceiling)?,
            ..defaults.pipeline.scoring
        };
        if !(0.0..=1.0).contains(&scoring.floor)
            || !(0.0..=1.0).contains(&scoring.ceiling)
            || scoring.floor > scoring.ceiling
        {
            bail!(
                "CONFIDENCE_FLOOR ({}) and CONFIDENCE_CEILING ({}) must satisfy 0 <= floor <= ceiling <= 1",
                scoring.floor,
                scoring.ceiling
            );
        }

        let merge = MergeConfig {
            jaccard_threshold: env_or("DEDUP_JACCARD_THRESHOLD", defaults.pipeline.merge.jaccard_threshold)?,
            ..defaults.pipeline.merge
        };
        if !(0.0..=1.0).contains(&merge.jaccard_threshold) {
            bail!("DEDUP_JACCARD_THRESHOLD must be between 0 and 1");
        }

        let config = Config {
            database: DatabaseConfig {
                url: database_url,
                max_connections: env_or("DB_MAX_CONNECTIONS", defaults.database.max_connections)?,
                min_connections: env_or("DB_MIN_CONNECTIONS", defaults.database.min_connections)?,
            },
            apis: ApiConfig {
                openai_api_key: env::var("OPENAI_API_KEY").ok(),
                openai_api_base: env::var("OPENAI_API_BASE").ok(),
                polygon_api_key: env::var("POLYGON_API_KEY").ok(),
                news_api_key: env::var("NEWS_API_KEY").ok(),
            },
            llm: LlmConfig {
                ollama_url: env::var("OLLAMA_URL").unwrap_or(defaults.llm.ollama_url),
                primary_model: env::var("PRIMARY_MODEL").unwrap_or(defaults.llm.primary_model),
                timeout_seconds: env_or("LLM_TIMEOUT_SECONDS", defaults.llm.timeout_seconds)?,
                max_retries: env_or("LLM_MAX_RETRIES", defaults.llm.max_retries)?,
            },
            pipeline: PipelineConfig {
                stage_timeout_seconds: env_or(
                    "STAGE_TIMEOUT_SECONDS",
                    defaults.pipeline.stage_timeout_seconds,
                )?,
                generation_timeout_seconds: env_or(
                    "GENERATION_TIMEOUT_SECONDS",
                    defaults.pipeline.generation_timeout_seconds,
                )?,
                scoring,
                merge,
            },
            retrieval: RetrievalConfig {
                max_concurrency: env_or(
                    "RETRIEVAL_MAX_CONCURRENCY",
                    defaults.retrieval.max_concurrency,
                )?,
                ..defaults.retrieval
            },
            keyword_table_path: env::var("KEYWORD_TABLE_PATH").ok().map(PathBuf::from),
        };

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/tradesage".to_string(),
                max_connections: 5,
                min_connections: 1,
            },
            apis: ApiConfig {
                openai_api_key: None,
                openai_api_base: None,
                polygon_api_key: None,
                news_api_key: None,
            },
            llm: LlmConfig {
                ollama_url: "http://localhost:11434".to_string(),
                primary_model: "llama3.2:3b".to_string(),
                timeout_seconds: 30,
                max_retries: 3,
            },
            pipeline: PipelineConfig::default(),
            retrieval: RetrievalConfig::default(),
            keyword_table_path: None,
        }
    }
}
