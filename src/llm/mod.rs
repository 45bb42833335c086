//! Text generation capability backed by a local Ollama model
//! Provides explicit error handling, retries and a degrade-to-empty helper

use anyhow::{Context, Result};
use async_trait::async_trait;
use ollama_rs::{generation::completion::request::GenerationRequest, Ollama};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};
use url::Url;

/// Raw tool output longer than this is cut when formatting
const MAX_RAW_TOOL_RESULT: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub args: Value,
}

/// Everything a generation call produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    /// Tool name → result payload
    pub tool_results: BTreeMap<String, Value>,
}

impl GenerationOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.tool_results.is_empty()
    }

    pub fn has_tool_usage(&self) -> bool {
        !self.tool_calls.is_empty() || !self.tool_results.is_empty()
    }

    /// Text to feed to extraction: plain text, or the formatted research
    /// digest when tools were used
    pub fn analysis_text(&self) -> String {
        if self.has_tool_usage() {
            format_tool_response(self)
        } else {
            self.text.clone()
        }
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// `context_id` tags the call with the pipeline stage issuing it
    async fn generate(&self, prompt: &str, context_id: &str) -> Result<GenerationOutput>;
}

/// Generate, degrading to an empty output on error or timeout
pub async fn generate_or_empty(
    generator: &dyn TextGenerator,
    prompt: &str,
    context_id: &str,
    limit: Duration,
) -> GenerationOutput {
    match timeout(limit, generator.generate(prompt, context_id)).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!(context_id, error = %e, "Generation failed, continuing with empty output");
            GenerationOutput::default()
        }
        Err(_) => {
            warn!(context_id, timeout_secs = limit.as_secs_f64(), "Generation timed out");
            GenerationOutput::default()
        }
    }
}

/// Flatten text plus tool results into one research digest
pub fn format_tool_response(output: &GenerationOutput) -> String {
    let mut sections: Vec<String> = Vec::new();

    if !output.text.trim().is_empty() {
        sections.push("## Agent Analysis".to_string());
        sections.push(output.text.trim().to_string());
    }

    if !output.tool_results.is_empty() {
        sections.push("\n## Tool Results".to_string());

        for (tool_name, result) in &output.tool_results {
            sections.push(format!("\n### {}", tool_name));

            let structured = match result {
                Value::String(raw) if raw.trim_start().starts_with('{') => {
                    serde_json::from_str::<Value>(raw).ok()
                }
                Value::Object(_) => Some(result.clone()),
                _ => None,
            };

            match structured {
                Some(parsed) => format_structured_result(&parsed, &mut sections),
                None => {
                    let raw = match result {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    if raw.chars().count() > MAX_RAW_TOOL_RESULT {
                        let cut: String = raw.chars().take(MAX_RAW_TOOL_RESULT).collect();
                        sections.push(format!("{}...", cut));
                    } else {
                        sections.push(raw);
                    }
                }
            }
        }
    }

    if !output.tool_calls.is_empty() {
        sections.push("\n## Tools Used".to_string());
        for call in &output.tool_calls {
            sections.push(format!("- {}: {}", call.name, call.args));
        }
    }

    sections.join("\n")
}

fn format_structured_result(parsed: &Value, sections: &mut Vec<String>) {
    sections.push(format!(
        "Status: {}",
        parsed["status"].as_str().unwrap_or("unknown")
    ));

    let info = &parsed["data"]["info"];
    if info.is_object() {
        let price = info["currentPrice"]
            .as_f64()
            .map(|p| format!("{:.2}", p))
            .unwrap_or_else(|| "N/A".to_string());
        sections.push(format!("Current Price: ${}", price));
        sections.push(format!(
            "Daily Change: {:+.2}%",
            info["dayChangePercent"].as_f64().unwrap_or(0.0)
        ));
        sections.push(format!(
            "Volume: {}",
            info["volume"]
                .as_i64()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "N/A".to_string())
        ));
    } else if let Some(articles) = parsed["articles"].as_array() {
        sections.push(format!("Found {} articles", articles.len()));
        for (i, article) in articles.iter().take(3).enumerate() {
            sections.push(format!(
                "{}. {}",
                i + 1,
                article["title"].as_str().unwrap_or("No title")
            ));
        }
    }
}

/// LLM client configuration
#[derive(Debug, Clone)]
pub struct LLMConfig {
    pub ollama_url: String,
    pub primary_model: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            primary_model: "llama3.2:3b".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
        }
    }
}

/// LLM client with local Ollama integration
#[derive(Debug, Clone)]
pub struct LLMClient {
    ollama: Ollama,
    config: LLMConfig,
}

impl LLMClient {
    /// Create a client and check Ollama connectivity. An unreachable host is logged, not
    /// fatal: each `generate` then fails and callers fall back.
    pub async fn new(config: LLMConfig) -> Result<Self> {
        let parsed_url = Url::parse(&config.ollama_url).context("Invalid Ollama URL")?;

        let host = parsed_url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("No host in Ollama URL"))?;
        let port = parsed_url.port().unwrap_or(11434);

        let ollama = Ollama::new(format!("{}://{}", parsed_url.scheme(), host), port);

        info!("Testing Ollama connectivity at {}", config.ollama_url);

        match timeout(Duration::from_secs(10), ollama.list_local_models()).await {
            Ok(Ok(models)) => {
                let model_available = models.iter().any(|m| m.name.contains(&config.primary_model));
                if !model_available {
                    warn!(
                        "Primary model '{}' not found in available models. Consider pulling it with: ollama pull {}",
                        config.primary_model, config.primary_model
                    );
                }
            }
            Ok(Err(e)) => {
                warn!(
                    error = %e,
                    "Ollama API error when listing models. Is Ollama running? Generation will degrade to fallbacks"
                );
            }
            Err(_) => {
                warn!(
                    "Timeout connecting to Ollama at {}. Generation will degrade to fallbacks",
                    config.ollama_url
                );
            }
        }

        Ok(Self { ollama, config })
    }

    pub async fn from_config(config: &crate::config::Config) -> Result<Self> {
        let llm_config = LLMConfig {
            ollama_url: config.llm.ollama_url.clone(),
            primary_model: config.llm.primary_model.clone(),
            timeout_seconds: config.llm.timeout_seconds,
            max_retries: config.llm.max_retries,
        };

        Self::new(llm_config).await
    }

    /// Respond-with-OK probe used by the health command
    pub async fn health_check(&self) -> Result<()> {
        let output = timeout(
            Duration::from_secs(self.config.timeout_seconds),
            self.generate("Respond with exactly 'OK' if you can understand this.", "health"),
        )
        .await
        .context("Health check timeout")?
        .context("Health check failed")?;

        if output.text.trim().to_uppercase().contains("OK") {
            info!("LLM health check passed");
            Ok(())
        } else {
            Err(anyhow::anyhow!("Unexpected health check response: {}", output.text))
        }
    }
}

#[async_trait]
impl TextGenerator for LLMClient {
    async fn generate(&self, prompt: &str, context_id: &str) -> Result<GenerationOutput> {
        let model_name = &self.config.primary_model;

        info!(
            context_id,
            "Generating text with model '{}' (prompt length: {} chars)",
            model_name,
            prompt.len()
        );

        let mut last_error = None;
        for attempt in 1..=self.config.max_retries {
            let request = GenerationRequest::new(model_name.clone(), prompt.to_string());

            match timeout(
                Duration::from_secs(self.config.timeout_seconds),
                self.ollama.generate(request),
            )
            .await
            {
                Ok(Ok(response)) => {
                    info!(context_id, "Generated {} chars with model '{}'", response.response.len(), model_name);
                    return Ok(GenerationOutput::text(response.response));
                }
                Ok(Err(e)) => {
                    error!("Ollama API error on attempt {}: {}", attempt, e);
                    last_error = Some(anyhow::anyhow!("Ollama API error: {}", e));
                }
                Err(_) => {
                    error!(
                        "Timeout on attempt {} after {} seconds",
                        attempt, self.config.timeout_seconds
                    );
                    last_error = Some(anyhow::anyhow!(
                        "Request timeout after {} seconds",
                        self.config.timeout_seconds
                    ));
                }
            }

            if attempt < self.config.max_retries {
                let backoff_seconds = 2_u64.pow(attempt - 1);
                warn!(
                    "Retrying in {} seconds (attempt {}/{})",
                    backoff_seconds, attempt, self.config.max_retries
                );
                tokio::time::sleep(Duration::from_secs(backoff_seconds)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            anyhow::anyhow!(
                "Failed to generate text after {} attempts",
                self.config.max_retries
            )
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FailingGenerator;

    #[async_trait]
    impl TextGenerator for FailingGenerator {
        async fn generate(&self, _prompt: &str, _context_id: &str) -> Result<GenerationOutput> {
            Err(anyhow::anyhow!("model unavailable"))
        }
    }

    struct SlowGenerator;

    #[async_trait]
    impl TextGenerator for SlowGenerator {
        async fn generate(&self, _prompt: &str, _context_id: &str) -> Result<GenerationOutput> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(GenerationOutput::text("too late"))
        }
    }

    #[tokio::test]
    async fn test_generate_or_empty_on_error() {
        let output =
            generate_or_empty(&FailingGenerator, "prompt", "critique", Duration::from_secs(1)).await;
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_generate_or_empty_on_timeout() {
        let output =
            generate_or_empty(&SlowGenerator, "prompt", "critique", Duration::from_millis(20)).await;
        assert!(output.is_empty());
    }

    #[test]
    fn test_format_tool_response_sections() {
        let mut output = GenerationOutput::text("Bitcoin looks extended.");
        output.tool_calls.push(ToolCall {
            name: "get_market_data".into(),
            args: json!({"symbol": "BTC-USD"}),
        });
        output.tool_results.insert(
            "get_market_data".into(),
            json!({"status": "success", "data": {"info": {"currentPrice": 64000.5, "dayChangePercent": -1.25, "volume": 1200}}}),
        );
        output.tool_results.insert(
            "search_news".into(),
            Value::String(
                json!({"status": "success", "articles": [
                    {"title": "One"}, {"title": "Two"}, {"title": "Three"}, {"title": "Four"}
                ]})
                .to_string(),
            ),
        );
        output
            .tool_results
            .insert("notes".into(), Value::String("x".repeat(250)));

        let text = format_tool_response(&output);
        assert!(text.starts_with("## Agent Analysis\nBitcoin looks extended."));
        assert!(text.contains("Current Price: $64000.50"));
        assert!(text.contains("Daily Change: -1.25%"));
        assert!(text.contains("Found 4 articles"));
        assert!(text.contains("3. Three"));
        assert!(!text.contains("Four"));
        assert!(text.contains(&format!("{}...", "x".repeat(200))));
        assert!(text.contains("- get_market_data: {\"symbol\":\"BTC-USD\"}"));
    }

    #[test]
    fn test_analysis_text_without_tools_is_plain() {
        let output = GenerationOutput::text("plain answer");
        assert_eq!(output.analysis_text(), "plain answer");
    }

    #[tokio::test]
    #[ignore] // Requires running Ollama
    async fn test_ollama_integration() {
        let client = LLMClient::new(LLMConfig::default()).await.unwrap();
        let output = client.generate("Say hello in one word", "test").await.unwrap();
        assert!(!output.text.is_empty());
    }
}
