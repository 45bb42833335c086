use crate::config::Config;
use crate::data::{MarketDataClient, NewsClient};
use crate::embeddings::EmbeddingClient;
use crate::extraction::{ExtractionEngine, KeywordTable};
use crate::llm::LLMClient;
use crate::orchestrator::{AnalysisMode, HypothesisPipeline, RunState};
use crate::research::HybridResearcher;
use crate::store::{persist_record, PgHypothesisStore};
use crate::vector::PgKnowledgeBase;
use anyhow::{Context, Result};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};

/// Build the pipeline from configuration. Services are created once and shared.
pub async fn build_pipeline(pool: PgPool, config: &Config) -> Result<HypothesisPipeline> {
    let generator = Arc::new(LLMClient::from_config(config).await?);

    if config.apis.openai_api_key.is_none() {
        warn!("OPENAI_API_KEY not set, knowledge-base search will rely on the environment");
    }
    let embedder = Arc::new(EmbeddingClient::new(
        config.apis.openai_api_key.as_deref(),
        config.apis.openai_api_base.as_deref(),
    ));

    let knowledge_base = PgKnowledgeBase::new(pool);
    if let Err(e) = knowledge_base.verify().await {
        warn!(error = %e, "Knowledge base unavailable, retrieval will record it as a source error");
    }
    let knowledge_base = Arc::new(knowledge_base);
    let market = Arc::new(
        MarketDataClient::new(config.apis.polygon_api_key.clone())
            .context("Failed to create market data client")?,
    );
    let news = Arc::new(
        NewsClient::new(config.apis.news_api_key.clone()).context("Failed to create news client")?,
    );

    let researcher = Arc::new(HybridResearcher::new(
        embedder,
        knowledge_base,
        market,
        news,
        config.retrieval.clone(),
    ));

    let keywords = match &config.keyword_table_path {
        Some(path) => KeywordTable::load(path)?,
        None => KeywordTable::default(),
    };

    Ok(HypothesisPipeline::new(
        generator,
        researcher,
        ExtractionEngine::new(keywords),
        config.pipeline.clone(),
    ))
}

/// Analyze a hypothesis, persist the record and print the response as JSON
pub async fn analyze(pool: PgPool, config: Config, hypothesis: String, mode: AnalysisMode) -> Result<()> {
    let pipeline = build_pipeline(pool.clone(), &config).await?;
    let outcome = pipeline.run(&hypothesis, mode).await;

    let mut hypothesis_id = None;
    if let Some(record) = &outcome.record {
        let store = PgHypothesisStore::new(pool);
        let bundle = outcome.state.research();
        match persist_record(&store, record, outcome.state.status_label(), bundle).await {
            Ok(report) => hypothesis_id = Some(report.hypothesis_id),
            Err(e) => warn!(error = %e, "Failed to persist hypothesis, returning unsaved result"),
        }
    }

    let response = outcome.response(hypothesis_id);
    info!(
        status = %response.status,
        confidence = ?response.confidence_score,
        "Analysis finished"
    );

    if mode == AnalysisMode::Refine {
        if let Some(context) = outcome.state.context() {
            println!("{}", serde_json::to_string_pretty(context)?);
        }
    }
    println!("{}", serde_json::to_string_pretty(&response)?);

    if let RunState::Aborted { stage, reason } = &outcome.state.run_state {
        anyhow::bail!("Hypothesis analysis aborted at {}: {}", stage, reason);
    }
    Ok(())
}

pub async fn dashboard(pool: PgPool, limit: i64) -> Result<()> {
    let store = PgHypothesisStore::new(pool);
    let summary = store.dashboard(limit).await.context("Failed to load dashboard")?;

    println!("\nHypotheses: {}", summary.total_hypotheses);
    match summary.average_confidence {
        Some(avg) => println!("Average confidence: {:.1}%", avg * 100.0),
        None => println!("Average confidence: n/a"),
    }
    println!("Unread alerts: {}", summary.unread_alerts);

    if !summary.recent.is_empty() {
        println!("\nRecent:");
        for h in &summary.recent {
            println!(
                "  #{} [{}] {:.0}% {} - {} ({})",
                h.id,
                h.direction,
                h.confidence * 100.0,
                h.recommendation,
                h.title,
                h.created_at.format("%Y-%m-%d %H:%M")
            );
        }
    }
    Ok(())
}

pub async fn alerts(pool: PgPool, unread_only: bool, limit: i64) -> Result<()> {
    let store = PgHypothesisStore::new(pool);
    let alerts = store
        .list_alerts(unread_only, limit)
        .await
        .context("Failed to load alerts")?;

    if alerts.is_empty() {
        println!("No alerts");
        return Ok(());
    }

    for alert in alerts {
        println!(
            "  #{} {} [{}] {} (hypothesis #{}){}",
            alert.id,
            alert.alert_type,
            alert.priority,
            alert.message,
            alert.hypothesis_id,
            if alert.is_read { "" } else { " *" }
        );
    }
    Ok(())
}

pub async fn mark_read(pool: PgPool, alert_id: i64) -> Result<()> {
    let store = PgHypothesisStore::new(pool);
    store
        .mark_read(alert_id)
        .await
        .with_context(|| format!("Failed to mark alert {} as read", alert_id))?;

    println!("Alert {} marked as read", alert_id);
    Ok(())
}

pub async fn health(pool: PgPool, config: Config) -> Result<()> {
    let knowledge_base = PgKnowledgeBase::new(pool);
    knowledge_base.verify().await?;
    let (total, embedded) = knowledge_base.document_stats().await?;
    println!("Database: ok, pgvector: ok, {} documents ({} embedded)", total, embedded);

    let llm = LLMClient::from_config(&config).await?;
    llm.health_check().await.context("Ollama health check failed")?;
    println!("Ollama: ok ({})", config.llm.primary_model);

    Ok(())
}
