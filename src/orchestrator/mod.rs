//! Orchestrator for the hypothesis analysis pipeline
//! Normalize → ExtractContext → Retrieve → Critique → Synthesize → Alert

pub mod context;
pub mod normalize;
pub mod pipeline;
pub mod prompts;
pub mod stages;

pub use context::AssetContext;
pub use pipeline::{
    Completion, PipelineStage, PipelineState, RunState, Stage, StageError, StageExecutor,
    StageOutput,
};
pub use stages::PipelineServices;

use crate::evidence::{AlertItem, EvidenceItem, HypothesisRecord, MergeConfig, ScoringConfig};
use crate::extraction::ExtractionEngine;
use crate::llm::TextGenerator;
use crate::research::{extract_instruments, HybridResearcher};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub stage_timeout_seconds: u64,
    /// Per generation call; kept below the stage timeout
    pub generation_timeout_seconds: u64,
    pub scoring: ScoringConfig,
    pub merge: MergeConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout_seconds: 30,
            generation_timeout_seconds: 25,
            scoring: ScoringConfig::default(),
            merge: MergeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// All six stages
    Analyze,
    /// Normalize and ExtractContext only
    Refine,
}

impl FromStr for AnalysisMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "analyze" => Ok(AnalysisMode::Analyze),
            "refine" => Ok(AnalysisMode::Refine),
            other => Err(format!("Unknown mode '{}', expected analyze or refine", other)),
        }
    }
}

/// Final state plus the assembled record for a completed full analysis
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub state: PipelineState,
    pub record: Option<HypothesisRecord>,
}

/// Serialized result of an analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub hypothesis_id: Option<i64>,
    pub hypothesis: String,
    pub confidence_score: Option<f64>,
    pub recommendation: Option<String>,
    pub contradictions: Vec<EvidenceItem>,
    pub confirmations: Vec<EvidenceItem>,
    pub alerts: Vec<AlertItem>,
    pub status: String,
    pub errors: BTreeMap<String, String>,
}

impl PipelineOutcome {
    pub fn response(&self, hypothesis_id: Option<i64>) -> AnalysisResponse {
        let (contradictions, confirmations, alerts) = match &self.record {
            Some(record) => (
                record.contradictions.clone(),
                record.confirmations.clone(),
                record.alerts.clone(),
            ),
            None => (Vec::new(), Vec::new(), Vec::new()),
        };

        AnalysisResponse {
            hypothesis_id,
            hypothesis: self.state.hypothesis().to_string(),
            confidence_score: self.record.as_ref().map(|r| r.confidence),
            recommendation: self.record.as_ref().map(|r| r.recommendation.clone()),
            contradictions,
            confirmations,
            alerts,
            status: self.state.status_label().to_string(),
            errors: self.state.error_messages(),
        }
    }
}

pub struct HypothesisPipeline {
    executor: StageExecutor,
    scoring: ScoringConfig,
}

impl HypothesisPipeline {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        researcher: Arc<HybridResearcher>,
        engine: ExtractionEngine,
        config: PipelineConfig,
    ) -> Self {
        let stage_timeout = Duration::from_secs(config.stage_timeout_seconds);
        let scoring = config.scoring;
        let services = Arc::new(PipelineServices {
            generator,
            researcher,
            engine,
            config,
        });

        Self {
            executor: StageExecutor::new(stages::standard_stages(&services), stage_timeout),
            scoring,
        }
    }

    pub async fn run(&self, hypothesis_text: &str, mode: AnalysisMode) -> PipelineOutcome {
        match mode {
            AnalysisMode::Analyze => self.analyze(hypothesis_text).await,
            AnalysisMode::Refine => self.refine(hypothesis_text).await,
        }
    }

    pub async fn analyze(&self, hypothesis_text: &str) -> PipelineOutcome {
        info!("Starting hypothesis analysis");
        let state = self.executor.run(hypothesis_text).await;
        let record = if state.is_aborted() {
            None
        } else {
            Some(self.assemble(&state))
        };

        PipelineOutcome { state, record }
    }

    /// Restate the hypothesis and extract its context without evidence gathering
    pub async fn refine(&self, hypothesis_text: &str) -> PipelineOutcome {
        info!("Starting hypothesis refinement");
        let state = self
            .executor
            .run_until(hypothesis_text, Some(Stage::ExtractContext))
            .await;

        PipelineOutcome {
            state,
            record: None,
        }
    }

    fn assemble(&self, state: &PipelineState) -> HypothesisRecord {
        let context = state.context_or_default();
        let instruments = match state.research() {
            Some(bundle) if !bundle.instruments.is_empty() => bundle.instruments.clone(),
            _ => extract_instruments(state.hypothesis()),
        };

        HypothesisRecord::assemble(
            state.hypothesis().to_string(),
            context.direction,
            context.price_target,
            context.timeframe,
            instruments,
            state.confirmations().to_vec(),
            state.contradictions().to_vec(),
            state.alerts().to_vec(),
            &self.scoring,
        )
    }
}
