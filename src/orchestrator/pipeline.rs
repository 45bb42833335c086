//! Stage pipeline executor
//! Runs stages in a fixed order over per-request state, substituting each
//! stage's fallback on a non-fatal failure or timeout.

use super::context::AssetContext;
use crate::evidence::{AlertItem, EvidenceItem};
use crate::research::ResearchBundle;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Normalize,
    ExtractContext,
    Retrieve,
    Critique,
    Synthesize,
    Alert,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Normalize,
        Stage::ExtractContext,
        Stage::Retrieve,
        Stage::Critique,
        Stage::Synthesize,
        Stage::Alert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Normalize => "normalize",
            Stage::ExtractContext => "extract_context",
            Stage::Retrieve => "retrieve",
            Stage::Critique => "critique",
            Stage::Synthesize => "synthesize",
            Stage::Alert => "alert",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Parse failed: {0}")]
    Parse(String),

    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error("Stage timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl StageError {
    /// Fatal errors abort the run instead of substituting a fallback
    pub fn is_fatal(&self) -> bool {
        matches!(self, StageError::InvalidInput(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageOutput {
    Normalized { hypothesis: String },
    Context { context: AssetContext },
    Research { bundle: Box<ResearchBundle> },
    Contradictions { items: Vec<EvidenceItem> },
    Synthesis { confirmations: Vec<EvidenceItem>, confidence: f64 },
    Alerts { items: Vec<AlertItem> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    Full,
    Partial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running { stage: Stage },
    Completed { completion: Completion },
    Aborted { stage: Stage, reason: String },
}

/// Per-request pipeline state, never shared across requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub hypothesis_text: String,
    pub outputs: BTreeMap<Stage, StageOutput>,
    pub errors: BTreeMap<Stage, String>,
    pub run_state: RunState,
}

impl PipelineState {
    pub fn new(hypothesis_text: impl Into<String>) -> Self {
        Self {
            hypothesis_text: hypothesis_text.into(),
            outputs: BTreeMap::new(),
            errors: BTreeMap::new(),
            run_state: RunState::Pending,
        }
    }

    /// Normalized hypothesis, or the raw text before Normalize has run
    pub fn hypothesis(&self) -> &str {
        match self.outputs.get(&Stage::Normalize) {
            Some(StageOutput::Normalized { hypothesis }) => hypothesis,
            _ => &self.hypothesis_text,
        }
    }

    pub fn context(&self) -> Option<&AssetContext> {
        match self.outputs.get(&Stage::ExtractContext) {
            Some(StageOutput::Context { context }) => Some(context),
            _ => None,
        }
    }

    /// Extracted context, or one derived from the text rules
    pub fn context_or_default(&self) -> AssetContext {
        self.context()
            .cloned()
            .unwrap_or_else(|| AssetContext::from_text(self.hypothesis()))
    }

    pub fn research(&self) -> Option<&ResearchBundle> {
        match self.outputs.get(&Stage::Retrieve) {
            Some(StageOutput::Research { bundle }) => Some(bundle),
            _ => None,
        }
    }

    pub fn contradictions(&self) -> &[EvidenceItem] {
        match self.outputs.get(&Stage::Critique) {
            Some(StageOutput::Contradictions { items }) => items,
            _ => &[],
        }
    }

    pub fn confirmations(&self) -> &[EvidenceItem] {
        match self.outputs.get(&Stage::Synthesize) {
            Some(StageOutput::Synthesis { confirmations, .. }) => confirmations,
            _ => &[],
        }
    }

    pub fn confidence(&self) -> Option<f64> {
        match self.outputs.get(&Stage::Synthesize) {
            Some(StageOutput::Synthesis { confidence, .. }) => Some(*confidence),
            _ => None,
        }
    }

    pub fn alerts(&self) -> &[AlertItem] {
        match self.outputs.get(&Stage::Alert) {
            Some(StageOutput::Alerts { items }) => items,
            _ => &[],
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.run_state, RunState::Aborted { .. })
    }

    /// `success`, `success_fallback` or `error`
    pub fn status_label(&self) -> &'static str {
        match &self.run_state {
            RunState::Completed { completion: Completion::Full } => "success",
            RunState::Completed { completion: Completion::Partial } => "success_fallback",
            _ => "error",
        }
    }

    /// Stage name → error message
    pub fn error_messages(&self) -> BTreeMap<String, String> {
        self.errors
            .iter()
            .map(|(stage, message)| (stage.as_str().to_string(), message.clone()))
            .collect()
    }
}

#[async_trait]
pub trait PipelineStage: Send + Sync {
    fn stage(&self) -> Stage;

    async fn run(&self, state: &PipelineState) -> Result<StageOutput, StageError>;

    /// Output substituted when `run` fails or times out
    fn fallback(&self, state: &PipelineState) -> StageOutput;
}

pub struct StageExecutor {
    stages: Vec<Box<dyn PipelineStage>>,
    stage_timeout: Duration,
}

impl StageExecutor {
    pub fn new(stages: Vec<Box<dyn PipelineStage>>, stage_timeout: Duration) -> Self {
        Self {
            stages,
            stage_timeout,
        }
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.stages.iter().map(|s| s.stage()).collect()
    }

    pub async fn run(&self, hypothesis_text: &str) -> PipelineState {
        self.run_until(hypothesis_text, None).await
    }

    /// Run stages in order, stopping after `last` when given
    pub async fn run_until(&self, hypothesis_text: &str, last: Option<Stage>) -> PipelineState {
        let mut state = PipelineState::new(hypothesis_text);

        for stage in &self.stages {
            let name = stage.stage();
            state.run_state = RunState::Running { stage: name };
            info!(stage = %name, "Running pipeline stage");

            let result = match timeout(self.stage_timeout, stage.run(&state)).await {
                Ok(result) => result,
                Err(_) => Err(StageError::Timeout(self.stage_timeout)),
            };

            match result {
                Ok(output) => {
                    state.outputs.insert(name, output);
                }
                Err(e) if e.is_fatal() => {
                    error!(stage = %name, error = %e, "Fatal stage error, aborting pipeline");
                    state.errors.insert(name, e.to_string());
                    state.run_state = RunState::Aborted {
                        stage: name,
                        reason: e.to_string(),
                    };
                    return state;
                }
                Err(e) => {
                    warn!(stage = %name, error = %e, "Stage failed, using fallback");
                    let fallback = stage.fallback(&state);
                    state.errors.insert(name, e.to_string());
                    state.outputs.insert(name, fallback);
                }
            }

            if last == Some(name) {
                break;
            }
        }

        let completion = if state.errors.is_empty() {
            Completion::Full
        } else {
            Completion::Partial
        };
        info!(?completion, errors = state.errors.len(), "Pipeline completed");
        state.run_state = RunState::Completed { completion };
        state
    }
}
