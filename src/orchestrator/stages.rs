//! The six analysis stages and the services they share

use super::context::AssetContext;
use super::normalize::{clean_hypothesis_title, raw_title, validate_input};
use super::pipeline::{PipelineStage, PipelineState, Stage, StageError, StageOutput};
use super::prompts::HypothesisPrompts;
use super::PipelineConfig;
use crate::evidence::{
    confidence_with, merge_alerts, merge_evidence, EvidenceItem, EvidenceKind,
};
use crate::extraction::parsers::find_json_object;
use crate::extraction::{default_alerts, default_evidence, ExtractionEngine};
use crate::llm::{generate_or_empty, GenerationOutput, TextGenerator};
use crate::research::{HybridResearcher, ResearchBundle};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Shared, constructed once at startup
pub struct PipelineServices {
    pub generator: Arc<dyn TextGenerator>,
    pub researcher: Arc<HybridResearcher>,
    pub engine: ExtractionEngine,
    pub config: PipelineConfig,
}

impl PipelineServices {
    async fn generate(&self, prompt: &str, stage: Stage) -> GenerationOutput {
        generate_or_empty(
            self.generator.as_ref(),
            prompt,
            stage.as_str(),
            Duration::from_secs(self.config.generation_timeout_seconds),
        )
        .await
    }

    /// Evidence of one kind: knowledge-base items merged with what the
    /// generation produced for this stage
    async fn gather_evidence(
        &self,
        state: &PipelineState,
        kind: EvidenceKind,
        stage: Stage,
    ) -> Result<Vec<EvidenceItem>, StageError> {
        let hypothesis = state.hypothesis();
        let context = state.context_or_default();
        let research = research_or_empty(state);

        let prompt = match kind {
            EvidenceKind::Contradiction => HypothesisPrompts::critique_prompt(hypothesis, &context, &research),
            EvidenceKind::Confirmation => HypothesisPrompts::synthesis_prompt(hypothesis, &context, &research),
        };
        let output = self.generate(&prompt, stage).await;
        if output.is_empty() {
            return Err(StageError::Generation(format!("empty {} response", stage)));
        }

        let extraction = self
            .engine
            .extract_evidence(&output.analysis_text(), kind, context.display_name());
        if extraction.used_defaults() {
            return Err(StageError::Parse(format!(
                "no {} evidence found in generated text",
                kind.as_str()
            )));
        }

        let generated: Vec<EvidenceItem> = extraction
            .items
            .into_iter()
            .map(|item| {
                let specific = context.mentions(&item.quote);
                item.with_asset_specific(specific)
            })
            .collect();

        let retrieved = research.retrieved_evidence(kind, &context.asset_terms(), self.engine.keywords());
        debug!(
            kind = kind.as_str(),
            retrieved = retrieved.len(),
            generated = generated.len(),
            strategy = extraction.strategy,
            "Merging evidence"
        );

        Ok(merge_evidence(vec![retrieved, generated], &self.config.merge))
    }

    /// Knowledge-base items merged with the fixed minimal set
    fn fallback_evidence(&self, state: &PipelineState, kind: EvidenceKind) -> Vec<EvidenceItem> {
        let context = state.context_or_default();
        let research = research_or_empty(state);
        let retrieved = research.retrieved_evidence(kind, &context.asset_terms(), self.engine.keywords());

        merge_evidence(
            vec![retrieved, default_evidence(kind, context.display_name())],
            &self.config.merge,
        )
    }
}

fn research_or_empty(state: &PipelineState) -> ResearchBundle {
    state.research().cloned().unwrap_or_else(ResearchBundle::empty)
}

pub struct NormalizeStage {
    services: Arc<PipelineServices>,
}

impl NormalizeStage {
    pub fn new(services: Arc<PipelineServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl PipelineStage for NormalizeStage {
    fn stage(&self) -> Stage {
        Stage::Normalize
    }

    async fn run(&self, state: &PipelineState) -> Result<StageOutput, StageError> {
        validate_input(&state.hypothesis_text).map_err(StageError::InvalidInput)?;

        let prompt = HypothesisPrompts::normalize_prompt(&state.hypothesis_text);
        let output = self.services.generate(&prompt, Stage::Normalize).await;
        if output.text.trim().is_empty() {
            return Err(StageError::Generation("empty restatement".to_string()));
        }

        let hypothesis = clean_hypothesis_title(&output.text);
        if validate_input(&hypothesis).is_err() {
            return Err(StageError::Parse("restatement had no usable text".to_string()));
        }

        info!(%hypothesis, "Hypothesis normalized");
        Ok(StageOutput::Normalized { hypothesis })
    }

    fn fallback(&self, state: &PipelineState) -> StageOutput {
        StageOutput::Normalized {
            hypothesis: raw_title(&state.hypothesis_text),
        }
    }
}

pub struct ExtractContextStage {
    services: Arc<PipelineServices>,
}

impl ExtractContextStage {
    pub fn new(services: Arc<PipelineServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl PipelineStage for ExtractContextStage {
    fn stage(&self) -> Stage {
        Stage::ExtractContext
    }

    async fn run(&self, state: &PipelineState) -> Result<StageOutput, StageError> {
        let hypothesis = state.hypothesis();
        let mut context = AssetContext::from_text(hypothesis);

        let prompt = HypothesisPrompts::context_prompt(hypothesis);
        let output = self.services.generate(&prompt, Stage::ExtractContext).await;
        if output.text.trim().is_empty() {
            return Err(StageError::Generation("empty context response".to_string()));
        }

        let json = find_json_object(&output.text)
            .ok_or_else(|| StageError::Parse("no JSON object in context response".to_string()))?;
        context.apply_json(&json);

        info!(
            symbol = %context.primary_symbol,
            direction = context.direction.as_str(),
            "Asset context extracted"
        );
        Ok(StageOutput::Context { context })
    }

    fn fallback(&self, state: &PipelineState) -> StageOutput {
        StageOutput::Context {
            context: AssetContext::from_text(state.hypothesis()),
        }
    }
}

pub struct RetrieveStage {
    services: Arc<PipelineServices>,
}

impl RetrieveStage {
    pub fn new(services: Arc<PipelineServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl PipelineStage for RetrieveStage {
    fn stage(&self) -> Stage {
        Stage::Retrieve
    }

    async fn run(&self, state: &PipelineState) -> Result<StageOutput, StageError> {
        let bundle = self.services.researcher.research(state.hypothesis()).await;
        Ok(StageOutput::Research {
            bundle: Box::new(bundle),
        })
    }

    fn fallback(&self, _state: &PipelineState) -> StageOutput {
        StageOutput::Research {
            bundle: Box::new(ResearchBundle::empty()),
        }
    }
}

pub struct CritiqueStage {
    services: Arc<PipelineServices>,
}

impl CritiqueStage {
    pub fn new(services: Arc<PipelineServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl PipelineStage for CritiqueStage {
    fn stage(&self) -> Stage {
        Stage::Critique
    }

    async fn run(&self, state: &PipelineState) -> Result<StageOutput, StageError> {
        let items = self
            .services
            .gather_evidence(state, EvidenceKind::Contradiction, Stage::Critique)
            .await?;
        Ok(StageOutput::Contradictions { items })
    }

    fn fallback(&self, state: &PipelineState) -> StageOutput {
        StageOutput::Contradictions {
            items: self.services.fallback_evidence(state, EvidenceKind::Contradiction),
        }
    }
}

pub struct SynthesizeStage {
    services: Arc<PipelineServices>,
}

impl SynthesizeStage {
    pub fn new(services: Arc<PipelineServices>) -> Self {
        Self { services }
    }

    fn scored(&self, state: &PipelineState, confirmations: Vec<EvidenceItem>) -> StageOutput {
        let confidence = confidence_with(
            &self.services.config.scoring,
            confirmations.len(),
            state.contradictions().len(),
        );
        StageOutput::Synthesis {
            confirmations,
            confidence,
        }
    }
}

#[async_trait]
impl PipelineStage for SynthesizeStage {
    fn stage(&self) -> Stage {
        Stage::Synthesize
    }

    async fn run(&self, state: &PipelineState) -> Result<StageOutput, StageError> {
        let confirmations = self
            .services
            .gather_evidence(state, EvidenceKind::Confirmation, Stage::Synthesize)
            .await?;
        Ok(self.scored(state, confirmations))
    }

    fn fallback(&self, state: &PipelineState) -> StageOutput {
        let confirmations = self.services.fallback_evidence(state, EvidenceKind::Confirmation);
        self.scored(state, confirmations)
    }
}

pub struct AlertStage {
    services: Arc<PipelineServices>,
}

impl AlertStage {
    pub fn new(services: Arc<PipelineServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl PipelineStage for AlertStage {
    fn stage(&self) -> Stage {
        Stage::Alert
    }

    async fn run(&self, state: &PipelineState) -> Result<StageOutput, StageError> {
        let context = state.context_or_default();
        let confidence = state.confidence().unwrap_or(0.5);

        let prompt = HypothesisPrompts::alert_prompt(state.hypothesis(), &context, confidence);
        let output = self.services.generate(&prompt, Stage::Alert).await;
        if output.is_empty() {
            return Err(StageError::Generation("empty alert response".to_string()));
        }

        let extraction = self.services.engine.extract_alerts(&output.analysis_text());
        if extraction.used_defaults() {
            return Err(StageError::Parse("no alerts found in generated text".to_string()));
        }

        Ok(StageOutput::Alerts {
            items: merge_alerts(vec![extraction.items], &self.services.config.merge),
        })
    }

    fn fallback(&self, _state: &PipelineState) -> StageOutput {
        StageOutput::Alerts {
            items: default_alerts(),
        }
    }
}

/// All six stages in execution order
pub fn standard_stages(services: &Arc<PipelineServices>) -> Vec<Box<dyn PipelineStage>> {
    vec![
        Box::new(NormalizeStage::new(Arc::clone(services))),
        Box::new(ExtractContextStage::new(Arc::clone(services))),
        Box::new(RetrieveStage::new(Arc::clone(services))),
        Box::new(CritiqueStage::new(Arc::clone(services))),
        Box::new(SynthesizeStage::new(Arc::clone(services))),
        Box::new(AlertStage::new(Arc::clone(services))),
    ]
}
