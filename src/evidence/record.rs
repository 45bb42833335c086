use super::confidence::{confidence_with, recommendation_for, ScoringConfig};
use super::{AlertItem, Direction, EvidenceItem, MAX_ALERT_ITEMS, MAX_EVIDENCE_ITEMS};
use serde::{Deserialize, Serialize};

/// Final analysed hypothesis, ready to persist
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypothesisRecord {
    pub title: String,
    pub direction: Direction,
    pub price_target: Option<f64>,
    pub timeframe: Option<String>,
    pub instruments: Vec<String>,
    pub confidence: f64,
    pub recommendation: String,
    pub confirmations: Vec<EvidenceItem>,
    pub contradictions: Vec<EvidenceItem>,
    pub alerts: Vec<AlertItem>,
}

impl HypothesisRecord {
    /// Assemble a record, enforcing list caps and deriving confidence from the
    /// capped evidence counts.
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        title: String,
        direction: Direction,
        price_target: Option<f64>,
        timeframe: Option<String>,
        instruments: Vec<String>,
        mut confirmations: Vec<EvidenceItem>,
        mut contradictions: Vec<EvidenceItem>,
        mut alerts: Vec<AlertItem>,
        scoring: &ScoringConfig,
    ) -> Self {
        confirmations.truncate(MAX_EVIDENCE_ITEMS);
        contradictions.truncate(MAX_EVIDENCE_ITEMS);
        alerts.truncate(MAX_ALERT_ITEMS);

        let confidence = confidence_with(scoring, confirmations.len(), contradictions.len());

        Self {
            title,
            direction,
            price_target,
            timeframe,
            instruments,
            confidence,
            recommendation: recommendation_for(confidence).to_string(),
            confirmations,
            contradictions,
            alerts,
        }
    }
}
