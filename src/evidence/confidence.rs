//! Confidence scoring from evidence counts

use serde::{Deserialize, Serialize};

/// Score reported when there is no evidence either way
pub const NO_EVIDENCE_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub floor: f64,
    pub ceiling: f64,
    /// Added to the denominator so a single confirmation never scores 1.0
    pub smoothing: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            floor: 0.15,
            ceiling: 0.85,
            smoothing: 1.0,
        }
    }
}

/// Confidence with the default scoring bounds
pub fn confidence(confirmations: usize, contradictions: usize) -> f64 {
    confidence_with(&ScoringConfig::default(), confirmations, contradictions)
}

pub fn confidence_with(config: &ScoringConfig, confirmations: usize, contradictions: usize) -> f64 {
    if confirmations == 0 && contradictions == 0 {
        return NO_EVIDENCE_CONFIDENCE;
    }

    let c = confirmations as f64;
    let x = contradictions as f64;
    let raw = c / (c + x + config.smoothing);

    raw.clamp(config.floor, config.ceiling)
}

/// Human-readable action label for a confidence score
pub fn recommendation_for(confidence: f64) -> &'static str {
    if confidence >= 0.7 {
        "Consider Position"
    } else if confidence >= 0.5 {
        "Monitor Closely"
    } else if confidence >= 0.3 {
        "Exercise Caution"
    } else {
        "Avoid or Wait"
    }
}
