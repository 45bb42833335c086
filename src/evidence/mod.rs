//! Evidence and alert records shared by extraction, merging and scoring.

pub mod confidence;
pub mod merge;
pub mod record;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use confidence::{confidence, confidence_with, recommendation_for, ScoringConfig};
pub use merge::{jaccard, merge_alerts, merge_evidence, tokenize, MergeConfig};
pub use record::HypothesisRecord;

/// Field limits for persisted evidence and alerts
pub const MAX_QUOTE_LEN: usize = 500;
pub const MAX_REASON_LEN: usize = 500;
pub const MAX_SOURCE_LEN: usize = 50;
pub const MAX_ALERT_TYPE_LEN: usize = 50;
pub const MAX_MESSAGE_LEN: usize = 500;

/// Per-record list caps
pub const MAX_EVIDENCE_ITEMS: usize = 3;
pub const MAX_ALERT_ITEMS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strength {
    Strong,
    Medium,
    Weak,
}

impl Strength {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strength::Strong => "Strong",
            Strength::Medium => "Medium",
            Strength::Weak => "Weak",
        }
    }

    pub fn bonus(&self) -> f64 {
        match self {
            Strength::Strong => 0.3,
            Strength::Medium => 0.2,
            Strength::Weak => 0.1,
        }
    }
}

impl fmt::Display for Strength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Generated,
    Retrieved,
    Fallback,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Generated => "generated",
            Origin::Retrieved => "retrieved",
            Origin::Fallback => "fallback",
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            Origin::Retrieved => 0.6,
            Origin::Generated => 0.4,
            Origin::Fallback => 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            Priority::High => 0.3,
            Priority::Medium => 0.2,
            Priority::Low => 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceKind {
    Contradiction,
    Confirmation,
}

impl EvidenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceKind::Contradiction => "contradiction",
            EvidenceKind::Confirmation => "confirmation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Bullish => "bullish",
            Direction::Bearish => "bearish",
            Direction::Neutral => "neutral",
        }
    }
}

/// A single piece of supporting or opposing evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub quote: String,
    pub reason: String,
    pub source: String,
    pub strength: Strength,
    pub origin: Origin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    #[serde(default)]
    pub asset_specific: bool,
}

impl EvidenceItem {
    pub fn new(
        quote: impl Into<String>,
        reason: impl Into<String>,
        source: impl Into<String>,
        strength: Strength,
        origin: Origin,
    ) -> Self {
        Self {
            quote: quote.into(),
            reason: reason.into(),
            source: source.into(),
            strength,
            origin,
            similarity: None,
            asset_specific: false,
        }
    }

    /// Build an item backed by a knowledge-base match. Similarity is clamped to [0, 1].
    pub fn retrieved(
        quote: impl Into<String>,
        reason: impl Into<String>,
        source: impl Into<String>,
        strength: Strength,
        similarity: f64,
    ) -> Self {
        let mut item = Self::new(quote, reason, source, strength, Origin::Retrieved);
        item.similarity = Some(similarity.clamp(0.0, 1.0));
        item
    }

    pub fn with_asset_specific(mut self, asset_specific: bool) -> Self {
        self.asset_specific = asset_specific;
        self
    }

    /// Ranking priority: origin weight + strength bonus + relevance bonus
    pub fn priority(&self) -> f64 {
        let relevance = if self.asset_specific { 0.2 } else { 0.0 };
        self.origin.weight() + self.strength.bonus() + relevance
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertItem {
    #[serde(rename = "type")]
    pub alert_type: String,
    pub message: String,
    pub priority: Priority,
    #[serde(default = "default_alert_origin")]
    pub origin: Origin,
}

fn default_alert_origin() -> Origin {
    Origin::Generated
}

impl AlertItem {
    pub fn new(
        alert_type: impl Into<String>,
        message: impl Into<String>,
        priority: Priority,
        origin: Origin,
    ) -> Self {
        Self {
            alert_type: alert_type.into(),
            message: message.into(),
            priority,
            origin,
        }
    }

    pub fn rank(&self) -> f64 {
        self.origin.weight() + self.priority.weight()
    }
}
