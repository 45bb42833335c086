//! Keyword vocabularies used for heuristic extraction and enum coercion.
//!
//! Tables are data, not code: they carry a `version` and can be loaded from
//! JSON so vocabulary changes do not touch the parsers.

use crate::evidence::{Priority, Strength};
use anyhow::{bail, Context, Result};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

pub const CURRENT_VOCAB_VERSION: u32 = 1;

/// Controlled alert type vocabulary. Index 0 is the coercion default.
pub const ALERT_TYPES: [&str; 5] = [
    "recommendation",
    "warning",
    "trigger",
    "risk_monitoring",
    "entry_signal",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordTable {
    pub version: u32,
    pub contradiction: Vec<String>,
    pub confirmation: Vec<String>,
    pub alert: Vec<String>,
    /// Words counted when screening retrieved text as a risk signal
    pub risk_signals: Vec<String>,
    /// Words counted when screening retrieved text as a support signal
    pub support_signals: Vec<String>,
    pub strength_strong: Vec<String>,
    pub strength_weak: Vec<String>,
    pub priority_high: Vec<String>,
    pub priority_low: Vec<String>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

impl Default for KeywordTable {
    fn default() -> Self {
        Self {
            version: CURRENT_VOCAB_VERSION,
            contradiction: words(&[
                "risk", "challenge", "concern", "negative", "decline", "threat", "headwind",
                "pressure", "competition", "regulat", "uncertain", "weakness", "downside",
                "slowdown", "bearish",
            ]),
            confirmation: words(&[
                "growth", "support", "positive", "strong", "momentum", "demand", "bullish",
                "outperform", "advantage", "expansion", "upside", "adoption", "record",
                "increase", "rising",
            ]),
            alert: words(&[
                "monitor", "watch", "alert", "trigger", "stop-loss", "stop loss", "entry",
                "exit", "consider", "set ", "track", "warning",
            ]),
            risk_signals: words(&[
                "risk", "challenge", "threat", "concern", "pressure", "headwind", "decline",
                "fall", "competition", "regulation", "uncertainty", "disruption", "weakness",
                "vulnerable", "problem",
            ]),
            support_signals: words(&[
                "growth", "strong", "increase", "demand", "momentum", "outperform", "record",
                "expansion", "advantage", "upside", "adoption", "beat", "rally", "gain",
                "improve",
            ]),
            strength_strong: words(&["strong", "high"]),
            strength_weak: words(&["weak", "low"]),
            priority_high: words(&["high"]),
            priority_low: words(&["low"]),
        }
    }
}

lazy_static! {
    pub static ref DEFAULT_KEYWORDS: KeywordTable = KeywordTable::default();
}

impl KeywordTable {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Load a table from a JSON file, rejecting versions newer than this build
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read keyword table {}", path.display()))?;
        let table = Self::from_json(&raw)
            .with_context(|| format!("Invalid keyword table {}", path.display()))?;

        if table.version > CURRENT_VOCAB_VERSION {
            bail!(
                "Keyword table {} has version {}, newest supported is {}",
                path.display(),
                table.version,
                CURRENT_VOCAB_VERSION
            );
        }

        info!(path = %path.display(), version = table.version, "Loaded keyword table");
        Ok(table)
    }

    /// Contains strong/high → Strong; weak/low → Weak; anything else → Medium
    pub fn classify_strength(&self, raw: &str) -> Strength {
        let lower = raw.to_lowercase();
        if contains_any(&lower, &self.strength_strong) {
            Strength::Strong
        } else if contains_any(&lower, &self.strength_weak) {
            Strength::Weak
        } else {
            Strength::Medium
        }
    }

    pub fn classify_priority(&self, raw: &str) -> Priority {
        let lower = raw.to_lowercase();
        if contains_any(&lower, &self.priority_high) {
            Priority::High
        } else if contains_any(&lower, &self.priority_low) {
            Priority::Low
        } else {
            Priority::Medium
        }
    }

    /// Number of distinct risk signal words present in the text
    pub fn risk_signal_count(&self, text: &str) -> usize {
        count_distinct(&text.to_lowercase(), &self.risk_signals)
    }

    pub fn support_signal_count(&self, text: &str) -> usize {
        count_distinct(&text.to_lowercase(), &self.support_signals)
    }
}

/// Map a free-form alert type onto the controlled vocabulary
pub fn coerce_alert_type(raw: &str) -> &'static str {
    let normalized = raw.trim().to_lowercase().replace([' ', '-'], "_");
    ALERT_TYPES
        .iter()
        .find(|known| **known == normalized)
        .copied()
        .unwrap_or(ALERT_TYPES[0])
}

pub(crate) fn contains_any(lower: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|k| lower.contains(k.as_str()))
}

fn count_distinct(lower: &str, keywords: &[String]) -> usize {
    keywords.iter().filter(|k| lower.contains(k.as_str())).count()
}
