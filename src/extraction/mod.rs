//! Structured extraction of evidence and alerts from free-form generated text

pub mod parsers;
pub mod sanitize;
pub mod vocab;

use crate::evidence::{
    AlertItem, EvidenceItem, EvidenceKind, Origin, Priority, Strength, MAX_ALERT_ITEMS,
    MAX_ALERT_TYPE_LEN, MAX_EVIDENCE_ITEMS, MAX_MESSAGE_LEN, MAX_QUOTE_LEN, MAX_REASON_LEN,
    MAX_SOURCE_LEN,
};
use parsers::{default_cascade, ParseOutcome, ParseStrategy, HEURISTIC_SOURCE};
use sanitize::{clean_field, rejection_reason};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use vocab::coerce_alert_type;

pub use vocab::{KeywordTable, DEFAULT_KEYWORDS};

/// One parsed record before typing and sanitization
pub type RawCandidate = Map<String, Value>;

/// Strategy tag reported when nothing parsed and the fixed defaults were used
pub const DEFAULTS_STRATEGY: &str = "defaults";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Contradiction,
    Confirmation,
    Alert,
}

impl TargetKind {
    pub fn default_reason(&self) -> &'static str {
        match self {
            TargetKind::Contradiction => "Market analysis identifies this challenge",
            TargetKind::Confirmation => {
                "Market analysis provides supporting evidence for this hypothesis."
            }
            TargetKind::Alert => "",
        }
    }
}

impl From<EvidenceKind> for TargetKind {
    fn from(kind: EvidenceKind) -> Self {
        match kind {
            EvidenceKind::Contradiction => TargetKind::Contradiction,
            EvidenceKind::Confirmation => TargetKind::Confirmation,
        }
    }
}

/// What to look for in a block of text
#[derive(Debug, Clone)]
pub struct TargetSpec {
    pub kind: TargetKind,
    pub primary_field: &'static str,
    pub required_keys: &'static [&'static str],
    pub pipe_fields: &'static [&'static str],
    pub keywords: Vec<String>,
    pub cap: usize,
}

impl TargetSpec {
    pub fn for_kind(kind: TargetKind, table: &KeywordTable) -> Self {
        match kind {
            TargetKind::Contradiction | TargetKind::Confirmation => Self {
                kind,
                primary_field: "quote",
                required_keys: &["quote"],
                pipe_fields: &["quote", "reason", "source", "strength"],
                keywords: if kind == TargetKind::Contradiction {
                    table.contradiction.clone()
                } else {
                    table.confirmation.clone()
                },
                cap: MAX_EVIDENCE_ITEMS,
            },
            TargetKind::Alert => Self {
                kind,
                primary_field: "message",
                required_keys: &["message"],
                pipe_fields: &["type", "message", "priority"],
                keywords: table.alert.clone(),
                cap: MAX_ALERT_ITEMS,
            },
        }
    }

    /// Every required key is present and not null
    pub fn accepts(&self, record: &RawCandidate) -> bool {
        self.required_keys
            .iter()
            .all(|key| record.get(*key).map(|v| !v.is_null()).unwrap_or(false))
    }
}

/// Extracted items plus the name of the strategy that produced them
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction<T> {
    pub items: Vec<T>,
    pub strategy: &'static str,
}

impl<T> Extraction<T> {
    pub fn used_defaults(&self) -> bool {
        self.strategy == DEFAULTS_STRATEGY
    }
}

pub struct ExtractionEngine {
    keywords: KeywordTable,
    cascade: Vec<Box<dyn ParseStrategy>>,
}

impl Default for ExtractionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORDS.clone())
    }
}

impl ExtractionEngine {
    pub fn new(keywords: KeywordTable) -> Self {
        Self {
            keywords,
            cascade: default_cascade(),
        }
    }

    pub fn keywords(&self) -> &KeywordTable {
        &self.keywords
    }

    /// Extract evidence of one kind. `subject` names the asset in default items.
    pub fn extract_evidence(
        &self,
        text: &str,
        kind: EvidenceKind,
        subject: &str,
    ) -> Extraction<EvidenceItem> {
        let target = TargetSpec::for_kind(kind.into(), &self.keywords);

        match self.run_cascade(text, &target, |raw| self.build_evidence(raw, target.kind)) {
            Some(extraction) => extraction,
            None => {
                warn!(kind = kind.as_str(), "No evidence parsed from generated text, using defaults");
                Extraction {
                    items: default_evidence(kind, subject),
                    strategy: DEFAULTS_STRATEGY,
                }
            }
        }
    }

    pub fn extract_alerts(&self, text: &str) -> Extraction<AlertItem> {
        let target = TargetSpec::for_kind(TargetKind::Alert, &self.keywords);

        match self.run_cascade(text, &target, |raw| self.build_alert(raw)) {
            Some(extraction) => extraction,
            None => {
                warn!("No alerts parsed from generated text, using defaults");
                Extraction {
                    items: default_alerts(),
                    strategy: DEFAULTS_STRATEGY,
                }
            }
        }
    }

    fn run_cascade<T>(
        &self,
        text: &str,
        target: &TargetSpec,
        build: impl Fn(&RawCandidate) -> Option<T>,
    ) -> Option<Extraction<T>> {
        if text.trim().is_empty() {
            return None;
        }

        for strategy in &self.cascade {
            let records = match strategy.parse(text, target) {
                ParseOutcome::Matched(records) => records,
                ParseOutcome::Empty => continue,
            };

            let parsed = records.len();
            let items: Vec<T> = records.iter().filter_map(&build).take(target.cap).collect();

            if items.is_empty() {
                debug!(
                    strategy = strategy.name(),
                    parsed, "All parsed candidates rejected by sanitizer"
                );
                continue;
            }

            debug!(strategy = strategy.name(), parsed, kept = items.len(), "Extraction matched");
            return Some(Extraction {
                items,
                strategy: strategy.name(),
            });
        }

        None
    }

    fn build_evidence(&self, raw: &RawCandidate, kind: TargetKind) -> Option<EvidenceItem> {
        let quote = clean_field(&field_text(raw, "quote")?, MAX_QUOTE_LEN);
        if let Some(reason) = rejection_reason(&quote) {
            debug!(reason, "Rejected evidence candidate");
            return None;
        }

        let reason = cleaned_or(raw, "reason", MAX_REASON_LEN, kind.default_reason());
        let source = cleaned_or(raw, "source", MAX_SOURCE_LEN, HEURISTIC_SOURCE);
        let strength = field_text(raw, "strength")
            .map(|s| self.keywords.classify_strength(&s))
            .unwrap_or(Strength::Medium);

        Some(EvidenceItem::new(quote, reason, source, strength, Origin::Generated))
    }

    fn build_alert(&self, raw: &RawCandidate) -> Option<AlertItem> {
        let message = clean_field(&field_text(raw, "message")?, MAX_MESSAGE_LEN);
        if let Some(reason) = rejection_reason(&message) {
            debug!(reason, "Rejected alert candidate");
            return None;
        }

        let alert_type = field_text(raw, "type")
            .map(|t| coerce_alert_type(&t))
            .unwrap_or(vocab::ALERT_TYPES[0]);
        let priority = field_text(raw, "priority")
            .map(|p| self.keywords.classify_priority(&p))
            .unwrap_or(Priority::Medium);

        Some(AlertItem::new(
            clean_field(alert_type, MAX_ALERT_TYPE_LEN),
            message,
            priority,
            Origin::Generated,
        ))
    }
}

fn field_text(raw: &RawCandidate, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn cleaned_or(raw: &RawCandidate, key: &str, max_len: usize, default: &str) -> String {
    field_text(raw, key)
        .map(|value| clean_field(&value, max_len))
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Minimal evidence used when nothing could be parsed
pub fn default_evidence(kind: EvidenceKind, subject: &str) -> Vec<EvidenceItem> {
    let item = match kind {
        EvidenceKind::Contradiction => EvidenceItem::new(
            format!("Economic uncertainty and market volatility challenge {subject} investment thesis."),
            "Broad market risk applies regardless of asset-specific fundamentals.",
            "Market Analysis",
            Strength::Medium,
            Origin::Fallback,
        ),
        EvidenceKind::Confirmation => EvidenceItem::new(
            format!("Market fundamentals and technical indicators support {subject} investment potential."),
            "Current market conditions and analysis suggest favorable outlook for price appreciation.",
            "Market Analysis",
            Strength::Medium,
            Origin::Fallback,
        ),
    };
    vec![item]
}

/// Alerts used when nothing could be parsed
pub fn default_alerts() -> Vec<AlertItem> {
    vec![
        AlertItem::new(
            "recommendation",
            "Monitor key market indicators and price levels for entry signals.",
            Priority::Medium,
            Origin::Fallback,
        ),
        AlertItem::new(
            "risk_monitoring",
            "Set appropriate stop-loss levels to manage downside risk.",
            Priority::Medium,
            Origin::Fallback,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_evidence_is_sanitized_and_coerced() {
        let engine = ExtractionEngine::default();
        let text = r#"[{"quote": "**Regulatory scrutiny** in the EU threatens App Store fees", "reason": "DMA enforcement", "source": "Reuters", "strength": "HIGH"}]"#;

        let extraction = engine.extract_evidence(text, EvidenceKind::Contradiction, "Apple");
        assert_eq!(extraction.strategy, "json");
        assert_eq!(extraction.items.len(), 1);

        let item = &extraction.items[0];
        assert_eq!(item.quote, "Regulatory scrutiny in the EU threatens App Store fees");
        assert_eq!(item.strength, Strength::Strong);
        assert_eq!(item.origin, Origin::Generated);
    }

    #[test]
    fn test_short_and_url_candidates_fall_through_to_next_strategy() {
        let engine = ExtractionEngine::default();
        let text = "{\"quote\": \"tiny\"}\n\
                    Competition from cheaper rivals is a growing risk for margins";

        let extraction = engine.extract_evidence(text, EvidenceKind::Contradiction, "Apple");
        assert_eq!(extraction.strategy, "heuristic");
        assert_eq!(
            extraction.items[0].quote,
            "Competition from cheaper rivals is a growing risk for margins"
        );
        assert_eq!(extraction.items[0].reason, "Market analysis identifies this challenge");
        assert_eq!(extraction.items[0].source, "Agent Analysis");
    }

    #[test]
    fn test_cap_applied_before_ranking() {
        let engine = ExtractionEngine::default();
        let text = (1..=6)
            .map(|i| format!("{i}. Revenue growth accelerated in segment number {i} this quarter"))
            .collect::<Vec<_>>()
            .join("\n");

        let extraction = engine.extract_evidence(&text, EvidenceKind::Confirmation, "Apple");
        assert_eq!(extraction.items.len(), 3);
        assert!(extraction.items[0].quote.ends_with("number 1 this quarter"));
    }

    #[test]
    fn test_unparseable_prose_yields_defaults() {
        let engine = ExtractionEngine::default();
        let extraction = engine.extract_evidence(
            "The weather was pleasant and the meeting ended on time today.",
            EvidenceKind::Contradiction,
            "Tesla",
        );

        assert!(extraction.used_defaults());
        assert_eq!(extraction.items.len(), 1);
        assert_eq!(extraction.items[0].origin, Origin::Fallback);
        assert!(extraction.items[0].quote.contains("Tesla"));
    }

    #[test]
    fn test_alert_extraction_coerces_type_and_priority() {
        let engine = ExtractionEngine::default();
        let text = r#"{"alerts": [{"type": "Price Alert", "message": "Watch the $200 support level closely", "priority": "HIGH"}]}"#;

        let extraction = engine.extract_alerts(text);
        assert_eq!(extraction.items.len(), 1);
        assert_eq!(extraction.items[0].alert_type, "recommendation");
        assert_eq!(extraction.items[0].priority, Priority::High);
    }

    #[test]
    fn test_empty_text_yields_default_alerts() {
        let extraction = ExtractionEngine::default().extract_alerts("   ");
        assert!(extraction.used_defaults());
        assert_eq!(extraction.items.len(), 2);
        assert!(extraction.items.iter().all(|a| a.origin == Origin::Fallback));
    }
}
