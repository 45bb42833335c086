//! Research bundle: merged knowledge-base and live-source results

use crate::data::{NewsArticle, Quote};
use crate::evidence::{EvidenceItem, EvidenceKind, Strength, MAX_QUOTE_LEN};
use crate::extraction::sanitize::{clean_field, sanitize_headline};
use crate::extraction::vocab::KeywordTable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const RECENCY_TERMS: [&str; 5] = ["today", "latest", "current", "breaking", "recent"];

/// Retrieved insights must reach this similarity to become evidence
pub const MIN_EVIDENCE_SIMILARITY: f64 = 0.3;
/// Above this similarity an insight counts even without naming the asset
pub const ASSET_AGNOSTIC_SIMILARITY: f64 = 0.5;
pub const STRONG_EVIDENCE_SIMILARITY: f64 = 0.7;
pub const MIN_EVIDENCE_CONTENT_LEN: usize = 100;
pub const MIN_SIGNAL_WORDS: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum MarketSnapshot {
    Ok { quote: Quote },
    Error { message: String },
}

impl MarketSnapshot {
    pub fn is_ok(&self) -> bool {
        matches!(self, MarketSnapshot::Ok { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalInsight {
    pub title: String,
    pub content: String,
    pub similarity: f64,
    pub instrument: Option<String>,
    pub origin: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchBundle {
    pub instruments: Vec<String>,
    pub news_query: String,
    pub market_data: BTreeMap<String, MarketSnapshot>,
    pub news_items: Vec<NewsArticle>,
    pub historical_insights: Vec<HistoricalInsight>,
    /// Threshold at which the knowledge-base cascade found matches
    pub matched_threshold: Option<f64>,
    pub data_source_counts: BTreeMap<String, usize>,
    /// Per-source failure messages
    pub source_errors: BTreeMap<String, String>,
    pub bundle_confidence: f64,
    pub summary: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl ResearchBundle {
    /// Bundle with no data, used when retrieval cannot run at all
    pub fn empty() -> Self {
        let mut bundle = Self {
            created_at: Some(Utc::now()),
            ..Default::default()
        };
        bundle.finalize("");
        bundle
    }

    /// Recompute counts, confidence and the textual summary
    pub fn finalize(&mut self, hypothesis: &str) {
        self.data_source_counts = BTreeMap::from([
            ("knowledge_base".to_string(), self.historical_insights.len()),
            (
                "market_data".to_string(),
                self.market_data.values().filter(|s| s.is_ok()).count(),
            ),
            ("news".to_string(), self.news_items.len()),
        ]);
        self.bundle_confidence = compute_bundle_confidence(self);
        self.summary = build_summary(self, hypothesis);
    }

    pub fn average_similarity(&self) -> f64 {
        if self.historical_insights.is_empty() {
            return 0.0;
        }
        self.historical_insights.iter().map(|h| h.similarity).sum::<f64>()
            / self.historical_insights.len() as f64
    }

    /// Convert knowledge-base insights into evidence candidates of one kind.
    /// `asset_terms` are lowercase names/symbols used for the relevance check.
    pub fn retrieved_evidence(
        &self,
        kind: EvidenceKind,
        asset_terms: &[String],
        keywords: &KeywordTable,
    ) -> Vec<EvidenceItem> {
        self.historical_insights
            .iter()
            .filter(|insight| insight.similarity >= MIN_EVIDENCE_SIMILARITY)
            .filter(|insight| insight.content.chars().count() >= MIN_EVIDENCE_CONTENT_LEN)
            .filter_map(|insight| {
                let lower = insight.content.to_lowercase();
                let mentions_asset = asset_terms.iter().any(|t| !t.is_empty() && lower.contains(t.as_str()));
                if !mentions_asset && insight.similarity < ASSET_AGNOSTIC_SIMILARITY {
                    return None;
                }

                let signals = match kind {
                    EvidenceKind::Contradiction => keywords.risk_signal_count(&insight.content),
                    EvidenceKind::Confirmation => keywords.support_signal_count(&insight.content),
                };
                if signals < MIN_SIGNAL_WORDS {
                    return None;
                }

                let strength = if insight.similarity > STRONG_EVIDENCE_SIMILARITY {
                    Strength::Strong
                } else {
                    Strength::Medium
                };
                let reason = match kind {
                    EvidenceKind::Contradiction => "Historical research highlights risks relevant to this hypothesis",
                    EvidenceKind::Confirmation => "Historical research supports this hypothesis",
                };
                let source = if insight.title.trim().is_empty() {
                    "Knowledge Base".to_string()
                } else {
                    clean_field(&insight.title, crate::evidence::MAX_SOURCE_LEN)
                };

                Some(
                    EvidenceItem::retrieved(
                        clean_field(&insight.content, MAX_QUOTE_LEN),
                        reason,
                        source,
                        strength,
                        insight.similarity,
                    )
                    .with_asset_specific(mentions_asset),
                )
            })
            .collect()
    }
}

/// 0.4 · average similarity + 0.3 if any market snapshot succeeded + 0.3 if
/// any news item was found, capped at 1.0
pub fn compute_bundle_confidence(bundle: &ResearchBundle) -> f64 {
    let mut confidence = 0.4 * bundle.average_similarity();

    if bundle.market_data.values().any(|s| s.is_ok()) {
        confidence += 0.3;
    }
    if !bundle.news_items.is_empty() {
        confidence += 0.3;
    }

    confidence.min(1.0)
}

fn build_summary(bundle: &ResearchBundle, hypothesis: &str) -> String {
    let mut sections: Vec<String> = Vec::new();
    let lower = hypothesis.to_lowercase();

    if RECENCY_TERMS.iter().any(|t| lower.contains(t)) && !bundle.news_items.is_empty() {
        sections.push("Latest Developments:".to_string());
        for article in bundle.news_items.iter().take(3) {
            sections.push(format!("- {}", sanitize_headline(&article.title)));
        }
    }

    let quotes: Vec<&Quote> = bundle
        .market_data
        .values()
        .filter_map(|s| match s {
            MarketSnapshot::Ok { quote } => Some(quote),
            MarketSnapshot::Error { .. } => None,
        })
        .collect();
    if !quotes.is_empty() {
        sections.push("Current Market Data:".to_string());
        for quote in quotes {
            sections.push(format!(
                "- {}: ${:.2} ({:+.2}%)",
                quote.symbol, quote.price, quote.change_pct
            ));
        }
    }

    if !bundle.historical_insights.is_empty() {
        sections.push("Historical Context:".to_string());
        for insight in bundle.historical_insights.iter().take(3) {
            sections.push(format!(
                "- {} (relevance: {:.2})",
                sanitize_headline(&insight.title),
                insight.similarity
            ));
        }
    }

    if sections.is_empty() {
        "Limited data available for analysis".to_string()
    } else {
        sections.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insight(content: &str, similarity: f64) -> HistoricalInsight {
        HistoricalInsight {
            title: "Sector report".into(),
            content: content.into(),
            similarity,
            instrument: None,
            origin: "knowledge_base".into(),
        }
    }

    fn quote(symbol: &str) -> Quote {
        Quote {
            symbol: symbol.into(),
            price: 101.0,
            change_pct: -0.5,
            volume: 10,
            source: "test".into(),
        }
    }

    #[test]
    fn test_confidence_with_only_insights() {
        let mut bundle = ResearchBundle {
            historical_insights: vec![insight("a", 0.30), insight("b", 0.40)],
            ..Default::default()
        };
        bundle.market_data.insert(
            "AAPL".into(),
            MarketSnapshot::Error { message: "down".into() },
        );
        bundle.finalize("Apple will rise");

        assert!((bundle.bundle_confidence - 0.14).abs() < 1e-9);
        assert_eq!(bundle.data_source_counts["knowledge_base"], 2);
        assert_eq!(bundle.data_source_counts["market_data"], 0);
    }

    #[test]
    fn test_confidence_any_market_snapshot_counts() {
        let mut bundle = ResearchBundle::default();
        bundle.market_data.insert("AAPL".into(), MarketSnapshot::Ok { quote: quote("AAPL") });
        bundle.market_data.insert(
            "TSLA".into(),
            MarketSnapshot::Error { message: "timeout".into() },
        );
        bundle.finalize("");
        assert!((bundle.bundle_confidence - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_empty_bundle() {
        let bundle = ResearchBundle::empty();
        assert_eq!(bundle.bundle_confidence, 0.0);
        assert_eq!(bundle.summary, "Limited data available for analysis");
    }

    #[test]
    fn test_summary_sections() {
        let mut bundle = ResearchBundle::default();
        bundle.market_data.insert("AAPL".into(), MarketSnapshot::Ok { quote: quote("AAPL") });
        bundle.historical_insights.push(insight("content", 0.42));
        bundle.finalize("Latest Apple news");

        assert!(bundle.summary.contains("Current Market Data:\n- AAPL: $101.00 (-0.50%)"));
        assert!(bundle.summary.contains("- Sector report (relevance: 0.42)"));
        assert!(!bundle.summary.contains("Latest Developments"));
    }

    #[test]
    fn test_retrieved_contradictions_filtering() {
        let risky = "Apple faces mounting regulatory risk in Europe and growing competition \
                     from Android makers, which could weigh on margins over the next year.";
        let generic_risky = "Technology companies broadly face regulation and competition \
                             pressure that may lead to a decline in hardware margins over time.";
        let bland = "Apple reported revenue in line with expectations and announced a new \
                     product event for the autumn, with no other changes to guidance at all.";

        let bundle = ResearchBundle {
            historical_insights: vec![
                insight(risky, 0.35),
                insight(generic_risky, 0.45),
                insight(generic_risky, 0.75),
                insight(bland, 0.8),
                insight("short risk competition", 0.9),
            ],
            ..Default::default()
        };

        let items = bundle.retrieved_evidence(
            EvidenceKind::Contradiction,
            &["apple".to_string(), "aapl".to_string()],
            &KeywordTable::default(),
        );

        assert_eq!(items.len(), 2);
        assert!(items[0].asset_specific);
        assert_eq!(items[0].strength, Strength::Medium);
        assert_eq!(items[0].similarity, Some(0.35));
        assert!(!items[1].asset_specific);
        assert_eq!(items[1].strength, Strength::Strong);
    }
}
