//! Prompt templates for each generation-backed pipeline stage
//! Templates ask for JSON first and a pipe-delimited fallback second; the
//! extraction cascade accepts either.

use super::context::AssetContext;
use crate::extraction::sanitize::sanitize_for_prompt;
use crate::research::ResearchBundle;

/// Research digest placed into a prompt is cut to this many characters
pub const MAX_PROMPT_RESEARCH_LEN: usize = 500;
const MAX_PROMPT_HYPOTHESIS_LEN: usize = 1000;

/// Prompt template builder for hypothesis analysis
pub struct HypothesisPrompts;

impl HypothesisPrompts {
    pub fn normalize_prompt(raw_hypothesis: &str) -> String {
        format!(
            r#"Restate the following trading hypothesis as one clear, testable sentence.
Keep the asset, the expected direction, any price target and any timeframe.
Respond with the sentence only.

HYPOTHESIS: {}"#,
            sanitize_for_prompt(raw_hypothesis, MAX_PROMPT_HYPOTHESIS_LEN)
        )
    }

    pub fn context_prompt(hypothesis: &str) -> String {
        format!(
            r#"Identify the asset referenced by this trading hypothesis.

HYPOTHESIS: {}

Respond with a JSON object in this exact format:
{{
  "asset_info": {{
    "primary_symbol": "ticker symbol, e.g. AAPL or BTC-USD",
    "asset_name": "full name",
    "asset_type": "stock | cryptocurrency | commodity | etf",
    "sector": "sector or category"
  }},
  "hypothesis_details": {{
    "direction": "bullish | bearish | neutral",
    "price_target": "number or null",
    "timeframe": "timeframe or null"
  }}
}}"#,
            sanitize_for_prompt(hypothesis, MAX_PROMPT_HYPOTHESIS_LEN)
        )
    }

    pub fn critique_prompt(hypothesis: &str, context: &AssetContext, research: &ResearchBundle) -> String {
        format!(
            r#"You are a skeptical market analyst. Find the strongest evidence AGAINST this hypothesis.

HYPOTHESIS: {}
ASSET: {} ({}, {})

RESEARCH SUMMARY:
{}

List up to 3 contradictions. Respond with a JSON array:
[{{"quote": "specific evidence", "reason": "why it challenges the hypothesis", "source": "where it comes from", "strength": "strong | medium | weak"}}]

If you cannot produce JSON, write one contradiction per line as:
quote|reason|source|strength"#,
            sanitize_for_prompt(hypothesis, MAX_PROMPT_HYPOTHESIS_LEN),
            context.asset_name,
            context.primary_symbol,
            context.sector,
            research_digest(research),
        )
    }

    pub fn synthesis_prompt(hypothesis: &str, context: &AssetContext, research: &ResearchBundle) -> String {
        format!(
            r#"You are a market analyst. Find the strongest evidence SUPPORTING this hypothesis.

HYPOTHESIS: {}
ASSET: {} ({}, {})
DIRECTION: {}

RESEARCH SUMMARY:
{}

List up to 3 confirmations. Respond with a JSON array:
[{{"quote": "specific evidence", "reason": "why it supports the hypothesis", "source": "where it comes from", "strength": "strong | medium | weak"}}]

If you cannot produce JSON, write one confirmation per line as:
quote|reason|source|strength"#,
            sanitize_for_prompt(hypothesis, MAX_PROMPT_HYPOTHESIS_LEN),
            context.asset_name,
            context.primary_symbol,
            context.sector,
            context.direction.as_str(),
            research_digest(research),
        )
    }

    pub fn alert_prompt(hypothesis: &str, context: &AssetContext, confidence: f64) -> String {
        format!(
            r#"Suggest monitoring alerts for a trader holding this hypothesis.

HYPOTHESIS: {}
ASSET: {} ({})
CURRENT CONFIDENCE: {:.2}

List up to 5 alerts. Respond with a JSON array:
[{{"type": "recommendation | warning | trigger | risk_monitoring | entry_signal", "message": "what to watch and why", "priority": "high | medium | low"}}]

If you cannot produce JSON, write one alert per line as:
type|message|priority"#,
            sanitize_for_prompt(hypothesis, MAX_PROMPT_HYPOTHESIS_LEN),
            context.asset_name,
            context.primary_symbol,
            confidence,
        )
    }
}

fn research_digest(research: &ResearchBundle) -> String {
    sanitize_for_prompt(&research.summary, MAX_PROMPT_RESEARCH_LEN)
}
