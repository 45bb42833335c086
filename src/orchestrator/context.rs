//! Asset context derived from the hypothesis text, optionally enriched by a
//! structured generation response.

use crate::data::validation::validate_symbol;
use crate::evidence::Direction;
use crate::extraction::sanitize::clean_field;
use crate::research::extract_instruments;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const MAX_CONTEXT_FIELD_LEN: usize = 100;
pub const FALLBACK_ASSET_NAME: &str = "the asset";

struct KnownAsset {
    aliases: &'static [&'static str],
    symbol: &'static str,
    name: &'static str,
    asset_type: &'static str,
    sector: &'static str,
}

const KNOWN_ASSETS: &[KnownAsset] = &[
    KnownAsset { aliases: &["apple", "aapl"], symbol: "AAPL", name: "Apple Inc.", asset_type: "stock", sector: "Technology" },
    KnownAsset { aliases: &["tesla", "tsla"], symbol: "TSLA", name: "Tesla Inc.", asset_type: "stock", sector: "Automotive" },
    KnownAsset { aliases: &["bitcoin", "btc"], symbol: "BTC-USD", name: "Bitcoin", asset_type: "cryptocurrency", sector: "Cryptocurrency" },
    KnownAsset { aliases: &["ethereum", "eth"], symbol: "ETH-USD", name: "Ethereum", asset_type: "cryptocurrency", sector: "Cryptocurrency" },
    KnownAsset { aliases: &["microsoft", "msft"], symbol: "MSFT", name: "Microsoft Corporation", asset_type: "stock", sector: "Technology" },
    KnownAsset { aliases: &["google", "alphabet", "googl"], symbol: "GOOGL", name: "Alphabet Inc.", asset_type: "stock", sector: "Technology" },
    KnownAsset { aliases: &["amazon", "amzn"], symbol: "AMZN", name: "Amazon.com Inc.", asset_type: "stock", sector: "Consumer Discretionary" },
    KnownAsset { aliases: &["oil", "crude", "wti"], symbol: "CL=F", name: "Crude Oil", asset_type: "commodity", sector: "Energy" },
    KnownAsset { aliases: &["gold"], symbol: "GC=F", name: "Gold", asset_type: "commodity", sector: "Precious Metals" },
];

const BULLISH_WORDS: &[&str] = &[
    "bullish", "bull", "rise", "rises", "rally", "rallies", "increase", "grow", "grows", "reach",
    "reaches", "hit", "hits", "climb", "surge", "above", "appreciate", "outperform", "gain", "up",
    "exceed", "break out", "higher",
];

const BEARISH_WORDS: &[&str] = &[
    "bearish", "bear", "fall", "falls", "drop", "drops", "decline", "decrease", "crash", "below",
    "down", "underperform", "lose", "plunge", "sink", "lower", "collapse",
];

lazy_static! {
    static ref WORD: Regex = Regex::new(r"[A-Za-z][A-Za-z'-]*")
        .expect("Failed to compile WORD regex - this is a bug in the hardcoded pattern");

    static ref DOLLAR_TARGET: Regex = Regex::new(r"\$\s?(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)\s*([kK])?\b")
        .expect("Failed to compile DOLLAR_TARGET regex - this is a bug in the hardcoded pattern");

    static ref VERB_TARGET: Regex = Regex::new(
        r"(?i)\b(?:reach|reaches|hit|hits|to|above|below|target(?:\s+of)?)\s+(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)\s*([kK])?\b"
    ).expect("Failed to compile VERB_TARGET regex - this is a bug in the hardcoded pattern");

    static ref TIMEFRAME: Regex = Regex::new(
        r"(?i)\b(?:Q[1-4]\s*'?\d{2,4}|(?:by|before|in|within)\s+(?:the\s+)?(?:end\s+of\s+)?(?:\d{4}|next\s+(?:year|quarter|month|week)|\d+\s+(?:days?|weeks?|months?|years?))|end\s+of\s+(?:the\s+)?year|year[- ]end)\b"
    ).expect("Failed to compile TIMEFRAME regex - this is a bug in the hardcoded pattern");
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetContext {
    pub primary_symbol: String,
    pub asset_name: String,
    pub asset_type: String,
    pub sector: String,
    pub direction: Direction,
    pub price_target: Option<f64>,
    pub timeframe: Option<String>,
    /// False when no asset was recognised and defaults are in use
    pub recognized: bool,
}

impl AssetContext {
    pub fn fallback() -> Self {
        Self {
            primary_symbol: "SPY".to_string(),
            asset_name: FALLBACK_ASSET_NAME.to_string(),
            asset_type: "equity".to_string(),
            sector: "Broad Market".to_string(),
            direction: Direction::Neutral,
            price_target: None,
            timeframe: None,
            recognized: false,
        }
    }

    /// Deterministic context from text rules alone
    pub fn from_text(text: &str) -> Self {
        let mut context = Self::fallback();

        if let Some(asset) = first_known_asset(text) {
            context.primary_symbol = asset.symbol.to_string();
            context.asset_name = asset.name.to_string();
            context.asset_type = asset.asset_type.to_string();
            context.sector = asset.sector.to_string();
            context.recognized = true;
        } else {
            let instruments = extract_instruments(text);
            // extract_instruments falls back to SPY/BTC-USD; only accept real mentions
            if let Some(symbol) = instruments.into_iter().find(|s| text.contains(s.as_str())) {
                context.primary_symbol = symbol.clone();
                context.asset_name = symbol;
                context.asset_type = "stock".to_string();
                context.sector = "Unknown".to_string();
                context.recognized = true;
            }
        }

        context.direction = detect_direction(text);
        context.price_target = detect_price_target(text);
        context.timeframe = TIMEFRAME.find(text).map(|m| m.as_str().trim().to_string());
        context
    }

    /// Fill asset fields from a structured generation response. Rule-derived
    /// values win; the response only fills what the rules could not.
    pub fn apply_json(&mut self, value: &Map<String, Value>) {
        let asset_info = value
            .get("asset_info")
            .and_then(Value::as_object)
            .unwrap_or(value);
        let details = value
            .get("hypothesis_details")
            .and_then(Value::as_object)
            .unwrap_or(value);

        let rules_found = self.recognized;

        if !rules_found {
            if let Some(symbol) = text_field(asset_info, "primary_symbol")
                .map(|s| s.to_uppercase())
                .filter(|s| validate_symbol(s).is_ok())
            {
                self.primary_symbol = symbol;
                self.recognized = true;
                if let Some(name) = text_field(asset_info, "asset_name") {
                    self.asset_name = name;
                }
                if let Some(asset_type) = text_field(asset_info, "asset_type") {
                    self.asset_type = asset_type.to_lowercase();
                }
            }
        }

        if !rules_found || self.sector == "Unknown" {
            if let Some(sector) = text_field(asset_info, "sector") {
                self.sector = sector;
            }
        }

        if self.timeframe.is_none() {
            self.timeframe = text_field(details, "timeframe");
        }
    }

    /// Lowercase name/symbol terms used to tag asset-specific evidence
    pub fn asset_terms(&self) -> Vec<String> {
        if !self.recognized {
            return Vec::new();
        }

        let mut terms = vec![self.primary_symbol.to_lowercase()];
        let name = self.asset_name.to_lowercase();
        if let Some(first_word) = name.split_whitespace().next() {
            let first_word = first_word.trim_end_matches(|c: char| !c.is_alphanumeric());
            if first_word.len() >= 3 {
                terms.push(first_word.to_string());
            }
        }
        if let Some(base) = self.primary_symbol.strip_suffix("-USD") {
            terms.push(base.to_lowercase());
        }
        terms.sort();
        terms.dedup();
        terms
    }

    pub fn mentions(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.asset_terms().iter().any(|term| lower.contains(term.as_str()))
    }

    /// Name used in prompts and default evidence
    pub fn display_name(&self) -> &str {
        &self.asset_name
    }
}

fn text_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(|s| clean_field(s, MAX_CONTEXT_FIELD_LEN))
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("unknown") && !s.eq_ignore_ascii_case("n/a"))
}

fn first_known_asset(text: &str) -> Option<&'static KnownAsset> {
    WORD.find_iter(text).find_map(|word| {
        let lower = word.as_str().to_lowercase();
        KNOWN_ASSETS
            .iter()
            .find(|asset| asset.aliases.contains(&lower.as_str()))
    })
}

/// Whole-word vote between bullish and bearish vocabularies
pub fn detect_direction(text: &str) -> Direction {
    let lower = text.to_lowercase();
    let words: Vec<&str> = WORD.find_iter(&lower).map(|m| m.as_str()).collect();

    let count = |vocab: &[&str]| {
        vocab
            .iter()
            .filter(|term| {
                if term.contains(' ') {
                    lower.contains(*term)
                } else {
                    words.contains(term)
                }
            })
            .count()
    };

    let bullish = count(BULLISH_WORDS);
    let bearish = count(BEARISH_WORDS);

    match bullish.cmp(&bearish) {
        std::cmp::Ordering::Greater => Direction::Bullish,
        std::cmp::Ordering::Less => Direction::Bearish,
        std::cmp::Ordering::Equal => Direction::Neutral,
    }
}

/// `$220`, `$1,200.50`, `$100k`, or a bare number after reach/hit/to/target
pub fn detect_price_target(text: &str) -> Option<f64> {
    let captures = DOLLAR_TARGET
        .captures(text)
        .or_else(|| VERB_TARGET.captures(text))?;

    let number: f64 = captures.get(1)?.as_str().replace(',', "").parse().ok()?;
    let multiplier = if captures.get(2).is_some() { 1_000.0 } else { 1.0 };

    Some(number * multiplier)
}
