//! Instrument symbol detection and news query selection

use lazy_static::lazy_static;
use regex::Regex;

pub const MAX_INSTRUMENTS: usize = 2;
pub const DEFAULT_EQUITY_SYMBOL: &str = "SPY";
pub const DEFAULT_CRYPTO_SYMBOL: &str = "BTC-USD";

/// Lowercase alias → symbol, checked as whole words
const ALIASES: &[(&str, &str)] = &[
    ("bitcoin", "BTC-USD"),
    ("btc", "BTC-USD"),
    ("ethereum", "ETH-USD"),
    ("eth", "ETH-USD"),
    ("apple", "AAPL"),
    ("tesla", "TSLA"),
    ("microsoft", "MSFT"),
    ("google", "GOOGL"),
    ("alphabet", "GOOGL"),
    ("amazon", "AMZN"),
    ("oil", "CL=F"),
    ("crude", "CL=F"),
    ("wti", "CL=F"),
    ("gold", "GC=F"),
];

/// Uppercase tokens that look like tickers but are not
const STOP_LIST: &[&str] = &[
    "USD", "CEO", "CFO", "ETF", "GDP", "IPO", "EPS", "AI", "Q1", "Q2", "Q3", "Q4", "FED", "SEC",
    "ATH", "YOY", "US", "USA", "EU", "UK", "THE", "AND", "FOR", "WILL", "BY", "TO", "OF", "IN",
    "ON", "AT", "IT", "IS", "CPI", "API", "PE", "EV",
];

lazy_static! {
    static ref WORD: Regex = Regex::new(r"[A-Za-z$][A-Za-z0-9]*")
        .expect("Failed to compile WORD regex - this is a bug in the hardcoded pattern");

    static ref CASHTAG: Regex = Regex::new(r"^\$([A-Z]{1,5})$")
        .expect("Failed to compile CASHTAG regex - this is a bug in the hardcoded pattern");

    static ref BARE_TICKER: Regex = Regex::new(r"^[A-Z]{2,5}$")
        .expect("Failed to compile BARE_TICKER regex - this is a bug in the hardcoded pattern");
}

/// Up to two symbols in order of first appearance, deduplicated.
/// Falls back to SPY, or BTC-USD when the text mentions crypto.
pub fn extract_instruments(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();

    for token in WORD.find_iter(text).map(|m| m.as_str()) {
        if found.len() >= MAX_INSTRUMENTS {
            break;
        }

        if let Some(symbol) = symbol_for_token(token) {
            if !found.iter().any(|s| s == &symbol) {
                found.push(symbol);
            }
        }
    }

    if found.is_empty() {
        let fallback = if mentions_crypto(text) {
            DEFAULT_CRYPTO_SYMBOL
        } else {
            DEFAULT_EQUITY_SYMBOL
        };
        found.push(fallback.to_string());
    }

    found
}

fn symbol_for_token(token: &str) -> Option<String> {
    if let Some(captures) = CASHTAG.captures(token) {
        return captures.get(1).map(|m| m.as_str().to_string());
    }

    let lower = token.to_lowercase();
    if let Some((_, symbol)) = ALIASES.iter().find(|(alias, _)| *alias == lower) {
        return Some(symbol.to_string());
    }

    if BARE_TICKER.is_match(token) && !STOP_LIST.contains(&token) {
        return Some(token.to_string());
    }

    None
}

fn mentions_crypto(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("crypto") || lower.contains("bitcoin")
}

/// News search query for the hypothesis
pub fn news_query_for(text: &str, instruments: &[String]) -> String {
    let lower = text.to_lowercase();

    if mentions_crypto(text) || instruments.iter().any(|s| s.ends_with("-USD")) {
        "cryptocurrency bitcoin market news".to_string()
    } else if lower.contains("oil") || instruments.iter().any(|s| s == "CL=F") {
        "oil price energy market".to_string()
    } else {
        format!("{} stock market news", instruments.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_resolve() {
        assert_eq!(extract_instruments("Bitcoin will hit 100k"), vec!["BTC-USD"]);
        assert_eq!(extract_instruments("Apple will beat Tesla"), vec!["AAPL", "TSLA"]);
        assert_eq!(extract_instruments("Crude oil rallies"), vec!["CL=F"]);
    }

    #[test]
    fn test_cashtag_and_bare_tickers() {
        assert_eq!(extract_instruments("$NVDA and AMD lead chips"), vec!["NVDA", "AMD"]);
    }

    #[test]
    fn test_stop_list_filtered() {
        assert_eq!(
            extract_instruments("The CEO said GDP and EPS in Q3 beat, NFLX up"),
            vec!["NFLX"]
        );
    }

    #[test]
    fn test_cap_of_two_in_order() {
        assert_eq!(
            extract_instruments("MSFT, then AAPL, then GOOGL, then AAPL again"),
            vec!["MSFT", "AAPL"]
        );
    }

    #[test]
    fn test_defaults() {
        assert_eq!(extract_instruments("markets will rise next year"), vec!["SPY"]);
        assert_eq!(extract_instruments("crypto will rebound"), vec!["BTC-USD"]);
    }

    #[test]
    fn test_news_queries() {
        assert_eq!(
            news_query_for("Bitcoin to 100k", &["BTC-USD".to_string()]),
            "cryptocurrency bitcoin market news"
        );
        assert_eq!(
            news_query_for("Oil demand rising", &["CL=F".to_string()]),
            "oil price energy market"
        );
        assert_eq!(
            news_query_for("Apple beats", &["AAPL".to_string()]),
            "AAPL stock market news"
        );
    }
}
