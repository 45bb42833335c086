//! Ordered parse strategies. Each returns a tagged outcome; the engine takes
//! the first strategy whose candidates survive sanitization.

use super::sanitize::{strip_list_marker, strip_markup};
use super::vocab::contains_any;
use super::{RawCandidate, TargetKind, TargetSpec};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

/// Heuristic segments must be longer than this to be considered
pub const MIN_SEGMENT_LEN: usize = 30;

lazy_static! {
    static ref FENCED_BLOCK: Regex = Regex::new(r"(?s)```([A-Za-z]*)[ \t]*\r?\n?(.*?)```")
        .expect("Failed to compile FENCED_BLOCK regex - this is a bug in the hardcoded pattern");
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Matched(Vec<RawCandidate>),
    Empty,
}

impl ParseOutcome {
    fn from_candidates(candidates: Vec<RawCandidate>) -> Self {
        if candidates.is_empty() {
            ParseOutcome::Empty
        } else {
            ParseOutcome::Matched(candidates)
        }
    }
}

pub trait ParseStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn parse(&self, text: &str, target: &TargetSpec) -> ParseOutcome;
}

/// The whole text is one JSON document
pub struct WholeDocumentJson;

/// JSON objects/arrays embedded in prose, found by a balanced bracket scan
pub struct EmbeddedJson;

/// ```json fenced blocks, or bare fences whose body looks like JSON
pub struct FencedJson;

/// `quote|reason|source|strength` or `type|message|priority` lines
pub struct PipeDelimited;

/// Lines containing a vocabulary keyword
pub struct KeywordHeuristic;

pub fn default_cascade() -> Vec<Box<dyn ParseStrategy>> {
    vec![
        Box::new(WholeDocumentJson),
        Box::new(EmbeddedJson),
        Box::new(FencedJson),
        Box::new(PipeDelimited),
        Box::new(KeywordHeuristic),
    ]
}

impl ParseStrategy for WholeDocumentJson {
    fn name(&self) -> &'static str {
        "json"
    }

    fn parse(&self, text: &str, target: &TargetSpec) -> ParseOutcome {
        match serde_json::from_str::<Value>(text.trim()) {
            Ok(value) => ParseOutcome::from_candidates(candidates_from_value(value, target)),
            Err(_) => ParseOutcome::Empty,
        }
    }
}

impl ParseStrategy for EmbeddedJson {
    fn name(&self) -> &'static str {
        "embedded_json"
    }

    fn parse(&self, text: &str, target: &TargetSpec) -> ParseOutcome {
        let bytes = text.as_bytes();
        let mut candidates = Vec::new();
        let mut index = 0;

        while index < bytes.len() {
            if matches!(bytes[index], b'{' | b'[') {
                if let Some(end) = matching_close(bytes, index) {
                    let fragment = &text[index..=end];
                    if let Ok(value) = serde_json::from_str::<Value>(fragment) {
                        let found = candidates_from_value(value, target);
                        if !found.is_empty() {
                            candidates.extend(found);
                            index = end + 1;
                            continue;
                        }
                    }
                }
            }
            index += 1;
        }

        ParseOutcome::from_candidates(candidates)
    }
}

impl ParseStrategy for FencedJson {
    fn name(&self) -> &'static str {
        "fenced_json"
    }

    fn parse(&self, text: &str, target: &TargetSpec) -> ParseOutcome {
        let mut candidates = Vec::new();

        for capture in FENCED_BLOCK.captures_iter(text) {
            let tag = capture.get(1).map(|m| m.as_str()).unwrap_or("");
            let body = capture.get(2).map(|m| m.as_str().trim()).unwrap_or("");

            let structured = tag.eq_ignore_ascii_case("json")
                || (tag.is_empty() && (body.starts_with('{') || body.starts_with('[')));
            if !structured {
                continue;
            }

            if let Ok(value) = serde_json::from_str::<Value>(body) {
                candidates.extend(candidates_from_value(value, target));
            }
        }

        ParseOutcome::from_candidates(candidates)
    }
}

impl ParseStrategy for PipeDelimited {
    fn name(&self) -> &'static str {
        "pipe_delimited"
    }

    fn parse(&self, text: &str, target: &TargetSpec) -> ParseOutcome {
        let columns = target.pipe_fields;
        let mut candidates = Vec::new();

        for line in text.lines() {
            let line = strip_list_marker(line);
            let row = line.trim().trim_matches('|');
            if !row.contains('|') {
                continue;
            }

            let fields: Vec<&str> = row.split('|').map(str::trim).collect();
            if fields.len() < columns.len() {
                continue;
            }

            // Markdown table separators and header rows
            if fields
                .iter()
                .all(|f| f.chars().all(|c| c == '-' || c == ':' || c.is_whitespace()))
            {
                continue;
            }
            if fields[0].eq_ignore_ascii_case(columns[0]) {
                continue;
            }

            let mut record = Map::new();
            for (name, value) in columns.iter().zip(fields.iter()) {
                record.insert(name.to_string(), Value::String(value.to_string()));
            }
            candidates.push(record);
        }

        ParseOutcome::from_candidates(candidates)
    }
}

impl ParseStrategy for KeywordHeuristic {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn parse(&self, text: &str, target: &TargetSpec) -> ParseOutcome {
        let candidates = text
            .lines()
            .map(|line| strip_markup(&strip_list_marker(line)).trim().to_string())
            .filter(|segment| segment.chars().count() > MIN_SEGMENT_LEN)
            .filter(|segment| contains_any(&segment.to_lowercase(), &target.keywords))
            .map(|segment| heuristic_candidate(&segment, target))
            .collect();

        ParseOutcome::from_candidates(candidates)
    }
}

fn heuristic_candidate(segment: &str, target: &TargetSpec) -> RawCandidate {
    let mut record = Map::new();
    match target.kind {
        TargetKind::Contradiction | TargetKind::Confirmation => {
            record.insert("quote".into(), Value::String(segment.to_string()));
            record.insert("reason".into(), Value::String(target.kind.default_reason().into()));
            record.insert("source".into(), Value::String(HEURISTIC_SOURCE.into()));
            record.insert("strength".into(), Value::String("Medium".into()));
        }
        TargetKind::Alert => {
            record.insert("type".into(), Value::String(infer_alert_type(segment).into()));
            record.insert("message".into(), Value::String(segment.to_string()));
            record.insert("priority".into(), Value::String("medium".into()));
        }
    }
    record
}

pub const HEURISTIC_SOURCE: &str = "Agent Analysis";

fn infer_alert_type(segment: &str) -> &'static str {
    let lower = segment.to_lowercase();
    if lower.contains("stop") || lower.contains("risk") {
        "risk_monitoring"
    } else if lower.contains("entry") {
        "entry_signal"
    } else if lower.contains("warning") || lower.contains("caution") {
        "warning"
    } else if lower.contains("trigger") || lower.contains("breaks") || lower.contains("crosses") {
        "trigger"
    } else {
        "recommendation"
    }
}

/// Turn a parsed JSON value into candidates that carry the target's required keys.
/// Accepts a single object, an array of objects, or an object wrapping such an array.
fn candidates_from_value(value: Value, target: &TargetSpec) -> Vec<RawCandidate> {
    match value {
        Value::Object(map) if target.accepts(&map) => vec![map],
        Value::Object(map) => map
            .into_iter()
            .filter_map(|(_, inner)| match inner {
                Value::Array(items) => Some(items),
                _ => None,
            })
            .flatten()
            .filter_map(|item| object_with_required(item, target))
            .collect(),
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| object_with_required(item, target))
            .collect(),
        _ => Vec::new(),
    }
}

fn object_with_required(value: Value, target: &TargetSpec) -> Option<RawCandidate> {
    match value {
        Value::Object(map) if target.accepts(&map) => Some(map),
        _ => None,
    }
}

/// First JSON object in the text: the whole text, a fenced block, or the
/// first balanced `{...}` fragment that parses.
pub fn find_json_object(text: &str) -> Option<Map<String, Value>> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text.trim()) {
        return Some(map);
    }

    for capture in FENCED_BLOCK.captures_iter(text) {
        let body = capture.get(2).map(|m| m.as_str().trim()).unwrap_or("");
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
            return Some(map);
        }
    }

    let bytes = text.as_bytes();
    for (index, &byte) in bytes.iter().enumerate() {
        if byte != b'{' {
            continue;
        }
        if let Some(end) = matching_close(bytes, index) {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&text[index..=end]) {
                return Some(map);
            }
        }
    }

    None
}

/// Index of the bracket closing the one at `start`, honouring JSON strings
fn matching_close(bytes: &[u8], start: usize) -> Option<usize> {
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.pop() != Some(byte) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::vocab::KeywordTable;

    fn contradiction_target() -> TargetSpec {
        TargetSpec::for_kind(TargetKind::Contradiction, &KeywordTable::default())
    }

    fn alert_target() -> TargetSpec {
        TargetSpec::for_kind(TargetKind::Alert, &KeywordTable::default())
    }

    fn quotes(outcome: ParseOutcome) -> Vec<String> {
        match outcome {
            ParseOutcome::Matched(records) => records
                .iter()
                .filter_map(|r| r.get("quote").and_then(|v| v.as_str()).map(str::to_string))
                .collect(),
            ParseOutcome::Empty => Vec::new(),
        }
    }

    #[test]
    fn test_whole_document_array() {
        let text = r#"[{"quote": "Margins are compressing", "reason": "r"}, {"reason": "no quote"}]"#;
        let outcome = WholeDocumentJson.parse(text, &contradiction_target());
        assert_eq!(quotes(outcome), vec!["Margins are compressing"]);
    }

    #[test]
    fn test_whole_document_wrapper_object() {
        let text = r#"{"contradictions": [{"quote": "Regulators are circling", "strength": "High"}]}"#;
        let outcome = WholeDocumentJson.parse(text, &contradiction_target());
        assert_eq!(quotes(outcome), vec!["Regulators are circling"]);
    }

    #[test]
    fn test_whole_document_rejects_prose() {
        assert_eq!(
            WholeDocumentJson.parse("Not JSON at all", &contradiction_target()),
            ParseOutcome::Empty
        );
    }

    #[test]
    fn test_embedded_json_in_prose() {
        let text = r#"Here are my findings [see notes]:
{"quote": "Supply chain {delays} persist", "reason": "x"} and also
{"quote": "Demand is softening in China", "reason": "y"}. Done."#;
        let outcome = EmbeddedJson.parse(text, &contradiction_target());
        assert_eq!(
            quotes(outcome),
            vec!["Supply chain {delays} persist", "Demand is softening in China"]
        );
    }

    #[test]
    fn test_embedded_json_finds_objects_inside_broken_array() {
        let text = r#"[ {"quote": "Valuation looks stretched"}, oops ]"#;
        let outcome = EmbeddedJson.parse(text, &contradiction_target());
        assert_eq!(quotes(outcome), vec!["Valuation looks stretched"]);
    }

    #[test]
    fn test_fenced_json_block() {
        let text = "Result:\n```json\n[{\"quote\": \"Cloud growth is decelerating\"}]\n```";
        let outcome = FencedJson.parse(text, &contradiction_target());
        assert_eq!(quotes(outcome), vec!["Cloud growth is decelerating"]);
    }

    #[test]
    fn test_fenced_non_json_ignored() {
        let text = "```python\nprint('hi')\n```";
        assert_eq!(FencedJson.parse(text, &contradiction_target()), ParseOutcome::Empty);
    }

    #[test]
    fn test_pipe_delimited_evidence() {
        let text = "quote|reason|source|strength\n\
                    Rising rates squeeze multiples|Higher discount rates|Fed minutes|High\n\
                    just a sentence without pipes";
        match PipeDelimited.parse(text, &contradiction_target()) {
            ParseOutcome::Matched(records) => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0]["quote"], "Rising rates squeeze multiples");
                assert_eq!(records[0]["source"], "Fed minutes");
                assert_eq!(records[0]["strength"], "High");
            }
            ParseOutcome::Empty => panic!("expected pipe rows"),
        }
    }

    #[test]
    fn test_pipe_delimited_alert_table() {
        let text = "| type | message | priority |\n|---|---|---|\n| warning | Earnings on Thursday could gap the price | high |";
        match PipeDelimited.parse(text, &alert_target()) {
            ParseOutcome::Matched(records) => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0]["type"], "warning");
                assert_eq!(records[0]["priority"], "high");
            }
            ParseOutcome::Empty => panic!("expected alert row"),
        }
    }

    #[test]
    fn test_heuristic_risk_lines() {
        let text = "Overview of the situation.\n\
                    - Regulatory risk in the EU could slow services revenue growth\n\
                    2. Competition from Android devices remains a serious concern\n\
                    Short risk line\n\
                    Apple reported results in line with analyst expectations.";
        let found = quotes(KeywordHeuristic.parse(text, &contradiction_target()));
        assert_eq!(
            found,
            vec![
                "Regulatory risk in the EU could slow services revenue growth",
                "Competition from Android devices remains a serious concern",
            ]
        );
    }

    #[test]
    fn test_find_json_object_in_prose() {
        let text = "Sure! Here is the context:\n{\"asset_info\": {\"primary_symbol\": \"NVDA\"}}\nThanks.";
        let map = find_json_object(text).unwrap();
        assert_eq!(map["asset_info"]["primary_symbol"], "NVDA");
        assert!(find_json_object("no structure here").is_none());
    }

    #[test]
    fn test_heuristic_alert_type_inference() {
        let text = "Set a stop-loss below the 50-day moving average at $180";
        match KeywordHeuristic.parse(text, &alert_target()) {
            ParseOutcome::Matched(records) => {
                assert_eq!(records[0]["type"], "risk_monitoring");
            }
            ParseOutcome::Empty => panic!("expected heuristic alert"),
        }
    }
}
