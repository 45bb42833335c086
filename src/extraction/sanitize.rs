//! Field sanitization for extracted candidates and prompt inputs
//!
//! Generated text arrives with markdown, links and stray formatting. Every
//! field stored on an evidence or alert record goes through `clean_field`,
//! and external text placed into prompts goes through `sanitize_for_prompt`.

use lazy_static::lazy_static;
use regex::Regex;

const ELLIPSIS: &str = "...";

/// Minimum length of a candidate's primary field after cleaning
pub const MIN_PRIMARY_LEN: usize = 20;

/// Maximum share of punctuation characters before a field is considered garbage
pub const MAX_PUNCTUATION_RATIO: f64 = 0.3;

lazy_static! {
    static ref MARKDOWN_LINK: Regex = Regex::new(r"\[([^\]]+)\]\([^)]*\)")
        .expect("Failed to compile MARKDOWN_LINK regex - this is a bug in the hardcoded pattern");

    static ref URL: Regex = Regex::new(r"(?i)\b(?:https?://|www\.)\S+")
        .expect("Failed to compile URL regex - this is a bug in the hardcoded pattern");

    /// Broader than `URL`: also bare domains with a path
    static ref RAW_URL: Regex = Regex::new(
        r"(?i)(?:https?://|www\.|\b[a-z0-9-]+\.(?:com|net|org|io|co)/)"
    ).expect("Failed to compile RAW_URL regex - this is a bug in the hardcoded pattern");

    static ref CODE_FENCE: Regex = Regex::new(r"(?s)```[a-zA-Z]*")
        .expect("Failed to compile CODE_FENCE regex - this is a bug in the hardcoded pattern");

    static ref INLINE_CODE: Regex = Regex::new(r"`([^`]*)`")
        .expect("Failed to compile INLINE_CODE regex - this is a bug in the hardcoded pattern");

    static ref EMPHASIS: Regex = Regex::new(r"(\*{1,3}|__)([^*_]+?)(\*{1,3}|__)")
        .expect("Failed to compile EMPHASIS regex - this is a bug in the hardcoded pattern");

    static ref HEADER: Regex = Regex::new(r"(?m)^\s*#{1,6}\s*")
        .expect("Failed to compile HEADER regex - this is a bug in the hardcoded pattern");

    static ref LIST_MARKER: Regex = Regex::new(r"^\s*(?:[-*+•]|\d{1,2}[.)])\s+")
        .expect("Failed to compile LIST_MARKER regex - this is a bug in the hardcoded pattern");

    /// LLM instruction keywords that must not leak into prompts
    static ref INJECTION_PATTERNS: Regex = Regex::new(
        r"(?i)(ignore\s+previous|system:|assistant:|user:|<\|.*?\|>|```|human:|forget\s+all|disregard|new\s+instructions?)"
    ).expect("Failed to compile INJECTION_PATTERNS regex - this is a bug in the hardcoded pattern");

    static ref EXCESSIVE_SPECIAL_CHARS: Regex = Regex::new(r"[{}\[\]<>]{5,}")
        .expect("Failed to compile EXCESSIVE_SPECIAL_CHARS regex - this is a bug in the hardcoded pattern");
}

/// Clean one field: strip markup, URLs and control characters, collapse
/// whitespace, then bound to `max_len` characters.
pub fn clean_field(input: &str, max_len: usize) -> String {
    let text = strip_markup(input);
    let text = URL.replace_all(&text, "");
    let text: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let text = collapse_whitespace(&text);
    let text = text.trim_matches(|c: char| c == '"' || c == '\'' || c.is_whitespace());

    truncate_at_word_boundary(text, max_len)
}

/// Remove markdown links, emphasis, code and headers, keeping the inner text
pub fn strip_markup(input: &str) -> String {
    let text = MARKDOWN_LINK.replace_all(input, "$1");
    let text = CODE_FENCE.replace_all(&text, "");
    let text = INLINE_CODE.replace_all(&text, "$1");
    let text = EMPHASIS.replace_all(&text, "$2");
    let text = HEADER.replace_all(&text, "");
    text.replace("**", "")
}

/// Strip a leading bullet or number marker from one line
pub fn strip_list_marker(line: &str) -> String {
    LIST_MARKER.replace(line, "").trim().to_string()
}

pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Bound text to `max_len` characters. Cuts at `max_len - 3`, backs up to the
/// last space when that space lies beyond 80% of the limit, then appends "...".
pub fn truncate_at_word_boundary(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }

    let cut = max_len.saturating_sub(ELLIPSIS.len());
    let mut truncated: String = text.chars().take(cut).collect();

    if let Some(pos) = truncated.rfind(' ') {
        let space_index = truncated[..pos].chars().count();
        if space_index as f64 > max_len as f64 * 0.8 {
            truncated.truncate(pos);
        }
    }

    let mut out = truncated.trim_end().to_string();
    out.push_str(ELLIPSIS);
    out
}

pub fn contains_url(text: &str) -> bool {
    RAW_URL.is_match(text)
}

/// True when more than 30% of the characters are punctuation or symbols
pub fn is_garbage(text: &str) -> bool {
    let total = text.chars().count();
    if total == 0 {
        return true;
    }

    let punctuation = text
        .chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
        .count();

    punctuation as f64 / total as f64 > MAX_PUNCTUATION_RATIO
}

/// Reject reason for a cleaned primary field, if any
pub fn rejection_reason(primary: &str) -> Option<&'static str> {
    if primary.chars().count() < MIN_PRIMARY_LEN {
        Some("too short")
    } else if contains_url(primary) {
        Some("contains url")
    } else if is_garbage(primary) {
        Some("mostly punctuation")
    } else {
        None
    }
}

/// Sanitize external text (news headlines, tool output) before it is placed
/// into a generation prompt.
pub fn sanitize_for_prompt(input: &str, max_length: usize) -> String {
    let sanitized = INJECTION_PATTERNS.replace_all(input, "[filtered]");
    let sanitized = EXCESSIVE_SPECIAL_CHARS.replace_all(&sanitized, "[chars]");
    let sanitized = collapse_whitespace(&sanitized);

    truncate_at_word_boundary(&sanitized, max_length)
}

pub fn sanitize_headline(headline: &str) -> String {
    sanitize_for_prompt(headline, 200)
}
