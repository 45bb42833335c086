//! Hypothesis input validation and cleanup of generated restatements

use crate::extraction::sanitize::{collapse_whitespace, strip_markup, truncate_at_word_boundary};
use lazy_static::lazy_static;
use regex::Regex;

pub const MAX_TITLE_LEN: usize = 500;
/// Short statements containing "will" are kept as-is
const CLEAN_INPUT_MAX_WORDS: usize = 15;

const PREAMBLES: &[&str] = &[
    "here's the processed hypothesis:",
    "here is the processed hypothesis:",
    "processed hypothesis:",
    "here's the refined hypothesis:",
    "here is the refined hypothesis:",
    "refined hypothesis:",
    "here's the hypothesis:",
    "hypothesis:",
];

lazy_static! {
    static ref SENTENCE_END: Regex = Regex::new(r"[.!?](?:\s|$)")
        .expect("Failed to compile SENTENCE_END regex - this is a bug in the hardcoded pattern");
}

/// Reason the raw input cannot be analysed at all
pub fn validate_input(raw: &str) -> Result<(), String> {
    if raw.trim().is_empty() {
        return Err("Hypothesis text is empty".to_string());
    }
    if !raw.chars().any(char::is_alphanumeric) {
        return Err("Hypothesis text contains no alphanumeric characters".to_string());
    }
    Ok(())
}

/// Turn a generated (or raw) restatement into a single-sentence title
pub fn clean_hypothesis_title(text: &str) -> String {
    let text = collapse_whitespace(&strip_markup(text));
    let text = strip_preamble(&text);
    let text = text
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '“' || c == '”' || c.is_whitespace())
        .to_string();

    let word_count = text.split_whitespace().count();
    if word_count < CLEAN_INPUT_MAX_WORDS && text.to_lowercase().contains("will") {
        return truncate_at_word_boundary(&text, MAX_TITLE_LEN);
    }

    let first_sentence = match SENTENCE_END.find(&text) {
        Some(end) => text[..end.start() + 1].to_string(),
        None => text,
    };

    truncate_at_word_boundary(first_sentence.trim(), MAX_TITLE_LEN)
}

/// The raw input as a title, used when no restatement is available
pub fn raw_title(raw: &str) -> String {
    truncate_at_word_boundary(&collapse_whitespace(raw), MAX_TITLE_LEN)
}

fn strip_preamble(text: &str) -> &str {
    for preamble in PREAMBLES {
        let matches = text
            .get(..preamble.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(preamble));
        if matches {
            return text[preamble.len()..].trim_start();
        }
    }
    text
}
