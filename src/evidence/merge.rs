//! Merge candidate lists from several origins, drop near-duplicates and rank.

use super::{AlertItem, EvidenceItem, MAX_ALERT_ITEMS, MAX_EVIDENCE_ITEMS};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

pub const DEFAULT_JACCARD_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Two candidates with word-set Jaccard above this are duplicates
    pub jaccard_threshold: f64,
    pub evidence_cap: usize,
    pub alert_cap: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            jaccard_threshold: DEFAULT_JACCARD_THRESHOLD,
            evidence_cap: MAX_EVIDENCE_ITEMS,
            alert_cap: MAX_ALERT_ITEMS,
        }
    }
}

/// Something that can be deduplicated by text and ranked
pub trait Rankable {
    fn dedup_text(&self) -> &str;
    fn rank_score(&self) -> f64;
}

impl Rankable for EvidenceItem {
    fn dedup_text(&self) -> &str {
        &self.quote
    }

    fn rank_score(&self) -> f64 {
        self.priority()
    }
}

impl Rankable for AlertItem {
    fn dedup_text(&self) -> &str {
        &self.message
    }

    fn rank_score(&self) -> f64 {
        self.rank()
    }
}

/// Lowercased word set split on non-alphanumeric characters
pub fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of two word sets. Two empty sets score 0.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }

    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;

    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Concatenate candidate lists in order, collapse duplicates keeping the
/// higher-ranked entry (earlier wins ties), stable-sort by rank and cap.
pub fn merge_ranked<T: Rankable>(lists: Vec<Vec<T>>, threshold: f64, cap: usize) -> Vec<T> {
    let mut kept: Vec<(T, HashSet<String>)> = Vec::new();

    for candidate in lists.into_iter().flatten() {
        let tokens = tokenize(candidate.dedup_text());
        let duplicate_of = kept
            .iter()
            .position(|(_, existing)| jaccard(&tokens, existing) > threshold);

        match duplicate_of {
            Some(index) => {
                if candidate.rank_score() > kept[index].0.rank_score() {
                    debug!(index, "Replacing duplicate with higher priority candidate");
                    kept[index] = (candidate, tokens);
                    collapse_around(&mut kept, index, threshold);
                }
            }
            None => kept.push((candidate, tokens)),
        }
    }

    let mut ranked: Vec<T> = kept.into_iter().map(|(item, _)| item).collect();
    ranked.sort_by(|a, b| b.rank_score().total_cmp(&a.rank_score()));
    ranked.truncate(cap);
    ranked
}

/// A replacement can overlap survivors its predecessor did not. Resolve those
/// pairs the same way: higher rank stays, the older survivor wins ties.
fn collapse_around<T: Rankable>(kept: &mut Vec<(T, HashSet<String>)>, mut index: usize, threshold: f64) {
    loop {
        let overlap = kept
            .iter()
            .enumerate()
            .position(|(i, (_, existing))| i != index && jaccard(&kept[index].1, existing) > threshold);
        let Some(other) = overlap else {
            break;
        };

        if kept[other].0.rank_score() >= kept[index].0.rank_score() {
            kept.remove(index);
            index = if other > index { other - 1 } else { other };
        } else {
            kept.remove(other);
            if other < index {
                index -= 1;
            }
        }
    }
}

pub fn merge_evidence(lists: Vec<Vec<EvidenceItem>>, config: &MergeConfig) -> Vec<EvidenceItem> {
    merge_ranked(lists, config.jaccard_threshold, config.evidence_cap)
}

pub fn merge_alerts(lists: Vec<Vec<AlertItem>>, config: &MergeConfig) -> Vec<AlertItem> {
    merge_ranked(lists, config.jaccard_threshold, config.alert_cap)
}
