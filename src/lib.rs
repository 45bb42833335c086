// tradesage - trading hypothesis analysis
// Turns a free-form trading prediction into a confidence-scored record backed by
// confirmations, contradictions and monitoring alerts.

#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod cli;
pub mod config;
pub mod data;
pub mod db;
pub mod embeddings;
pub mod evidence;
pub mod extraction;
pub mod llm;
pub mod orchestrator;
pub mod research;
pub mod store;
pub mod vector;

// Re-export commonly used items
pub use config::Config;
pub use evidence::{AlertItem, EvidenceItem, HypothesisRecord};
pub use orchestrator::{AnalysisMode, AnalysisResponse, HypothesisPipeline};
