//! Dataset entities consumed by the engine.
//!
//! K_i: These are already-materialized rows. The engine never writes them back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type FacetId = u64;
pub type SampleId = u64;
pub type CompletionId = u64;

/// Highest rating a completion can receive.
pub const MAX_RATING: u8 = 10;

/// Named evaluation dimension with its own default thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Facet {
    pub id: FacetId,

    /// Unique facet name
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Lowest rating counted as "good" (SFT/DPO chosen, KTO good)
    #[serde(default = "default_min_rating")]
    pub min_rating: u8,

    /// Highest rating counted as "bad" by KTO
    #[serde(default = "default_max_rating")]
    pub max_rating: u8,

    /// Minimum per-token logprob a completion must reach
    #[serde(default = "default_min_logprob_threshold")]
    pub min_logprob_threshold: f64,

    /// Minimum mean per-token logprob a completion must reach
    #[serde(default = "default_avg_logprob_threshold")]
    pub avg_logprob_threshold: f64,
}

fn default_min_rating() -> u8 {
    7
}

fn default_max_rating() -> u8 {
    5
}

fn default_min_logprob_threshold() -> f64 {
    -1.0
}

fn default_avg_logprob_threshold() -> f64 {
    -0.4
}

impl Facet {
    /// Create a facet with default thresholds.
    pub fn new(id: FacetId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            min_rating: default_min_rating(),
            max_rating: default_max_rating(),
            min_logprob_threshold: default_min_logprob_threshold(),
            avg_logprob_threshold: default_avg_logprob_threshold(),
        }
    }
}

/// A prompt together with its candidate completions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub id: SampleId,

    #[serde(default)]
    pub title: String,

    /// Slash-separated group the sample is filed under
    #[serde(default)]
    pub group_path: String,

    /// Prompt text of the sample's prompt revision
    pub prompt: String,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub completions: Vec<Completion>,
}

/// Candidate response to a sample's prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub id: CompletionId,

    /// Model that produced the text
    pub model_id: String,

    pub text: String,

    #[serde(default)]
    pub is_truncated: bool,

    #[serde(default)]
    pub is_archived: bool,
}

/// Human rating of one completion along one facet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Rating {
    pub completion_id: CompletionId,
    pub facet_id: FacetId,
    pub rating: u8,
}

/// Per-model token log-probability summary of a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogprobSummary {
    pub completion_id: CompletionId,

    /// Model the logprobs were computed with (may differ from the author model)
    pub model_id: String,

    pub min_logprob: f64,
    pub avg_logprob: f64,
}

impl LogprobSummary {
    /// Fallback ranking score: `min_logprob + 2 * avg_logprob`.
    pub fn scored_logprob(&self) -> f64 {
        self.min_logprob + 2.0 * self.avg_logprob
    }
}

/// Explicit, facet-scoped assertion that `better` beats `worse`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PairwiseRanking {
    pub better_completion_id: CompletionId,
    pub worse_completion_id: CompletionId,
    pub facet_id: FacetId,
}
