//! Dataset access for the engine.
//!
//! Provides:
//! - `DatasetSource`: the read-only queries the engine consumes
//! - `DatasetSnapshot`: an in-memory source loaded from a JSON document

mod snapshot;

pub use snapshot::*;

use crate::models::{Completion, CompletionId, Facet, FacetId, LogprobSummary, Sample};

/// Read-only view of a curated dataset.
///
/// K_i: One export call holds exclusive read access for its duration.
/// Implementations never hand out archived completions.
pub trait DatasetSource {
    /// Look up a facet by its unique name.
    fn facet_by_name(&self, name: &str) -> Option<&Facet>;

    /// Samples with at least one completion rated for `facet`, oldest first.
    fn samples_for_facet(&self, facet: &Facet) -> Vec<&Sample>;

    /// Non-archived completions of a sample's prompt revision.
    fn completions<'a>(&'a self, sample: &'a Sample) -> Vec<&'a Completion>;

    /// Rating of a completion along a facet; `None` means unrated.
    fn rating(&self, completion: CompletionId, facet: FacetId) -> Option<u8>;

    /// Logprob summary computed with exactly `model_id`.
    fn logprobs(&self, completion: CompletionId, model_id: &str) -> Option<&LogprobSummary>;

    /// Whether a ranking says `better` beats `worse` for `facet`.
    fn has_pairwise_ranking(&self, better: CompletionId, worse: CompletionId, facet: FacetId)
    -> bool;
}
