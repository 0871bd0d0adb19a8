//! Candidate evaluation shared by every selector.
//!
//! Epistemic foundation:
//! - K_i: Unrated is not the same as rated 0; unrated never reaches a selector
//! - K_i: Logprobs are looked up for the exact target model id
//! - B_i: Ratings and thresholds change interactively → recomputed per call

use super::Thresholds;
use crate::dataset::DatasetSource;
use crate::models::{Completion, Facet, LogprobSummary, Sample};

/// One completion with its rating and logprob gate status.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub completion: &'a Completion,
    /// `None` when the completion is unrated for the facet
    pub rating: Option<u8>,
    /// Summary for the target model, if one exists
    pub logprobs: Option<&'a LogprobSummary>,
    pub passes_gate: bool,
}

impl Candidate<'_> {
    pub fn id(&self) -> u64 {
        self.completion.id
    }
}

/// Evaluates completions of a sample for one (facet, target model) pair.
#[derive(Clone, Copy)]
pub struct CandidateEvaluator<'a> {
    dataset: &'a dyn DatasetSource,
    facet: &'a Facet,
    thresholds: Thresholds,
    target_model: Option<&'a str>,
}

impl<'a> CandidateEvaluator<'a> {
    pub fn new(
        dataset: &'a dyn DatasetSource,
        facet: &'a Facet,
        thresholds: Thresholds,
        target_model: Option<&'a str>,
    ) -> Self {
        Self {
            dataset,
            facet,
            thresholds,
            target_model,
        }
    }

    pub fn dataset(&self) -> &'a dyn DatasetSource {
        self.dataset
    }

    pub fn facet(&self) -> &'a Facet {
        self.facet
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn target_model(&self) -> Option<&'a str> {
        self.target_model
    }

    /// Whether a logprob summary clears both gate thresholds.
    pub fn passes_gate(&self, logprobs: Option<&LogprobSummary>) -> bool {
        logprobs.is_some_and(|lp| {
            lp.min_logprob >= self.thresholds.min_logprob
                && lp.avg_logprob >= self.thresholds.avg_logprob
        })
    }

    /// Evaluate every non-archived completion of `sample`, ascending by id.
    pub fn evaluate(&self, sample: &'a Sample) -> Vec<Candidate<'a>> {
        let mut candidates: Vec<Candidate<'a>> = self
            .dataset
            .completions(sample)
            .into_iter()
            .map(|completion| {
                let rating = self.dataset.rating(completion.id, self.facet.id);
                let logprobs = self
                    .target_model
                    .and_then(|model| self.dataset.logprobs(completion.id, model));
                Candidate {
                    completion,
                    rating,
                    logprobs,
                    passes_gate: self.passes_gate(logprobs),
                }
            })
            .collect();
        candidates.sort_by_key(|c| c.completion.id);
        candidates
    }

    /// Rated candidates only, paired with their rating.
    pub fn rated(&self, sample: &'a Sample) -> Vec<(Candidate<'a>, u8)> {
        self.evaluate(sample)
            .into_iter()
            .filter_map(|c| c.rating.map(|r| (c, r)))
            .collect()
    }

    /// Human-readable reasons a candidate fails the logprob gate.
    pub fn gate_diagnostics(&self, candidate: &Candidate<'_>) -> Vec<String> {
        let id = candidate.id();
        let Some(lp) = candidate.logprobs else {
            return vec![format!("  Completion {id}: No logprobs for target model")];
        };

        let mut lines = Vec::new();
        if lp.min_logprob < self.thresholds.min_logprob {
            lines.push(format!(
                "  Completion {id}: min_logprob {:.3} < {}",
                lp.min_logprob, self.thresholds.min_logprob
            ));
        }
        if lp.avg_logprob < self.thresholds.avg_logprob {
            lines.push(format!(
                "  Completion {id}: avg_logprob {:.3} < {}",
                lp.avg_logprob, self.thresholds.avg_logprob
            ));
        }
        lines
    }
}
