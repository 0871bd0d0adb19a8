//! DPO (Direct Preference Optimization) pair generation.
//!
//! Pairing rules:
//! - "Chosen" must be rated at or above the facet floor. Low-rated
//!   completions are never paired together.
//! - For every chosen C, the rejected pool is every rated completion of the
//!   same sample with a strictly lower rating than C.
//! - Pool members passing the logprob gate are all paired with C (strict).
//!   When none pass, the single pool member with the best scored logprob is
//!   used instead (fallback).
//! - Explicit pairwise rankings are checked against the rating direction.
//!   A contradiction is reported, the pair is kept as the ratings say.
//!
//! K_i: One chosen completion may yield many pairs, and a completion may be
//! chosen in one pair and rejected in another.

use super::sft::{rating_floor_failure, NO_RATED_COMPLETIONS};
use super::{Candidate, CandidateEvaluator};
use crate::models::{Conversation, DpoPair, Sample};
use tracing::{debug, warn};

pub const NO_LOGPROBS_IN_POOL: &str = "No lower-rated completion has logprobs data";

/// Result of pairing one sample.
#[derive(Debug, Clone, Default)]
pub struct DpoOutcome {
    pub pairs: Vec<DpoPair>,
    /// Set only when the sample produced no pairs at all
    pub failure_reasons: Vec<String>,
    /// Per-candidate misses on a sample that still produced pairs
    pub diagnostics: Vec<String>,
    /// Pairwise rankings contradicting the rating direction
    pub conflicts: Vec<String>,
}

impl DpoOutcome {
    fn failed(reason: String) -> Self {
        Self {
            failure_reasons: vec![reason],
            ..Default::default()
        }
    }
}

/// How the rejected side of a chosen candidate was picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RejectPolicy {
    Strict,
    Fallback,
}

/// Builds (chosen, rejected) preference pairs for a sample.
pub struct DpoPairGenerator<'a> {
    evaluator: CandidateEvaluator<'a>,
}

impl<'a> DpoPairGenerator<'a> {
    pub fn new(evaluator: CandidateEvaluator<'a>) -> Self {
        Self { evaluator }
    }

    pub fn generate(&self, sample: &'a Sample) -> DpoOutcome {
        let rated = self.evaluator.rated(sample);
        let Some(observed_max) = rated.iter().map(|(_, r)| *r).max() else {
            return DpoOutcome::failed(NO_RATED_COMPLETIONS.to_string());
        };

        let min_rating = self.evaluator.thresholds().min_rating;
        let chosen_candidates: Vec<&(Candidate<'a>, u8)> =
            rated.iter().filter(|(_, r)| *r >= min_rating).collect();
        if chosen_candidates.is_empty() {
            return DpoOutcome::failed(rating_floor_failure(min_rating, observed_max));
        }

        let prompt = Conversation::from_prompt(&sample.prompt);
        let mut outcome = DpoOutcome::default();

        for &(chosen, chosen_rating) in &chosen_candidates {
            let pool: Vec<&(Candidate<'a>, u8)> =
                rated.iter().filter(|(_, r)| *r < *chosen_rating).collect();

            let rejected = match self.pick_rejected(&pool) {
                Ok((policy, rejected)) => {
                    debug!(
                        sample_id = sample.id,
                        chosen_id = chosen.id(),
                        policy = ?policy,
                        count = rejected.len(),
                        "Paired chosen completion"
                    );
                    rejected
                }
                Err(reason) => {
                    let reason = reason.unwrap_or_else(|| {
                        format!("No completion with rating < {chosen_rating}")
                    });
                    if !outcome.diagnostics.contains(&reason) {
                        outcome.diagnostics.push(reason);
                    }
                    continue;
                }
            };

            for (rejected, rejected_rating) in rejected {
                if let Some(conflict) =
                    self.check_conflict(chosen, *chosen_rating, rejected, *rejected_rating)
                {
                    warn!(sample_id = sample.id, "{conflict}");
                    outcome.conflicts.push(conflict);
                }

                outcome.pairs.push(DpoPair {
                    sample_id: sample.id,
                    prompt: prompt.clone(),
                    chosen_id: chosen.id(),
                    chosen: chosen.completion.text.clone(),
                    chosen_rating: *chosen_rating,
                    rejected_id: rejected.id(),
                    rejected: rejected.completion.text.clone(),
                    rejected_rating: *rejected_rating,
                });
            }
        }

        if outcome.pairs.is_empty() {
            outcome.failure_reasons = std::mem::take(&mut outcome.diagnostics);
        }

        debug!(
            sample_id = sample.id,
            pairs = outcome.pairs.len(),
            conflicts = outcome.conflicts.len(),
            "Generated DPO pairs"
        );
        outcome
    }

    /// Choose rejected completions out of a strictly-lower-rated pool.
    ///
    /// `Err(None)` means the pool is empty; `Err(Some(reason))` carries any
    /// other miss.
    fn pick_rejected<'p>(
        &self,
        pool: &[&'p (Candidate<'a>, u8)],
    ) -> Result<(RejectPolicy, Vec<&'p (Candidate<'a>, u8)>), Option<String>> {
        if pool.is_empty() {
            return Err(None);
        }
        if pool.iter().all(|(c, _)| c.logprobs.is_none()) {
            return Err(Some(NO_LOGPROBS_IN_POOL.to_string()));
        }

        let strict: Vec<_> = pool.iter().copied().filter(|(c, _)| c.passes_gate).collect();
        if !strict.is_empty() {
            return Ok((RejectPolicy::Strict, strict));
        }

        // First maximum in id order wins.
        let mut best: Option<(&'p (Candidate<'a>, u8), f64)> = None;
        for &item in pool {
            let Some(lp) = item.0.logprobs else { continue };
            let score = lp.scored_logprob();
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((item, score));
            }
        }

        match best {
            Some((item, _)) => Ok((RejectPolicy::Fallback, vec![item])),
            None => Err(Some(NO_LOGPROBS_IN_POOL.to_string())),
        }
    }

    fn check_conflict(
        &self,
        chosen: &Candidate<'_>,
        chosen_rating: u8,
        rejected: &Candidate<'_>,
        rejected_rating: u8,
    ) -> Option<String> {
        let facet_id = self.evaluator.facet().id;
        self.evaluator
            .dataset()
            .has_pairwise_ranking(rejected.id(), chosen.id(), facet_id)
            .then(|| {
                format!(
                    "Pairwise ranking conflict: completion {} marked as better than completion {}, \
                     but has lower rating ({} < {})",
                    rejected.id(),
                    chosen.id(),
                    rejected_rating,
                    chosen_rating
                )
            })
    }
}
