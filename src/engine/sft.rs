//! SFT (Supervised Fine-Tuning) selection.
//!
//! K_i: At most one completion per sample, the highest-rated that survives
//! the rating floor and (when a target model is set) the logprob gate.

use super::CandidateEvaluator;
use crate::models::{Conversation, Sample, SftRecord};
use tracing::debug;

pub const NO_RATED_COMPLETIONS: &str = "No rated completions found";
pub const NO_GATED_COMPLETION: &str = "No high-rated completion meets logprob thresholds";

/// Result of selecting an SFT completion for one sample.
#[derive(Debug, Clone, Default)]
pub struct SftOutcome {
    pub record: Option<SftRecord>,
    pub failure_reasons: Vec<String>,
}

impl SftOutcome {
    fn failed(reasons: Vec<String>) -> Self {
        Self {
            record: None,
            failure_reasons: reasons,
        }
    }
}

/// "No completion with rating >= {min} (max rating: {max})"
pub fn rating_floor_failure(min_rating: u8, observed_max: u8) -> String {
    format!("No completion with rating >= {min_rating} (max rating: {observed_max})")
}

/// Selects the single best completion of a sample.
pub struct SftSelector<'a> {
    evaluator: CandidateEvaluator<'a>,
}

impl<'a> SftSelector<'a> {
    pub fn new(evaluator: CandidateEvaluator<'a>) -> Self {
        Self { evaluator }
    }

    pub fn select(&self, sample: &'a Sample) -> SftOutcome {
        let rated = self.evaluator.rated(sample);
        let Some(observed_max) = rated.iter().map(|(_, r)| *r).max() else {
            return SftOutcome::failed(vec![NO_RATED_COMPLETIONS.to_string()]);
        };

        let min_rating = self.evaluator.thresholds().min_rating;
        let high_rated: Vec<_> = rated.into_iter().filter(|(_, r)| *r >= min_rating).collect();
        if high_rated.is_empty() {
            return SftOutcome::failed(vec![rating_floor_failure(min_rating, observed_max)]);
        }

        // Without a target model there is nothing to gate on.
        let survivors: Vec<_> = if self.evaluator.target_model().is_some() {
            high_rated.iter().filter(|(c, _)| c.passes_gate).collect()
        } else {
            high_rated.iter().collect()
        };

        // Candidates are in ascending id order, so the first maximum is the
        // lowest completion id among equally rated survivors.
        let best = survivors
            .into_iter()
            .fold(None, |best: Option<&(_, u8)>, item| match best {
                Some(b) if b.1 >= item.1 => Some(b),
                _ => Some(item),
            });

        let Some((candidate, rating)) = best else {
            let mut reasons = vec![NO_GATED_COMPLETION.to_string()];
            for (candidate, _) in &high_rated {
                reasons.extend(self.evaluator.gate_diagnostics(candidate));
            }
            return SftOutcome::failed(reasons);
        };

        debug!(
            sample_id = sample.id,
            completion_id = candidate.id(),
            rating = *rating,
            "Selected SFT completion"
        );

        SftOutcome {
            record: Some(SftRecord {
                sample_id: sample.id,
                completion_id: candidate.id(),
                prompt: Conversation::from_prompt(&sample.prompt),
                completion: candidate.completion.text.clone(),
                rating: *rating,
                is_truncated: candidate.completion.is_truncated,
            }),
            failure_reasons: Vec::new(),
        }
    }
}
