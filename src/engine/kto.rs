//! KTO (Kahneman-Tversky Optimization) labeling.
//!
//! Every rated completion is a candidate on its own. Good and bad examples
//! both have to clear the logprob gate; the band between the two rating
//! thresholds is dropped silently.

use super::CandidateEvaluator;
use crate::models::{Conversation, KtoExample, Sample};
use tracing::debug;

/// Result of labeling one sample.
#[derive(Debug, Clone, Default)]
pub struct KtoOutcome {
    pub examples: Vec<KtoExample>,
    /// Rated completions seen, labeled or not
    pub rated_count: usize,
}

/// Produces good/bad examples for a sample.
pub struct KtoLabelGenerator<'a> {
    evaluator: CandidateEvaluator<'a>,
}

impl<'a> KtoLabelGenerator<'a> {
    pub fn new(evaluator: CandidateEvaluator<'a>) -> Self {
        Self { evaluator }
    }

    pub fn label(&self, sample: &'a Sample) -> KtoOutcome {
        let thresholds = self.evaluator.thresholds();
        let rated = self.evaluator.rated(sample);
        let prompt = Conversation::from_prompt(&sample.prompt);

        let examples: Vec<KtoExample> = rated
            .iter()
            .filter(|(candidate, _)| candidate.passes_gate)
            .filter_map(|&(candidate, rating)| {
                let label = if rating >= thresholds.min_rating {
                    true
                } else if rating <= thresholds.max_rating {
                    false
                } else {
                    return None;
                };
                Some(KtoExample {
                    sample_id: sample.id,
                    completion_id: candidate.id(),
                    prompt: prompt.clone(),
                    completion: candidate.completion.text.clone(),
                    rating,
                    label,
                })
            })
            .collect();

        debug!(
            sample_id = sample.id,
            rated = rated.len(),
            labeled = examples.len(),
            "Labeled KTO examples"
        );

        KtoOutcome {
            examples,
            rated_count: rated.len(),
        }
    }
}
