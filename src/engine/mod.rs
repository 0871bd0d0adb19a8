//! Materialization engine.
//!
//! Turns a curated sample into training records of one shape:
//! - **SFT**: the single best completion per sample
//! - **DPO**: (chosen, rejected) pairs, one chosen to many rejected
//! - **KTO**: good/bad labeled completions
//!
//! Every shape shares one `CandidateEvaluator` per (facet, target model).

mod dpo;
mod evaluator;
mod kto;
mod sft;
mod thresholds;

#[cfg(test)]
pub(crate) mod testing;

pub use dpo::*;
pub use evaluator::*;
pub use kto::*;
pub use sft::*;
pub use thresholds::*;

use crate::models::{Sample, TrainingRecords};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shape of the training records an export produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingType {
    Sft,
    Dpo,
    Kto,
}

impl fmt::Display for TrainingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sft => write!(f, "sft"),
            Self::Dpo => write!(f, "dpo"),
            Self::Kto => write!(f, "kto"),
        }
    }
}

/// What one sample contributed to an export.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleOutcome {
    pub records: TrainingRecords,
    /// Non-empty only when `records` is empty
    pub failure_reasons: Vec<String>,
    /// Pairwise-ranking conflicts (DPO)
    pub conflicts: Vec<String>,
    /// Informational misses on a sample that still produced records
    pub diagnostics: Vec<String>,
}

impl TrainingType {
    /// Empty record set of this shape.
    pub fn empty_records(self) -> TrainingRecords {
        match self {
            Self::Sft => TrainingRecords::Sft(Vec::new()),
            Self::Dpo => TrainingRecords::Dpo(Vec::new()),
            Self::Kto => TrainingRecords::Kto(Vec::new()),
        }
    }

    /// Run the selector for this shape over one sample.
    pub fn materialize<'a>(
        self,
        evaluator: CandidateEvaluator<'a>,
        sample: &'a Sample,
    ) -> SampleOutcome {
        match self {
            Self::Sft => {
                let outcome = SftSelector::new(evaluator).select(sample);
                SampleOutcome {
                    records: TrainingRecords::Sft(outcome.record.into_iter().collect()),
                    failure_reasons: outcome.failure_reasons,
                    conflicts: Vec::new(),
                    diagnostics: Vec::new(),
                }
            }
            Self::Dpo => {
                let outcome = DpoPairGenerator::new(evaluator).generate(sample);
                SampleOutcome {
                    records: TrainingRecords::Dpo(outcome.pairs),
                    failure_reasons: outcome.failure_reasons,
                    conflicts: outcome.conflicts,
                    diagnostics: outcome.diagnostics,
                }
            }
            Self::Kto => {
                let outcome = KtoLabelGenerator::new(evaluator).label(sample);
                let failure_reasons = if !outcome.examples.is_empty() {
                    Vec::new()
                } else if outcome.rated_count == 0 {
                    vec![NO_RATED_COMPLETIONS.to_string()]
                } else {
                    let t = evaluator.thresholds();
                    vec![format!(
                        "No completions qualified (min_rating={}, max_rating={})",
                        t.min_rating, t.max_rating
                    )]
                };
                SampleOutcome {
                    records: TrainingRecords::Kto(outcome.examples),
                    failure_reasons,
                    conflicts: Vec::new(),
                    diagnostics: Vec::new(),
                }
            }
        }
    }
}
