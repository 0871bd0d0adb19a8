//! Facet summary: how ready a facet's samples are for SFT and DPO training.
//!
//! Uses the facet's own thresholds and the same selectors as an export, so a
//! "finished" sample here is one an export would take.
//!
//! Loss is the sum of |avg_logprob| under the target model:
//! - SFT: of the selected completion
//! - DPO: of every distinct chosen completion among the produced pairs

use crate::dataset::DatasetSource;
use crate::engine::{CandidateEvaluator, DpoPairGenerator, SftSelector, Thresholds};
use crate::models::{CompletionId, ForgeError, Result, Sample, SampleId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

/// A sample not yet usable for one training type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnfinishedSample {
    pub sample_id: SampleId,
    /// "Sample #{id} {title}"
    pub sample_name: String,
    pub reasons: Vec<String>,
}

/// Readiness counts for one training type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadinessStats {
    pub total: usize,
    pub finished: usize,
    pub unfinished: usize,
    pub total_loss: f64,
    pub unfinished_details: Vec<UnfinishedSample>,
}

impl ReadinessStats {
    fn mark_unfinished(&mut self, sample: &Sample, reasons: Vec<String>) {
        self.unfinished += 1;
        self.unfinished_details.push(UnfinishedSample {
            sample_id: sample.id,
            sample_name: format!("Sample #{} {}", sample.id, sample.title),
            reasons,
        });
    }
}

/// Summary of one facet against one target model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetSummaryReport {
    pub facet: String,
    pub target_model: String,
    pub thresholds: Thresholds,
    pub sft: ReadinessStats,
    pub dpo: ReadinessStats,
}

/// Build the readiness summary of `facet_name` for `target_model`.
pub fn summarize_facet(
    dataset: &dyn DatasetSource,
    facet_name: &str,
    target_model: &str,
) -> Result<FacetSummaryReport> {
    let facet = dataset
        .facet_by_name(facet_name)
        .ok_or_else(|| ForgeError::FacetNotFound(facet_name.to_string()))?;
    let thresholds = Thresholds::from_facet(facet);
    let evaluator = CandidateEvaluator::new(dataset, facet, thresholds, Some(target_model));

    let mut report = FacetSummaryReport {
        facet: facet.name.clone(),
        target_model: target_model.to_string(),
        thresholds,
        sft: ReadinessStats::default(),
        dpo: ReadinessStats::default(),
    };

    for sample in dataset.samples_for_facet(facet) {
        analyze_sft(evaluator, target_model, sample, &mut report.sft);
        analyze_dpo(evaluator, target_model, sample, &mut report.dpo);
    }

    info!(
        facet = %report.facet,
        model = %report.target_model,
        sft_finished = report.sft.finished,
        sft_total = report.sft.total,
        dpo_finished = report.dpo.finished,
        dpo_total = report.dpo.total,
        "Facet summary generated"
    );
    Ok(report)
}

fn analyze_sft(
    evaluator: CandidateEvaluator<'_>,
    target_model: &str,
    sample: &Sample,
    stats: &mut ReadinessStats,
) {
    stats.total += 1;
    let outcome = SftSelector::new(evaluator).select(sample);
    let Some(record) = outcome.record else {
        stats.mark_unfinished(sample, outcome.failure_reasons);
        return;
    };

    stats.finished += 1;
    if let Some(lp) = evaluator.dataset().logprobs(record.completion_id, target_model) {
        stats.total_loss += lp.avg_logprob.abs();
    }
}

fn analyze_dpo(
    evaluator: CandidateEvaluator<'_>,
    target_model: &str,
    sample: &Sample,
    stats: &mut ReadinessStats,
) {
    stats.total += 1;
    let outcome = DpoPairGenerator::new(evaluator).generate(sample);
    if outcome.pairs.is_empty() {
        stats.mark_unfinished(sample, outcome.failure_reasons);
        return;
    }

    stats.finished += 1;
    let chosen: BTreeSet<CompletionId> = outcome.pairs.iter().map(|p| p.chosen_id).collect();
    stats.total_loss += chosen
        .into_iter()
        .filter_map(|id| evaluator.dataset().logprobs(id, target_model))
        .map(|lp| lp.avg_logprob.abs())
        .sum::<f64>();
}
