//! Export orchestration.
//!
//! Flow per facet entry, in template order:
//! Resolve thresholds → Eligible samples → Order → Cap → Materialize → Report
//!
//! Epistemic foundation:
//! - K_i: A sample is exported by at most one facet entry per run
//! - K_i: The cap counts samples considered (exported or failed), not records
//! - B_i: Any sample may fail its thresholds → collected, never raised
//! - I^B: An export where nothing qualifies → `NothingEligible` with the report

use super::report::{ExportReport, ExportedSample, FacetSummary, FailedSample, SampleNote};
use super::writer::write_jsonl;
use crate::dataset::DatasetSource;
use crate::engine::{resolve_thresholds, CandidateEvaluator};
use crate::models::{
    ExportConfig, FacetEntry, ForgeError, Result, Sample, SampleId, SampleOrder, TrainingRecords,
};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Records and report of a successful export run.
#[derive(Debug, Clone)]
pub struct ExportOutput {
    pub records: TrainingRecords,
    pub report: ExportReport,
}

/// Runs an export template against a dataset.
pub struct ExportOrchestrator<'a> {
    dataset: &'a dyn DatasetSource,
    config: &'a ExportConfig,
    seed: Option<u64>,
    show_progress: bool,
}

impl<'a> ExportOrchestrator<'a> {
    pub fn new(dataset: &'a dyn DatasetSource, config: &'a ExportConfig) -> Self {
        Self {
            dataset,
            config,
            seed: None,
            show_progress: false,
        }
    }

    /// Seed the shuffle used by `random` ordering.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Draw a progress bar while samples are processed.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Materialize records for every facet entry.
    ///
    /// The template is validated first, so templates built in code get the
    /// same checks as ones loaded from a file.
    pub fn run(&self) -> Result<ExportOutput> {
        match self.seed {
            Some(seed) => self.run_with_rng(&mut StdRng::seed_from_u64(seed)),
            None => self.run_with_rng(&mut rand::rng()),
        }
    }

    /// Run and write the records as JSONL to `output_path`.
    pub fn export_to(&self, output_path: &Path) -> Result<ExportReport> {
        let ExportOutput {
            records,
            mut report,
        } = self.run()?;
        write_jsonl(output_path, &records)?;
        report.output_path = Some(output_path.to_path_buf());
        Ok(report)
    }

    fn run_with_rng<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<ExportOutput> {
        self.config.validate()?;

        let start = Instant::now();
        let template = &self.config.template;
        let training_type = template.training_type;
        let target_model = template.target_model.as_deref();

        info!(
            template = %template.name,
            training_type = %training_type,
            facets = self.config.facets.len(),
            "Starting export"
        );

        let pb = self.progress_bar();
        let mut report =
            ExportReport::new(&template.name, training_type, template.target_model.clone());
        let mut records = training_type.empty_records();
        let mut claimed: HashSet<SampleId> = HashSet::new();

        for entry in &self.config.facets {
            let facet = self
                .dataset
                .facet_by_name(&entry.facet)
                .ok_or_else(|| ForgeError::FacetNotFound(entry.facet.clone()))?;
            let thresholds = resolve_thresholds(facet, &entry.overrides);
            let evaluator = CandidateEvaluator::new(self.dataset, facet, thresholds, target_model);

            let mut summary = FacetSummary::new(&facet.name, thresholds);
            let samples = order_samples(self.dataset.samples_for_facet(facet), entry.order, rng);
            summary.eligible = samples.len();
            summary.cap = entry.limit.cap(samples.len());
            pb.inc_length(summary.cap as u64);

            let mut considered = 0;
            for sample in samples {
                if considered == summary.cap {
                    break;
                }
                if claimed.contains(&sample.id) {
                    summary.skipped_claimed += 1;
                    continue;
                }
                considered += 1;

                let outcome = training_type.materialize(evaluator, sample);
                summary.conflicts.extend(outcome.conflicts);

                if outcome.records.is_empty() {
                    debug!(
                        sample_id = sample.id,
                        reasons = ?outcome.failure_reasons,
                        "Sample not exported"
                    );
                    summary.failed.push(FailedSample {
                        sample_id: sample.id,
                        title: sample.title.clone(),
                        reasons: outcome.failure_reasons,
                    });
                } else {
                    claimed.insert(sample.id);
                    if !outcome.diagnostics.is_empty() {
                        summary.notes.push(SampleNote {
                            sample_id: sample.id,
                            notes: outcome.diagnostics,
                        });
                    }
                    summary.exported.push(ExportedSample {
                        sample_id: sample.id,
                        title: sample.title.clone(),
                        group_path: sample.group_path.clone(),
                        records: outcome.records.len(),
                    });
                    records.append(outcome.records)?;
                }

                pb.inc(1);
                pb.set_message(format!(
                    "{}: exported {}, failed {}",
                    facet.name,
                    summary.exported.len(),
                    summary.failed.len()
                ));
            }

            // Claimed skips may leave the bar short of its length.
            pb.set_length(pb.position());
            log_facet(entry, &summary);
            report.facets.push(summary);
        }

        report.runtime_secs = start.elapsed().as_secs_f64();
        report.finalize();
        pb.finish_with_message(format!(
            "Done! {} samples, {} records",
            report.total_samples, report.total_records
        ));

        if records.is_empty() {
            warn!(template = %template.name, "No eligible samples found for export");
            return Err(ForgeError::NothingEligible {
                report: Box::new(report),
            });
        }

        info!(
            samples = report.total_samples,
            records = report.total_records,
            failed = report.total_failed,
            conflicts = report.total_conflicts,
            runtime = format!("{:.2}s", report.runtime_secs),
            "Export complete"
        );

        Ok(ExportOutput { records, report })
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
        {
            pb.set_style(style.progress_chars("##-"));
        }
        pb
    }
}

/// Put eligible samples (oldest first) into the visit order of `order`.
fn order_samples<'s, R: Rng + ?Sized>(
    mut samples: Vec<&'s Sample>,
    order: SampleOrder,
    rng: &mut R,
) -> Vec<&'s Sample> {
    match order {
        SampleOrder::Oldest => {}
        SampleOrder::Newest => samples.reverse(),
        SampleOrder::Random => samples.shuffle(rng),
    }
    samples
}

fn log_facet(entry: &FacetEntry, summary: &FacetSummary) {
    info!(
        facet = %entry.facet,
        eligible = summary.eligible,
        cap = summary.cap,
        exported = summary.exported.len(),
        failed = summary.failed.len(),
        skipped = summary.skipped_claimed,
        conflicts = summary.conflicts.len(),
        "Facet processed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DatasetSnapshot, SnapshotDocument};
    use crate::engine::TrainingType;
    use crate::models::{
        Completion, ConfigError, DatasetConfig, Facet, OutputConfig, SampleLimit, TemplateConfig,
    };
    use chrono::{TimeZone, Utc};

    const MODEL: &str = "target-model";

    fn sample(id: u64, completion_ids: &[u64]) -> Sample {
        Sample {
            id,
            title: format!("Sample {id}"),
            group_path: "math".to_string(),
            prompt: format!("Question {id}"),
            created_at: Utc.timestamp_opt(1_700_000_000 + id as i64, 0).unwrap(),
            completions: completion_ids
                .iter()
                .map(|&cid| Completion {
                    id: cid,
                    model_id: MODEL.to_string(),
                    text: format!("Answer {cid}"),
                    is_truncated: false,
                    is_archived: false,
                })
                .collect(),
        }
    }

    /// Four samples; sample N has completion N rated 9 with good logprobs.
    fn dataset() -> DatasetSnapshot {
        let mut doc = SnapshotDocument::default().with_facet(Facet::new(1, "quality"));
        for id in 1..=4 {
            doc = doc
                .with_sample(sample(id, &[id]))
                .with_rating(id, 1, 9)
                .with_logprobs(id, MODEL, -0.2, -0.1);
        }
        DatasetSnapshot::new(doc).unwrap()
    }

    fn config(entries: Vec<FacetEntry>) -> ExportConfig {
        ExportConfig {
            template: TemplateConfig {
                name: "unit".to_string(),
                description: String::new(),
                training_type: TrainingType::Sft,
                target_model: Some(MODEL.to_string()),
            },
            dataset: DatasetConfig {
                path: "unused.json".into(),
            },
            output: OutputConfig::default(),
            facets: entries,
        }
    }

    fn ordered_entry(order: SampleOrder, limit: SampleLimit) -> FacetEntry {
        let mut entry = FacetEntry::new("quality");
        entry.order = order;
        entry.limit = limit;
        entry
    }

    #[test]
    fn test_newest_and_oldest_order() {
        let ds = dataset();

        let cfg = config(vec![ordered_entry(SampleOrder::Newest, SampleLimit::Count(2))]);
        let out = ExportOrchestrator::new(&ds, &cfg).run().unwrap();
        assert_eq!(out.report.facets[0].exported_ids(), vec![4, 3]);

        let cfg = config(vec![ordered_entry(SampleOrder::Oldest, SampleLimit::Count(2))]);
        let out = ExportOrchestrator::new(&ds, &cfg).run().unwrap();
        assert_eq!(out.report.facets[0].exported_ids(), vec![1, 2]);
    }

    #[test]
    fn test_seeded_random_order_is_reproducible() {
        let ds = dataset();
        let cfg = config(vec![ordered_entry(SampleOrder::Random, SampleLimit::Count(4))]);

        let first = ExportOrchestrator::new(&ds, &cfg).with_seed(7).run().unwrap();
        let second = ExportOrchestrator::new(&ds, &cfg).with_seed(7).run().unwrap();
        let ids = first.report.facets[0].exported_ids();
        assert_eq!(ids, second.report.facets[0].exported_ids());

        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_unknown_facet_aborts() {
        let ds = dataset();
        let cfg = config(vec![FacetEntry::new("missing")]);

        let err = ExportOrchestrator::new(&ds, &cfg).run().unwrap_err();
        assert!(matches!(err, ForgeError::FacetNotFound(name) if name == "missing"));
    }

    #[test]
    fn test_failed_samples_count_against_cap() {
        let mut doc = SnapshotDocument::default().with_facet(Facet::new(1, "quality"));
        for id in 1..=3 {
            doc = doc.with_sample(sample(id, &[id])).with_rating(id, 1, 9);
        }
        // Only sample 3 has logprobs for the target model.
        doc = doc.with_logprobs(3, MODEL, -0.2, -0.1);
        let ds = DatasetSnapshot::new(doc).unwrap();
        let cfg = config(vec![ordered_entry(SampleOrder::Oldest, SampleLimit::Count(2))]);

        let err = ExportOrchestrator::new(&ds, &cfg).run().unwrap_err();
        let report = err.report().unwrap();
        assert_eq!(report.facets[0].failed.len(), 2);
        assert!(report.facets[0].exported.is_empty());
    }

    #[test]
    fn test_invalid_template_is_config_error() {
        let ds = dataset();
        let cfg = config(vec![ordered_entry(SampleOrder::Oldest, SampleLimit::Count(0))]);

        let err = ExportOrchestrator::new(&ds, &cfg).run().unwrap_err();
        assert!(matches!(err, ForgeError::Config(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_dpo_notes_kept_for_exported_samples() {
        let doc = SnapshotDocument::default()
            .with_facet(Facet::new(1, "quality"))
            .with_sample(sample(1, &[1, 2]))
            .with_rating(1, 1, 9)
            .with_rating(2, 1, 7)
            .with_logprobs(1, MODEL, -0.2, -0.1)
            .with_logprobs(2, MODEL, -0.2, -0.1);
        let ds = DatasetSnapshot::new(doc).unwrap();
        let mut cfg = config(vec![ordered_entry(SampleOrder::Oldest, SampleLimit::Count(1))]);
        cfg.template.training_type = TrainingType::Dpo;

        let out = ExportOrchestrator::new(&ds, &cfg).run().unwrap();
        let summary = &out.report.facets[0];
        assert_eq!(summary.exported_ids(), vec![1]);
        assert_eq!(
            summary.notes,
            vec![SampleNote {
                sample_id: 1,
                notes: vec!["No completion with rating < 7".to_string()],
            }]
        );

        let json = serde_json::to_string(&out.report).unwrap();
        assert!(json.contains("No completion with rating < 7"));
    }

    #[test]
    fn test_claimed_samples_do_not_consume_cap() {
        let mut doc = SnapshotDocument::default()
            .with_facet(Facet::new(1, "quality"))
            .with_facet(Facet::new(2, "tone"));
        for id in 1..=4 {
            doc = doc
                .with_sample(sample(id, &[id]))
                .with_rating(id, 1, 9)
                .with_rating(id, 2, 9)
                .with_logprobs(id, MODEL, -0.2, -0.1);
        }
        let ds = DatasetSnapshot::new(doc).unwrap();

        let mut tone = ordered_entry(SampleOrder::Oldest, SampleLimit::Count(2));
        tone.facet = "tone".to_string();
        let cfg = config(vec![
            ordered_entry(SampleOrder::Oldest, SampleLimit::Count(2)),
            tone,
        ]);

        let out = ExportOrchestrator::new(&ds, &cfg).run().unwrap();
        assert_eq!(out.report.facets[0].exported_ids(), vec![1, 2]);

        // The first two tone samples are taken, so the window moves past them.
        let tone = &out.report.facets[1];
        assert_eq!(tone.skipped_claimed, 2);
        assert_eq!(tone.exported_ids(), vec![3, 4]);
        assert_eq!(out.records.len(), 4);
    }
}
