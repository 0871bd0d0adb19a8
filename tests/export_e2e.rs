//! End-to-end export tests: template + snapshot in, JSONL + report out.

use chrono::{TimeZone, Utc};
use prefforge::dataset::{DatasetSnapshot, SnapshotDocument};
use prefforge::models::{
    Completion, DatasetConfig, ExportConfig, Facet, FacetEntry, OutputConfig, Sample,
    SampleLimit, SampleOrder, TemplateConfig,
};
use prefforge::{ExportOrchestrator, ForgeError, TrainingRecords, TrainingType};
use std::collections::HashSet;
use std::fs;
use tempfile::TempDir;

const MODEL: &str = "llama3.1:8b-instruct";

fn sample(id: u64, completion_ids: &[u64]) -> Sample {
    Sample {
        id,
        title: format!("Sample {id}"),
        group_path: "math/arithmetic".to_string(),
        prompt: format!("Question {id}"),
        created_at: Utc.timestamp_opt(1_750_000_000 + id as i64 * 3600, 0).unwrap(),
        completions: completion_ids
            .iter()
            .map(|&cid| Completion {
                id: cid,
                model_id: "author-model".to_string(),
                text: format!("Answer {cid}"),
                is_truncated: false,
                is_archived: false,
            })
            .collect(),
    }
}

/// `count` samples, each with one completion rated `rating` on every facet
/// and logprobs that pass the default gate.
fn uniform_dataset(facets: &[&str], count: u64, rating: u8) -> SnapshotDocument {
    let mut doc = SnapshotDocument::default();
    for (idx, name) in facets.iter().enumerate() {
        doc = doc.with_facet(Facet::new(idx as u64 + 1, *name));
    }
    for id in 1..=count {
        doc = doc
            .with_sample(sample(id, &[id]))
            .with_logprobs(id, MODEL, -0.5, -0.2);
        for facet_id in 1..=facets.len() as u64 {
            doc = doc.with_rating(id, facet_id, rating);
        }
    }
    doc
}

fn config(training_type: TrainingType, facets: Vec<FacetEntry>) -> ExportConfig {
    ExportConfig {
        template: TemplateConfig {
            name: "e2e".to_string(),
            description: String::new(),
            training_type,
            target_model: Some(MODEL.to_string()),
        },
        dataset: DatasetConfig {
            path: "dataset.json".into(),
        },
        output: OutputConfig::default(),
        facets,
    }
}

fn entry(facet: &str, order: SampleOrder, limit: SampleLimit) -> FacetEntry {
    let mut entry = FacetEntry::new(facet);
    entry.order = order;
    entry.limit = limit;
    entry
}

#[test]
fn test_percentage_cap_exports_half() {
    let ds = DatasetSnapshot::new(uniform_dataset(&["quality"], 10, 9)).unwrap();
    let cfg = config(
        TrainingType::Sft,
        vec![entry("quality", SampleOrder::Random, SampleLimit::Percentage(50.0))],
    );

    let out = ExportOrchestrator::new(&ds, &cfg).with_seed(42).run().unwrap();

    let summary = &out.report.facets[0];
    assert_eq!(summary.eligible, 10);
    assert_eq!(summary.cap, 5);
    assert_eq!(summary.exported.len(), 5);
    assert_eq!(out.records.len(), 5);
    assert_eq!(out.report.total_samples, 5);
}

#[test]
fn test_sample_is_never_claimed_twice() {
    let ds = DatasetSnapshot::new(uniform_dataset(&["quality", "tone"], 5, 9)).unwrap();
    let cfg = config(
        TrainingType::Sft,
        vec![
            entry("quality", SampleOrder::Oldest, SampleLimit::Count(3)),
            entry("tone", SampleOrder::Oldest, SampleLimit::Percentage(100.0)),
        ],
    );

    let out = ExportOrchestrator::new(&ds, &cfg).run().unwrap();

    let first = out.report.facet("quality").unwrap();
    let second = out.report.facet("tone").unwrap();
    assert_eq!(first.exported_ids(), vec![1, 2, 3]);
    assert_eq!(second.exported_ids(), vec![4, 5]);
    assert_eq!(second.skipped_claimed, 3);

    let TrainingRecords::Sft(records) = &out.records else {
        panic!("expected SFT records");
    };
    let unique: HashSet<u64> = records.iter().map(|r| r.sample_id).collect();
    assert_eq!(unique.len(), records.len());
    assert_eq!(records.len(), 5);
}

#[test]
fn test_nothing_eligible_returns_report() {
    let ds = DatasetSnapshot::new(uniform_dataset(&["quality"], 3, 4)).unwrap();
    let cfg = config(
        TrainingType::Dpo,
        vec![entry("quality", SampleOrder::Newest, SampleLimit::Count(10))],
    );
    let temp_dir = TempDir::new().unwrap();
    let output = temp_dir.path().join("out.jsonl");

    let err = ExportOrchestrator::new(&ds, &cfg)
        .export_to(&output)
        .unwrap_err();

    assert_eq!(err.to_string(), "No eligible samples found for export");
    let report = err.report().unwrap();
    assert_eq!(report.facets[0].failed.len(), 3);
    assert_eq!(
        report.facets[0].failed[0].reasons,
        vec!["No completion with rating >= 7 (max rating: 4)".to_string()]
    );
    assert!(!output.exists());
}

#[test]
fn test_overrides_tighten_rating_floor() {
    let mut doc = uniform_dataset(&["quality"], 4, 8);
    // Sample 4 alone reaches 9.
    doc.ratings.retain(|r| r.completion_id != 4);
    let doc = doc.with_rating(4, 1, 9);
    let ds = DatasetSnapshot::new(doc).unwrap();

    let mut strict = entry("quality", SampleOrder::Oldest, SampleLimit::Count(4));
    strict.overrides.min_rating = Some(9);
    let cfg = config(TrainingType::Sft, vec![strict]);

    let out = ExportOrchestrator::new(&ds, &cfg).run().unwrap();
    let summary = &out.report.facets[0];
    assert_eq!(summary.thresholds.min_rating, 9);
    assert_eq!(summary.exported_ids(), vec![4]);
    assert_eq!(summary.failed.len(), 3);

    // The facet itself is untouched.
    assert_eq!(ds.facets()[0].min_rating, 7);
}

#[test]
fn test_dpo_conflict_is_reported_not_applied() {
    let mut quality = Facet::new(1, "quality");
    quality.min_logprob_threshold = -0.5;
    quality.avg_logprob_threshold = -0.3;
    let doc = SnapshotDocument::default()
        .with_facet(quality)
        .with_sample(sample(1, &[1, 2]))
        .with_rating(1, 1, 9)
        .with_rating(2, 1, 8)
        .with_logprobs(1, MODEL, -0.4, -0.2)
        .with_logprobs(2, MODEL, -0.4, -0.2)
        .with_ranking(2, 1, 1);
    let ds = DatasetSnapshot::new(doc).unwrap();

    let mut entry = entry("quality", SampleOrder::Oldest, SampleLimit::Count(1));
    entry.overrides.min_rating = Some(9);
    let cfg = config(TrainingType::Dpo, vec![entry]);

    let out = ExportOrchestrator::new(&ds, &cfg).run().unwrap();
    let TrainingRecords::Dpo(pairs) = &out.records else {
        panic!("expected DPO pairs");
    };
    assert_eq!(pairs.len(), 1);
    assert_eq!((pairs[0].chosen_id, pairs[0].rejected_id), (1, 2));
    assert_eq!(out.report.total_conflicts, 1);
    assert!(out.report.facets[0].conflicts[0].contains("(8 < 9)"));
}

#[test]
fn test_export_from_files() {
    let temp_dir = TempDir::new().unwrap();
    let dataset_path = temp_dir.path().join("dataset.json");
    let template_path = temp_dir.path().join("export.toml");

    let doc = uniform_dataset(&["quality"], 3, 9)
        .with_sample(sample(4, &[40, 41]))
        .with_rating(40, 1, 9)
        .with_rating(41, 1, 2)
        .with_logprobs(40, MODEL, -0.5, -0.2)
        .with_logprobs(41, MODEL, -0.5, -0.2);
    fs::write(&dataset_path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();

    let template = format!(
        r#"
[template]
name = "nightly kto"
training_type = "kto"
target_model = "{MODEL}"

[dataset]
path = "{}"

[output]
dir = "{}"

[[facets]]
facet = "quality"
order = "oldest"
"#,
        dataset_path.display(),
        temp_dir.path().join("out").display()
    );
    fs::write(&template_path, template).unwrap();

    let cfg = ExportConfig::from_file(&template_path).unwrap();
    let ds = DatasetSnapshot::from_file(&cfg.dataset.path).unwrap();
    let output = cfg.resolve_output_path(None, Utc::now()).unwrap();
    assert!(output
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("export-nightly_kto-"));

    let report = ExportOrchestrator::new(&ds, &cfg).export_to(&output).unwrap();
    assert_eq!(report.total_samples, 4);
    assert_eq!(report.total_records, 5);
    assert_eq!(report.output_path.as_deref(), Some(output.as_path()));

    let content = fs::read_to_string(&output).unwrap();
    let lines: Vec<serde_json::Value> = content
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines.iter().filter(|l| l["label"] == false).count(), 1);
    assert_eq!(lines[0]["completion"][0]["role"], "assistant");

    let pattern = format!("{}/out/*.tmp", temp_dir.path().display());
    assert_eq!(glob::glob(&pattern).unwrap().count(), 0);
}
