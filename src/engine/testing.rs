//! Fixtures shared by the engine's unit tests.

use super::Thresholds;
use crate::dataset::{DatasetSnapshot, SnapshotDocument};
use crate::models::{Completion, Facet, Sample};
use chrono::{TimeZone, Utc};

pub const TARGET: &str = "target-model";

pub fn facet(min_rating: u8, max_rating: u8, min_logprob: f64, avg_logprob: f64) -> (Facet, Thresholds) {
    let mut facet = Facet::new(1, "quality");
    facet.min_rating = min_rating;
    facet.max_rating = max_rating;
    facet.min_logprob_threshold = min_logprob;
    facet.avg_logprob_threshold = avg_logprob;
    let thresholds = Thresholds::from_facet(&facet);
    (facet, thresholds)
}

pub fn sample_with(id: u64, completion_ids: &[u64]) -> Sample {
    Sample {
        id,
        title: format!("Sample {id}"),
        group_path: "tests".to_string(),
        prompt: format!("Prompt {id}"),
        created_at: Utc.timestamp_opt(id as i64 * 60, 0).unwrap(),
        completions: completion_ids
            .iter()
            .map(|&cid| Completion {
                id: cid,
                model_id: "gen-model".to_string(),
                text: format!("Completion {cid}"),
                is_truncated: false,
                is_archived: false,
            })
            .collect(),
    }
}

pub fn snapshot(doc: SnapshotDocument) -> DatasetSnapshot {
    DatasetSnapshot::new(doc).unwrap()
}
