//! Export report: what each facet entry exported, and why samples failed.

use crate::engine::{Thresholds, TrainingType};
use crate::models::{ForgeError, Result, SampleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A sample that contributed records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedSample {
    pub sample_id: SampleId,
    pub title: String,
    pub group_path: String,
    /// Records this sample produced
    pub records: usize,
}

/// A sample that was considered but produced nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedSample {
    pub sample_id: SampleId,
    pub title: String,
    pub reasons: Vec<String>,
}

/// Informational misses on a sample that still produced records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleNote {
    pub sample_id: SampleId,
    pub notes: Vec<String>,
}

/// Outcome of one facet entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetSummary {
    pub facet: String,
    pub thresholds: Thresholds,

    /// Samples with at least one completion rated for the facet
    pub eligible: usize,
    /// Sample cap after applying the entry's limit
    pub cap: usize,
    /// Samples skipped because an earlier entry already exported them
    pub skipped_claimed: usize,

    pub exported: Vec<ExportedSample>,
    pub failed: Vec<FailedSample>,

    /// Pairwise-ranking conflicts (warnings only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<String>,

    /// Per-candidate misses on exported samples (DPO)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<SampleNote>,
}

impl FacetSummary {
    pub fn new(facet: impl Into<String>, thresholds: Thresholds) -> Self {
        Self {
            facet: facet.into(),
            thresholds,
            eligible: 0,
            cap: 0,
            skipped_claimed: 0,
            exported: Vec::new(),
            failed: Vec::new(),
            conflicts: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// Ids of the samples this entry exported, in visit order.
    pub fn exported_ids(&self) -> Vec<SampleId> {
        self.exported.iter().map(|e| e.sample_id).collect()
    }

    /// Records produced by this entry.
    pub fn record_count(&self) -> usize {
        self.exported.iter().map(|e| e.records).sum()
    }
}

/// Report for a whole export run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportReport {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,

    pub template: String,
    pub training_type: TrainingType,
    #[serde(default)]
    pub target_model: Option<String>,

    pub facets: Vec<FacetSummary>,

    pub total_samples: usize,
    pub total_records: usize,
    pub total_failed: usize,
    pub total_conflicts: usize,

    /// Where the records were written, once written
    #[serde(default)]
    pub output_path: Option<PathBuf>,

    pub runtime_secs: f64,
}

impl ExportReport {
    pub fn new(
        template: impl Into<String>,
        training_type: TrainingType,
        target_model: Option<String>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            template: template.into(),
            training_type,
            target_model,
            facets: Vec::new(),
            total_samples: 0,
            total_records: 0,
            total_failed: 0,
            total_conflicts: 0,
            output_path: None,
            runtime_secs: 0.0,
        }
    }

    /// Recompute totals from the facet summaries.
    pub fn finalize(&mut self) {
        self.total_samples = self.facets.iter().map(|f| f.exported.len()).sum();
        self.total_records = self.facets.iter().map(FacetSummary::record_count).sum();
        self.total_failed = self.facets.iter().map(|f| f.failed.len()).sum();
        self.total_conflicts = self.facets.iter().map(|f| f.conflicts.len()).sum();
    }

    /// Summary for a facet by name.
    pub fn facet(&self, name: &str) -> Option<&FacetSummary> {
        self.facets.iter().find(|f| f.facet == name)
    }

    /// Write the report as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ForgeError::io("creating report directory", e))?;
        }
        let file = File::create(path).map_err(|e| ForgeError::io("creating report file", e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|e| {
            if e.is_io() {
                ForgeError::io("writing report", e.into())
            } else {
                ForgeError::Internal(format!("Serializing report: {}", e))
            }
        })?;
        writer
            .flush()
            .map_err(|e| ForgeError::io("flushing report", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn thresholds() -> Thresholds {
        Thresholds {
            min_rating: 7,
            max_rating: 5,
            min_logprob: -1.0,
            avg_logprob: -0.5,
        }
    }

    #[test]
    fn test_finalize_totals() {
        let mut report = ExportReport::new("weekly", TrainingType::Dpo, None);
        let mut summary = FacetSummary::new("quality", thresholds());
        summary.exported.push(ExportedSample {
            sample_id: 1,
            title: "one".to_string(),
            group_path: "a".to_string(),
            records: 3,
        });
        summary.exported.push(ExportedSample {
            sample_id: 2,
            title: "two".to_string(),
            group_path: "a".to_string(),
            records: 1,
        });
        summary.failed.push(FailedSample {
            sample_id: 3,
            title: "three".to_string(),
            reasons: vec!["No rated completions found".to_string()],
        });
        summary.conflicts.push("conflict".to_string());
        report.facets.push(summary);

        report.finalize();
        assert_eq!(report.total_samples, 2);
        assert_eq!(report.total_records, 4);
        assert_eq!(report.total_failed, 1);
        assert_eq!(report.total_conflicts, 1);
        assert_eq!(report.facet("quality").unwrap().exported_ids(), vec![1, 2]);
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("reports").join("run.json");

        let mut report = ExportReport::new("weekly", TrainingType::Sft, Some("m".to_string()));
        report.facets.push(FacetSummary::new("quality", thresholds()));
        report.save(&path).unwrap();

        let loaded: ExportReport =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, report);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_save_surfaces_write_failure() {
        let report = ExportReport::new("weekly", TrainingType::Kto, None);
        let err = report.save(Path::new("/dev/full")).unwrap_err();
        assert!(matches!(err, ForgeError::Io { .. }));
    }
}
