//! In-memory dataset snapshot loaded from JSON.
//!
//! Epistemic foundation:
//! - K_i: Ratings are unique per (completion, facet) and lie in 0..=10
//! - K_i: Logprob lookup is by exact model id, never substituted
//! - B_i: The document may be malformed → validated on load

use super::DatasetSource;
use crate::models::{
    Completion, CompletionId, Facet, FacetId, ForgeError, LogprobSummary, PairwiseRanking, Rating,
    Result, Sample, MAX_RATING,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

/// Serialized form of a dataset snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotDocument {
    #[serde(default)]
    pub facets: Vec<Facet>,
    #[serde(default)]
    pub samples: Vec<Sample>,
    #[serde(default)]
    pub ratings: Vec<Rating>,
    #[serde(default)]
    pub logprobs: Vec<LogprobSummary>,
    #[serde(default)]
    pub pairwise_rankings: Vec<PairwiseRanking>,
}

impl SnapshotDocument {
    pub fn with_facet(mut self, facet: Facet) -> Self {
        self.facets.push(facet);
        self
    }

    pub fn with_sample(mut self, sample: Sample) -> Self {
        self.samples.push(sample);
        self
    }

    pub fn with_rating(mut self, completion_id: CompletionId, facet_id: FacetId, rating: u8) -> Self {
        self.ratings.push(Rating {
            completion_id,
            facet_id,
            rating,
        });
        self
    }

    pub fn with_logprobs(
        mut self,
        completion_id: CompletionId,
        model_id: impl Into<String>,
        min_logprob: f64,
        avg_logprob: f64,
    ) -> Self {
        self.logprobs.push(LogprobSummary {
            completion_id,
            model_id: model_id.into(),
            min_logprob,
            avg_logprob,
        });
        self
    }

    pub fn with_ranking(mut self, better: CompletionId, worse: CompletionId, facet_id: FacetId) -> Self {
        self.pairwise_rankings.push(PairwiseRanking {
            better_completion_id: better,
            worse_completion_id: worse,
            facet_id,
        });
        self
    }
}

/// Indexed, validated dataset snapshot.
#[derive(Debug, Clone)]
pub struct DatasetSnapshot {
    doc: SnapshotDocument,
    facets_by_name: HashMap<String, usize>,
    ratings: HashMap<(CompletionId, FacetId), u8>,
    logprobs: HashMap<(CompletionId, String), usize>,
    rankings: HashSet<(CompletionId, CompletionId, FacetId)>,
}

impl DatasetSnapshot {
    /// Load and validate a snapshot from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| ForgeError::io("opening dataset snapshot", e))?;
        let reader = BufReader::new(file);
        let doc: SnapshotDocument = serde_json::from_reader(reader)
            .map_err(|e| ForgeError::ParseError(format!("Invalid dataset snapshot: {e}")))?;

        let snapshot = Self::new(doc)?;
        info!(
            facets = snapshot.doc.facets.len(),
            samples = snapshot.doc.samples.len(),
            ratings = snapshot.ratings.len(),
            logprobs = snapshot.logprobs.len(),
            "Loaded dataset snapshot"
        );
        Ok(snapshot)
    }

    /// Build indexes over a document, rejecting inconsistent data.
    pub fn new(doc: SnapshotDocument) -> Result<Self> {
        let mut facets_by_name = HashMap::with_capacity(doc.facets.len());
        let mut facet_ids = HashSet::with_capacity(doc.facets.len());
        for (idx, facet) in doc.facets.iter().enumerate() {
            if facets_by_name.insert(facet.name.clone(), idx).is_some() {
                return Err(ForgeError::InvalidDataset(format!(
                    "duplicate facet name '{}'",
                    facet.name
                )));
            }
            if !facet_ids.insert(facet.id) {
                return Err(ForgeError::InvalidDataset(format!(
                    "duplicate facet id {}",
                    facet.id
                )));
            }
        }

        let mut completion_ids = HashSet::new();
        for sample in &doc.samples {
            for completion in &sample.completions {
                if !completion_ids.insert(completion.id) {
                    return Err(ForgeError::InvalidDataset(format!(
                        "completion {} appears more than once",
                        completion.id
                    )));
                }
            }
        }

        let mut ratings = HashMap::with_capacity(doc.ratings.len());
        for r in &doc.ratings {
            if r.rating > MAX_RATING {
                return Err(ForgeError::InvalidDataset(format!(
                    "rating {} of completion {} is outside 0..={MAX_RATING}",
                    r.rating, r.completion_id
                )));
            }
            if !completion_ids.contains(&r.completion_id) {
                return Err(ForgeError::InvalidDataset(format!(
                    "rating references unknown completion {}",
                    r.completion_id
                )));
            }
            if !facet_ids.contains(&r.facet_id) {
                return Err(ForgeError::InvalidDataset(format!(
                    "rating references unknown facet {}",
                    r.facet_id
                )));
            }
            if ratings.insert((r.completion_id, r.facet_id), r.rating).is_some() {
                return Err(ForgeError::InvalidDataset(format!(
                    "completion {} is rated twice for facet {}",
                    r.completion_id, r.facet_id
                )));
            }
        }

        let logprobs = doc
            .logprobs
            .iter()
            .enumerate()
            .map(|(idx, lp)| ((lp.completion_id, lp.model_id.clone()), idx))
            .collect();

        let rankings = doc
            .pairwise_rankings
            .iter()
            .map(|r| (r.better_completion_id, r.worse_completion_id, r.facet_id))
            .collect();

        Ok(Self {
            doc,
            facets_by_name,
            ratings,
            logprobs,
            rankings,
        })
    }

    /// All facets in document order.
    pub fn facets(&self) -> &[Facet] {
        &self.doc.facets
    }

    /// All samples in document order.
    pub fn samples(&self) -> &[Sample] {
        &self.doc.samples
    }
}

impl DatasetSource for DatasetSnapshot {
    fn facet_by_name(&self, name: &str) -> Option<&Facet> {
        self.facets_by_name.get(name).map(|&idx| &self.doc.facets[idx])
    }

    fn samples_for_facet(&self, facet: &Facet) -> Vec<&Sample> {
        let mut samples: Vec<&Sample> = self
            .doc
            .samples
            .iter()
            .filter(|s| {
                s.completions
                    .iter()
                    .any(|c| !c.is_archived && self.ratings.contains_key(&(c.id, facet.id)))
            })
            .collect();
        samples.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        samples
    }

    fn completions<'a>(&'a self, sample: &'a Sample) -> Vec<&'a Completion> {
        sample.completions.iter().filter(|c| !c.is_archived).collect()
    }

    fn rating(&self, completion: CompletionId, facet: FacetId) -> Option<u8> {
        self.ratings.get(&(completion, facet)).copied()
    }

    fn logprobs(&self, completion: CompletionId, model_id: &str) -> Option<&LogprobSummary> {
        self.logprobs
            .get(&(completion, model_id.to_string()))
            .map(|&idx| &self.doc.logprobs[idx])
    }

    fn has_pairwise_ranking(
        &self,
        better: CompletionId,
        worse: CompletionId,
        facet: FacetId,
    ) -> bool {
        self.rankings.contains(&(better, worse, facet))
    }
}
