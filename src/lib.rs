//! prefforge - Materialize SFT, DPO and KTO training records from a curated
//! dataset of rated completions.
//!
//! ## Architecture
//!
//! A dataset holds samples (prompts), their completions, per-facet ratings
//! and per-model logprob summaries. An export template selects facets and
//! hands each eligible sample to one selector:
//! - **SFT**: the best completion clearing the rating floor and logprob gate
//! - **DPO**: chosen/rejected pairs, one chosen to many rejected
//! - **KTO**: good/bad labels from two rating thresholds
//!
//! ## Flow
//!
//! Template → Thresholds → Eligible samples → Order/Cap → Selector → JSONL
//!
//! ## Epistemic Design
//!
//! - K_i (Knowledge): Record shapes, training types, claim-once per run
//! - B_i (Beliefs): Samples may fail thresholds → diagnostics, not errors
//! - I^R (Resolvable): Template thresholds, order, cap, target model
//! - I^B (Bounded): File I/O and malformed snapshots

pub mod dataset;
pub mod engine;
pub mod export;
pub mod models;
pub mod summary;

// Re-exports for convenience
pub use dataset::{DatasetSnapshot, DatasetSource};
pub use engine::{resolve_thresholds, CandidateEvaluator, Thresholds, TrainingType};
pub use export::{write_jsonl, ExportOrchestrator, ExportReport};
pub use models::{ExportConfig, ForgeError, Result, TrainingRecords};
pub use summary::{summarize_facet, FacetSummaryReport};
