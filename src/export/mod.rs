//! Export: orchestration, JSONL output and run reports.
//!
//! Provides:
//! - `ExportOrchestrator`: runs a template's facet entries over a dataset
//! - `write_jsonl`: atomic JSONL output per training type
//! - `ExportReport`: per-facet exported ids, failures and conflicts

mod orchestrator;
mod report;
mod writer;

pub use orchestrator::*;
pub use report::*;
pub use writer::*;
