//! Core data models for prefforge.
//!
//! Epistemic mapping:
//! - K_i (Knowledge): Dataset entities and records with compile-time shape
//! - B_i (Beliefs): Lookups that may miss are Option, loads are Result
//! - I^R (Resolvable): Export templates and threshold overrides
//! - I^B (Bounded): Error variants for I/O and malformed input

mod config;
mod dataset;
mod error;
mod record;

pub use config::*;
pub use dataset::*;
pub use error::*;
pub use record::*;
