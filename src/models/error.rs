//! Error types for prefforge.
//!
//! Epistemic taxonomy:
//! - B_i falsified: Expected failures (unknown facet, bad input)
//! - I^B materialized: Infrastructure failures (file I/O)
//! - K_i violated: Internal invariant violations (bugs)
//!
//! Threshold misses are NOT errors. They are collected as per-sample
//! diagnostics in the export report.

use thiserror::Error;

/// Top-level error type for prefforge.
#[derive(Debug, Error)]
pub enum ForgeError {
    // ═══════════════════════════════════════════════════════════════════
    // B_i FALSIFIED: Belief proven wrong (expected failures)
    // ═══════════════════════════════════════════════════════════════════

    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Facet not found: {0}")]
    FacetNotFound(String),

    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    /// The only content-triggered abort: every configured facet came up empty.
    #[error("No eligible samples found for export")]
    NothingEligible {
        report: Box<crate::export::ExportReport>,
    },

    // ═══════════════════════════════════════════════════════════════════
    // I^B MATERIALIZED: Bounded ignorance became known-bad
    // ═══════════════════════════════════════════════════════════════════

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // K_i VIOLATED: Invariant broken (bug, should not happen)
    // ═══════════════════════════════════════════════════════════════════

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ForgeError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// The partial report attached to a "nothing eligible" abort, if any.
    pub fn report(&self) -> Option<&crate::export::ExportReport> {
        match self {
            Self::NothingEligible { report } => Some(report),
            _ => None,
        }
    }
}

/// Result type alias for prefforge.
pub type Result<T> = std::result::Result<T, ForgeError>;
