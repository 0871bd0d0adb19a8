//! Threshold resolution: per-export overrides merged over facet defaults.

use crate::models::Facet;
use serde::{Deserialize, Serialize};

/// Optional per-export threshold overrides.
///
/// I^R: Every field is independently resolvable; `None` defers to the facet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_rating: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rating: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_logprob: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_logprob: Option<f64>,
}

/// Effective thresholds for one facet within one export.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Ratings at or above this are "good"
    pub min_rating: u8,
    /// Ratings at or below this are "bad" (KTO only)
    pub max_rating: u8,
    /// Gate on the minimum per-token logprob
    pub min_logprob: f64,
    /// Gate on the mean per-token logprob
    pub avg_logprob: f64,
}

impl Thresholds {
    /// Facet defaults with no overrides applied.
    pub fn from_facet(facet: &Facet) -> Self {
        Self {
            min_rating: facet.min_rating,
            max_rating: facet.max_rating,
            min_logprob: facet.min_logprob_threshold,
            avg_logprob: facet.avg_logprob_threshold,
        }
    }
}

/// Merge `overrides` over the facet's defaults. Never touches the facet.
pub fn resolve_thresholds(facet: &Facet, overrides: &ThresholdOverrides) -> Thresholds {
    let defaults = Thresholds::from_facet(facet);
    Thresholds {
        min_rating: overrides.min_rating.unwrap_or(defaults.min_rating),
        max_rating: overrides.max_rating.unwrap_or(defaults.max_rating),
        min_logprob: overrides.min_logprob.unwrap_or(defaults.min_logprob),
        avg_logprob: overrides.avg_logprob.unwrap_or(defaults.avg_logprob),
    }
}
