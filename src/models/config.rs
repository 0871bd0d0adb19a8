//! Export template configuration for prefforge.
//!
//! All I^R (resolvable ignorance) is parameterized here.
//! The user resolves these unknowns at runtime via a TOML template file.

use crate::engine::{ThresholdOverrides, TrainingType};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Top-level export configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// What to export and for which model
    pub template: TemplateConfig,

    /// Where the dataset snapshot lives
    pub dataset: DatasetConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Facet entries, processed in order
    #[serde(default)]
    pub facets: Vec<FacetEntry>,
}

/// Template identity and training shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Template name, used in the filename template
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Training record shape
    pub training_type: TrainingType,

    /// Model id whose logprobs gate the completions.
    /// Without it SFT skips the logprob gate.
    #[serde(default)]
    pub target_model: Option<String>,
}

/// Dataset snapshot location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Path to the JSON dataset snapshot
    pub path: PathBuf,
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory; the file name comes from `filename_template`
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// File name template. Supports `{name}`, `{timestamp}` and `${ENV_VAR}`.
    #[serde(default = "default_filename_template")]
    pub filename_template: String,

    /// Optional path for the JSON export report
    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

fn default_filename_template() -> String {
    "export-{name}-{timestamp}.jsonl".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: None,
            filename_template: default_filename_template(),
            report_path: None,
        }
    }
}

/// Order in which a facet's eligible samples are visited.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SampleOrder {
    /// Most recently created first
    Newest,
    /// Oldest first
    Oldest,
    /// Unseeded shuffle
    #[default]
    Random,
}

/// Cap on the number of samples taken from one facet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SampleLimit {
    /// Absolute number of samples
    Count(usize),
    /// Percentage of eligible samples, in (0, 100]
    Percentage(f64),
}

impl Default for SampleLimit {
    fn default() -> Self {
        Self::Percentage(100.0)
    }
}

impl SampleLimit {
    /// Number of samples to take out of `eligible`.
    ///
    /// Percentages floor, but never below one sample.
    pub fn cap(&self, eligible: usize) -> usize {
        match *self {
            Self::Count(n) => n.min(eligible),
            Self::Percentage(pct) => {
                if eligible == 0 {
                    return 0;
                }
                let n = (eligible as f64 * pct / 100.0).floor() as usize;
                n.clamp(1, eligible)
            }
        }
    }
}

/// One facet selection inside a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacetEntry {
    /// Facet name
    pub facet: String,

    #[serde(default)]
    pub order: SampleOrder,

    #[serde(default)]
    pub limit: SampleLimit,

    /// Per-export threshold overrides; unset fields fall back to the facet
    #[serde(flatten)]
    pub overrides: ThresholdOverrides,

    /// Keys matching no field above; rejected by `validate`
    #[serde(flatten, skip_serializing)]
    pub unknown: BTreeMap<String, toml::Value>,
}

/// Override keys a facet entry accepts.
const OVERRIDE_KEYS: &str = "min_rating, max_rating, min_logprob, avg_logprob";

impl FacetEntry {
    pub fn new(facet: impl Into<String>) -> Self {
        Self {
            facet: facet.into(),
            order: SampleOrder::default(),
            limit: SampleLimit::default(),
            overrides: ThresholdOverrides::default(),
            unknown: BTreeMap::new(),
        }
    }
}

impl ExportConfig {
    /// Load configuration from a TOML file.
    ///
    /// B_i(file exists) → Result
    /// B_i(file is valid TOML) → Result
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the template for mistakes that must abort before any work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.template.name.trim().is_empty() {
            return Err(ConfigError::Invalid("template name is required".to_string()));
        }
        if self.facets.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one [[facets]] entry is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for entry in &self.facets {
            if !seen.insert(entry.facet.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "facet '{}' is selected more than once",
                    entry.facet
                )));
            }
            if let Some(key) = entry.unknown.keys().next() {
                return Err(ConfigError::Invalid(format!(
                    "facet '{}': unknown key '{}' (threshold overrides are: {OVERRIDE_KEYS})",
                    entry.facet, key
                )));
            }
            match entry.limit {
                SampleLimit::Count(0) => {
                    return Err(ConfigError::Invalid(format!(
                        "facet '{}': count limit must be greater than zero",
                        entry.facet
                    )));
                }
                SampleLimit::Percentage(p) if !(p > 0.0 && p <= 100.0) => {
                    return Err(ConfigError::Invalid(format!(
                        "facet '{}': percentage limit must be between 0 and 100",
                        entry.facet
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Resolve the output file path.
    ///
    /// An explicit path wins over `[output].dir` + filename template.
    pub fn resolve_output_path(
        &self,
        explicit: Option<&Path>,
        now: DateTime<Utc>,
    ) -> Result<PathBuf, ConfigError> {
        if let Some(path) = explicit {
            return Ok(PathBuf::from(expand_env_vars(&path.to_string_lossy())));
        }

        let dir = self
            .output
            .dir
            .as_ref()
            .ok_or(ConfigError::MissingOutputTarget)?;
        let dir = PathBuf::from(expand_env_vars(&dir.to_string_lossy()));
        let file_name = render_filename(&self.output.filename_template, &self.template.name, now);
        Ok(dir.join(file_name))
    }
}

/// Fill `{name}` and `{timestamp}` placeholders of a filename template.
pub fn render_filename(template: &str, name: &str, now: DateTime<Utc>) -> String {
    let safe_name: String = name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let rendered = template
        .replace("{name}", &safe_name)
        .replace("{timestamp}", &now.format("%Y%m%d-%H%M%S").to_string());
    expand_env_vars(&rendered)
}

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var pattern"));

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();

    for cap in ENV_VAR_RE.captures_iter(s) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}

/// Configuration errors.
///
/// Epistemic origin:
/// - B_i falsified: File not found, parse error
/// - I^B materialized: Missing required values
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid export template: {0}")]
    Invalid(String),

    #[error("No output target: pass --output or set [output].dir")]
    MissingOutputTarget,
}
