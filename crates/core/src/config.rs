use serde::Deserialize;
use std::path::Path;

use crate::error::{AttributionError, AttributionResult};

/// Root application configuration. Loaded from an optional TOML file and
/// environment variables with the prefix `CHAIN_ATTRIBUTION__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_input_path")]
    pub input_path: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default)]
    pub chains: ChainConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// Max day gap between purchases for two chains to be merged.
    #[serde(default = "default_merge_threshold_days")]
    pub merge_threshold_days: i64,
    /// Max day gap for an earlier chain's touchpoints to be prefixed onto a later one.
    #[serde(default = "default_concat_threshold_days")]
    pub concat_threshold_days: i64,
    #[serde(default = "default_concat_chains")]
    pub concat_chains: bool,
    /// Process customers on the rayon thread pool.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_path_separator")]
    pub path_separator: String,
    #[serde(default)]
    pub solver: SolverKind,
    #[serde(default = "default_markov_max_iterations")]
    pub markov_max_iterations: usize,
    #[serde(default = "default_markov_tolerance")]
    pub markov_tolerance: f64,
}

/// Which attribution solver consumes the compact path table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    #[default]
    Markov,
    FirstTouch,
    LastTouch,
    Linear,
    PositionBased,
    TimeDecay,
}

// Default functions
fn default_input_path() -> String {
    "data/attribution_events.json".to_string()
}
fn default_output_dir() -> String {
    "data".to_string()
}
fn default_merge_threshold_days() -> i64 {
    3
}
fn default_concat_threshold_days() -> i64 {
    10
}
fn default_concat_chains() -> bool {
    true
}
fn default_parallel() -> bool {
    true
}
fn default_path_separator() -> String {
    ">".to_string()
}
fn default_markov_max_iterations() -> usize {
    10_000
}
fn default_markov_tolerance() -> f64 {
    1e-10
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            merge_threshold_days: default_merge_threshold_days(),
            concat_threshold_days: default_concat_threshold_days(),
            concat_chains: default_concat_chains(),
            parallel: default_parallel(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path_separator: default_path_separator(),
            solver: SolverKind::default(),
            markov_max_iterations: default_markov_max_iterations(),
            markov_tolerance: default_markov_tolerance(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            input_path: default_input_path(),
            output_dir: default_output_dir(),
            chains: ChainConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file, overlaid with
    /// environment variables, then validate it.
    pub fn load(file: Option<&Path>) -> AttributionResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("CHAIN_ATTRIBUTION")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| AttributionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AttributionResult<()> {
        if self.chains.merge_threshold_days < 0 {
            return Err(AttributionError::Config(format!(
                "merge_threshold_days must be non-negative, got {}",
                self.chains.merge_threshold_days
            )));
        }
        if self.chains.concat_threshold_days < 0 {
            return Err(AttributionError::Config(format!(
                "concat_threshold_days must be non-negative, got {}",
                self.chains.concat_threshold_days
            )));
        }
        if self.report.path_separator.is_empty() {
            return Err(AttributionError::Config(
                "path_separator must not be empty".to_string(),
            ));
        }
        if self.report.markov_max_iterations == 0 || self.report.markov_tolerance <= 0.0 {
            return Err(AttributionError::Config(
                "markov_max_iterations and markov_tolerance must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_pipeline_thresholds() {
        let config = AppConfig::default();
        assert_eq!(config.chains.merge_threshold_days, 3);
        assert_eq!(config.chains.concat_threshold_days, 10);
        assert!(config.chains.concat_chains);
        assert_eq!(config.report.path_separator, ">");
        assert_eq!(config.report.solver, SolverKind::Markov);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let mut config = AppConfig::default();
        config.chains.merge_threshold_days = -1;
        assert!(matches!(
            config.validate(),
            Err(AttributionError::Config(_))
        ));
    }

    #[test]
    fn test_partial_section_uses_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{"input_path": "events.json", "chains": {"concat_chains": false}, "report": {"solver": "last_touch"}}"#,
        )
        .unwrap();
        assert_eq!(config.input_path, "events.json");
        assert_eq!(config.output_dir, "data");
        assert!(!config.chains.concat_chains);
        assert_eq!(config.chains.merge_threshold_days, 3);
        assert_eq!(config.report.solver, SolverKind::LastTouch);
    }
}
