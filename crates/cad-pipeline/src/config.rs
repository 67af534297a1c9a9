use std::path::{Path, PathBuf};

use cad_intent::SemanticParserConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_TESSELLATION_TOLERANCE: f64 = 0.1;
pub const DEFAULT_MAX_GRID_RESOLUTION: usize = 128;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    /// Chord tolerance in millimetres used when a solid has to become a mesh.
    pub tessellation_tolerance: f64,
    pub max_grid_resolution: usize,
    pub semantic: SemanticParserConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            tessellation_tolerance: DEFAULT_TESSELLATION_TOLERANCE,
            max_grid_resolution: DEFAULT_MAX_GRID_RESOLUTION,
            semantic: SemanticParserConfig::default(),
        }
    }
}

/// `~/clawd/cad-output`, or `./cad-output` when there is no home directory.
pub fn default_output_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("clawd").join("cad-output"))
        .unwrap_or_else(|| PathBuf::from("cad-output"))
}

fn expand_home(raw: &str) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(raw)),
        None => PathBuf::from(raw),
    }
}

impl PipelineConfig {
    /// Reads `CAD_*` variables from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset or blank keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(dir) = get("CAD_OUTPUT_DIR") {
            config.output_dir = expand_home(dir.trim());
        }
        if let Some(raw) = get("CAD_TESSELLATION_TOLERANCE") {
            match raw.trim().parse::<f64>() {
                Ok(value) if value.is_finite() && value > 0.0 => {
                    config.tessellation_tolerance = value;
                }
                _ => warn!(value = %raw, "ignoring invalid CAD_TESSELLATION_TOLERANCE"),
            }
        }
        if let Some(endpoint) = get("CAD_SEMANTIC_ENDPOINT") {
            config.semantic.endpoint = Some(endpoint);
        }
        if let Some(model) = get("CAD_SEMANTIC_MODEL") {
            config.semantic.model = model;
        }
        if let Some(key) = get("CAD_SEMANTIC_API_KEY") {
            config.semantic.api_key = Some(key);
        }
        config
    }

    pub fn with_output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.output_dir = dir.as_ref().to_path_buf();
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::PipelineConfig;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = PipelineConfig::from_lookup(lookup(&[]));
        assert_eq!(config.tessellation_tolerance, 0.1);
        assert_eq!(config.max_grid_resolution, 128);
        assert_eq!(config.semantic.timeout_secs, 30);
        assert!(config.semantic.endpoint.is_none());
        assert!(config.output_dir.ends_with("cad-output"));
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("CAD_OUTPUT_DIR", "/tmp/parts"),
            ("CAD_TESSELLATION_TOLERANCE", "0.25"),
            ("CAD_SEMANTIC_ENDPOINT", "http://localhost:1234/v1/chat/completions"),
            ("CAD_SEMANTIC_MODEL", "local-model"),
            ("CAD_SEMANTIC_API_KEY", "secret"),
        ]));
        assert_eq!(config.output_dir.to_str(), Some("/tmp/parts"));
        assert_eq!(config.tessellation_tolerance, 0.25);
        assert_eq!(config.semantic.model, "local-model");
        assert_eq!(config.semantic.api_key.as_deref(), Some("secret"));
        assert!(config.semantic.endpoint.is_some());
    }

    #[test]
    fn invalid_or_blank_values_are_ignored() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("CAD_TESSELLATION_TOLERANCE", "-1"),
            ("CAD_SEMANTIC_ENDPOINT", "   "),
        ]));
        assert_eq!(config.tessellation_tolerance, 0.1);
        assert!(config.semantic.endpoint.is_none());
    }
}
