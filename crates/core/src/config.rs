use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::pool::PoolOptions;

/// Decompiler used when the config does not name one.
pub const DEFAULT_DECOMPILER: &str = "ghidra";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be a positive integer")]
    InvalidWorkerCount { field: &'static str },

    #[error("Decompiler name must not be empty")]
    EmptyDecompiler,
}

/// Settings for the Ghidra decompiler.
///
/// Unset paths fall back to the environment (`GHIDRA_HEADLESS`,
/// `GHIDRA_ANALYZE_HEADLESS`, `GHIDRA_INSTALL_DIR`) and to the bundled script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GhidraConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headless_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_path: Option<PathBuf>,
}

/// Configuration threaded through every dataset construction call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Registry key of the decompiler to use.
    pub decompiler: String,
    /// Languages to extract. Empty means every registered extractor.
    pub languages: Vec<String>,
    pub max_extractor_workers: Option<usize>,
    pub max_decompiler_workers: Option<usize>,
    pub show_progress: bool,
    pub ghidra: GhidraConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            decompiler: DEFAULT_DECOMPILER.to_string(),
            languages: Vec::new(),
            max_extractor_workers: None,
            max_decompiler_workers: None,
            show_progress: true,
            ghidra: GhidraConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_extractor_workers == Some(0) {
            return Err(ConfigError::InvalidWorkerCount { field: "max_extractor_workers" });
        }
        if self.max_decompiler_workers == Some(0) {
            return Err(ConfigError::InvalidWorkerCount { field: "max_decompiler_workers" });
        }
        if self.decompiler.trim().is_empty() {
            return Err(ConfigError::EmptyDecompiler);
        }
        Ok(())
    }

    pub fn extractor_pool(&self) -> PoolOptions {
        PoolOptions { max_workers: self.max_extractor_workers, show_progress: self.show_progress }
    }

    pub fn decompiler_pool(&self) -> PoolOptions {
        PoolOptions { max_workers: self.max_decompiler_workers, show_progress: self.show_progress }
    }
}

/// Load and validate a pipeline config from a JSON or YAML file.
pub fn load_pipeline_config(path: &Path) -> Result<PipelineConfig> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pipeline config at {}", path.display()))?;
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
    let config: PipelineConfig = if is_yaml {
        serde_yaml::from_str(&body).context("Failed to parse pipeline config YAML")?
    } else {
        serde_json::from_str(&body).context("Failed to parse pipeline config JSON")?
    };
    config.validate().with_context(|| format!("Invalid pipeline config {}", path.display()))?;
    Ok(config)
}
