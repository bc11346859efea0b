use crate::config::{ConfigError, PipelineConfig};
use crate::services::decompiler::{default_decompiler_registry, DecompilerRegistry};
use crate::services::extractor::{default_extractor_registry, ExtractOptions, ExtractorRegistry, Transform};

/// Validated config bundled with the registries every dataset builder needs.
#[derive(Clone)]
pub struct Pipeline {
    pub config: PipelineConfig,
    pub extractors: ExtractorRegistry,
    pub decompilers: DecompilerRegistry,
}

impl Pipeline {
    /// Validate `config` and pair it with the built-in extractors and decompilers.
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        Self::with_registries(config, default_extractor_registry(), default_decompiler_registry())
    }

    /// Same as [`Pipeline::new`] with caller-supplied registries.
    pub fn with_registries(
        config: PipelineConfig,
        extractors: ExtractorRegistry,
        decompilers: DecompilerRegistry,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, extractors, decompilers })
    }

    pub fn extract_options(&self, transform: Option<Transform>) -> ExtractOptions {
        ExtractOptions {
            languages: self.config.languages.clone(),
            pool: self.config.extractor_pool(),
            transform,
        }
    }
}
