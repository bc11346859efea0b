use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use goblin::Object;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::model::DecompiledFunction;
use crate::services::pool::{PoolError, PoolTask};

#[derive(Debug, Error)]
pub enum DecompileError {
    /// No decompiler is registered under the configured name.
    #[error("Decompiler not found: {name} (available: {available})")]
    NotFound { name: String, available: String },

    /// The decompiler exists but its external tool is not configured.
    #[error("Decompiler {name} is not configured: {reason}")]
    Unconfigured { name: String, reason: String },

    #[error("Binary not found at {}", .0.display())]
    MissingBinary(PathBuf),

    #[error("{tool} command failed ({status}): {stderr}")]
    Tool { tool: String, status: String, stderr: String },

    #[error("{tool} produced malformed output ({reason}); tool stdout: {stdout}")]
    MalformedOutput { tool: String, reason: String, stdout: String },

    #[error("Decompiler I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// A decompiler turns one binary into the functions it contains.
pub trait Decompiler: Send + Sync {
    fn decompile(&self, path: &Path) -> Result<Vec<DecompiledFunction>, DecompileError>;
}

/// Builds a decompiler from the pipeline config. Construction may fail when
/// the external tool is not configured.
pub type DecompilerFactory =
    Arc<dyn Fn(&PipelineConfig) -> Result<Box<dyn Decompiler>, DecompileError> + Send + Sync>;

/// Decompiler factories keyed by the name used in `PipelineConfig::decompiler`.
#[derive(Clone, Default)]
pub struct DecompilerRegistry {
    factories: HashMap<String, DecompilerFactory>,
}

impl DecompilerRegistry {
    pub fn new() -> Self {
        Self { factories: HashMap::new() }
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&PipelineConfig) -> Result<Box<dyn Decompiler>, DecompileError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Instantiate the decompiler registered as `name`.
    pub fn resolve(
        &self,
        name: &str,
        config: &PipelineConfig,
    ) -> Result<Box<dyn Decompiler>, DecompileError> {
        let factory = self.factories.get(name).ok_or_else(|| DecompileError::NotFound {
            name: name.to_string(),
            available: self.names().join(", "),
        })?;
        info!(decompiler = name, "using decompiler");
        factory(config)
    }

    /// Sorted registered names, for help output and error messages.
    pub fn names(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.factories.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Registry holding the built-in decompilers.
pub fn default_decompiler_registry() -> DecompilerRegistry {
    let mut registry = DecompilerRegistry::new();
    registry.register("ghidra", |config: &PipelineConfig| {
        let ghidra = crate::services::decompilers::Ghidra::from_config(&config.ghidra)?;
        Ok(Box::new(ghidra) as Box<dyn Decompiler>)
    });
    registry
}

/// True if the file parses as an object format (ELF, PE, Mach-O, archive).
pub fn is_binary(path: &Path) -> bool {
    let Ok(bytes) = fs::read(path) else {
        return false;
    };
    matches!(Object::parse(&bytes), Ok(obj) if !matches!(obj, Object::Unknown(_)))
}

/// Expand the inputs into binary paths. Directories contribute their direct
/// children that are recognized as binaries; files are taken as given.
pub fn collect_binaries(paths: &[PathBuf]) -> Result<Vec<PathBuf>, DecompileError> {
    let mut bins = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut children: Vec<PathBuf> = fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|child| child.is_file() && is_binary(child))
                .collect();
            children.sort();
            debug!(dir = %path.display(), binaries = children.len(), "scanned directory");
            bins.extend(children);
        } else {
            bins.push(path.clone());
        }
    }
    Ok(bins)
}

/// Build (without running) a pool task that decompiles every input binary,
/// one job per binary.
pub fn decompile_task(
    paths: &[PathBuf],
    config: &PipelineConfig,
    registry: &DecompilerRegistry,
) -> Result<PoolTask<PathBuf, DecompiledFunction>, DecompileError> {
    let decompiler: Arc<dyn Decompiler> = Arc::from(registry.resolve(&config.decompiler, config)?);
    let bins = collect_binaries(paths)?;
    info!(binaries = bins.len(), "scheduling decompilation");
    let task =
        PoolTask::new("Decompiling binaries", bins, config.decompiler_pool(), move |bin: &PathBuf| {
            debug!(binary = %bin.display(), "decompiling");
            Ok(decompiler.decompile(bin)?)
        })?;
    Ok(task)
}

/// Decompile one binary, several binaries, or directories of binaries.
///
/// Results are flattened in input order.
pub fn decompile(
    paths: &[PathBuf],
    config: &PipelineConfig,
    registry: &DecompilerRegistry,
) -> Result<Vec<DecompiledFunction>, DecompileError> {
    Ok(decompile_task(paths, config, registry)?.run()?)
}
