//! Per-language source extractors and the pool task that runs them.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{Function, SourceFunction};
use crate::services::pool::{JobInput, PoolError, PoolOptions, PoolTask};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Unsupported language: {language} (available: {available})")]
    UnsupportedLanguage { language: String, available: String },

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Parses source files of one language into functions.
pub trait Extractor: Send + Sync {
    /// Registry key, e.g. `"c"`.
    fn language(&self) -> &str;

    /// Files under `root` this extractor would process.
    fn get_extractable_files(&self, root: &Path) -> Result<Vec<PathBuf>, ExtractError>;

    /// Functions defined in one file.
    fn extract_file(&self, file: &Path) -> Result<Vec<SourceFunction>, ExtractError>;

    /// Functions defined anywhere under `root`.
    fn extract(&self, root: &Path) -> Result<Vec<SourceFunction>, ExtractError> {
        let mut functions = Vec::new();
        for file in self.get_extractable_files(root)? {
            functions.extend(self.extract_file(&file)?);
        }
        Ok(functions)
    }
}

/// Extractors keyed by language name.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: BTreeMap<String, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self { extractors: BTreeMap::new() }
    }

    pub fn register<E: Extractor + 'static>(&mut self, extractor: E) -> &mut Self {
        self.extractors.insert(extractor.language().to_string(), Arc::new(extractor));
        self
    }

    pub fn get(&self, language: &str) -> Result<Arc<dyn Extractor>, ExtractError> {
        self.extractors.get(language).cloned().ok_or_else(|| ExtractError::UnsupportedLanguage {
            language: language.to_string(),
            available: self.names().join(", "),
        })
    }

    /// Registered languages in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.extractors.keys().cloned().collect()
    }

    /// Resolve `languages`, or every registered extractor when empty.
    fn resolve_all(
        &self,
        languages: &[String],
    ) -> Result<Vec<(String, Arc<dyn Extractor>)>, ExtractError> {
        if languages.is_empty() {
            return Ok(self.extractors.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect());
        }
        languages.iter().map(|lang| self.get(lang).map(|e| (lang.clone(), e))).collect()
    }
}

/// Registry holding the built-in extractors.
pub fn default_extractor_registry() -> ExtractorRegistry {
    let mut registry = ExtractorRegistry::new();
    registry.register(crate::services::extractors::CExtractor);
    registry
}

/// Caller-supplied rewrite applied to each extracted function, usually via
/// [`SourceFunction::with_definition`].
pub type Transform = Arc<dyn Fn(SourceFunction) -> anyhow::Result<SourceFunction> + Send + Sync>;

/// One extraction job: a single file handled by a single language's extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionJob {
    pub language: String,
    pub file: PathBuf,
}

impl JobInput for ExtractionJob {
    fn identity(&self) -> String {
        format!("{} [{}]", self.file.display(), self.language)
    }
}

#[derive(Clone, Default)]
pub struct ExtractOptions {
    /// Empty means every registered language.
    pub languages: Vec<String>,
    pub pool: PoolOptions,
    pub transform: Option<Transform>,
}

/// Extract `root` with each language in turn and concatenate the results.
pub fn extract(
    root: &Path,
    languages: &[String],
    registry: &ExtractorRegistry,
) -> Result<Vec<SourceFunction>, ExtractError> {
    let mut functions = Vec::new();
    for (language, extractor) in registry.resolve_all(languages)? {
        let found = extractor.extract(root)?;
        debug!(language = %language, functions = found.len(), "extracted");
        functions.extend(found);
    }
    Ok(functions)
}

/// Build (without running) a pool task with one job per extractable file.
///
/// Every language is resolved before any job is created, so an unsupported
/// language fails here. When a transform is given it runs inside the file's
/// job, from the last function in the file to the first, and the returned
/// spans are shifted to match the file once all of its rewrites are done.
pub fn extraction_task(
    root: &Path,
    options: &ExtractOptions,
    registry: &ExtractorRegistry,
) -> Result<PoolTask<ExtractionJob, SourceFunction>, ExtractError> {
    let resolved = registry.resolve_all(&options.languages)?;
    let mut jobs = Vec::new();
    for (language, extractor) in &resolved {
        jobs.extend(
            extractor
                .get_extractable_files(root)?
                .into_iter()
                .map(|file| ExtractionJob { language: language.clone(), file }),
        );
    }
    info!(root = %root.display(), jobs = jobs.len(), "scheduling extraction");

    let extractors: HashMap<String, Arc<dyn Extractor>> = resolved.into_iter().collect();
    let transform = options.transform.clone();
    let task = PoolTask::new("Extracting functions", jobs, options.pool, move |job: &ExtractionJob| {
        let extractor = extractors
            .get(&job.language)
            .ok_or_else(|| anyhow!("no extractor for {}", job.language))?;
        let functions = extractor.extract_file(&job.file)?;
        match &transform {
            Some(transform) => transform_file(&job.file, functions, transform.as_ref()),
            None => Ok(functions),
        }
    })?;
    Ok(task)
}

/// Apply `transform` to one file's functions, last to first, and return them
/// in file order with spans that match the file after every rewrite.
///
/// Each call's change in file length moves every function after it, so
/// records transformed earlier (later in the file) are shifted by the total
/// growth of the rewrites that ran after them.
fn transform_file(
    file: &Path,
    mut functions: Vec<SourceFunction>,
    transform: &(dyn Fn(SourceFunction) -> anyhow::Result<SourceFunction> + Send + Sync),
) -> anyhow::Result<Vec<SourceFunction>> {
    let file_len = || -> anyhow::Result<isize> {
        let len = fs::metadata(file)
            .with_context(|| format!("Failed to stat {}", file.display()))?
            .len();
        isize::try_from(len).with_context(|| format!("{} is too large", file.display()))
    };

    functions.sort_by(|a, b| b.start_byte().cmp(&a.start_byte()));
    let mut growth = 0isize;
    let mut rewritten = Vec::with_capacity(functions.len());
    for function in functions {
        let before = file_len()?;
        let function = transform(function)?;
        growth += file_len()? - before;
        rewritten.push((function, growth));
    }

    rewritten
        .into_iter()
        .rev()
        .map(|(function, growth_so_far)| {
            let uid = function.uid().to_string();
            function
                .shifted(growth - growth_so_far)
                .ok_or_else(|| anyhow!("span of {uid} moved outside {}", file.display()))
        })
        .collect()
}
