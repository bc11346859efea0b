use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::info;

use crate::dataset::{Dataset, DatasetError, GenerationMode, ScratchCopy, Table};
use crate::model::{Function, SourceFunction};
use crate::pipeline::Pipeline;
use crate::services::extractor::{extraction_task, Transform};
use crate::services::pool::{PoolCoordinator, ResultSink};

/// Ordered mapping from uid to source function.
///
/// Lookups are by uid; iteration follows first-insertion order. On a
/// duplicate uid the later function replaces the earlier one in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceCodeDataset {
    functions: Vec<SourceFunction>,
    index: HashMap<String, usize>,
}

impl SourceCodeDataset {
    pub fn new(functions: impl IntoIterator<Item = SourceFunction>) -> Self {
        let mut dataset = Self::default();
        for function in functions {
            match dataset.index.get(function.uid()) {
                Some(&slot) => dataset.functions[slot] = function,
                None => {
                    dataset.index.insert(function.uid().to_string(), dataset.functions.len());
                    dataset.functions.push(function);
                }
            }
        }
        dataset
    }

    pub fn get(&self, uid: &str) -> Option<&SourceFunction> {
        self.index.get(uid).map(|&slot| &self.functions[slot])
    }

    /// Look up the entry stored under `function`'s uid.
    pub fn get_function(&self, function: &SourceFunction) -> Option<&SourceFunction> {
        self.get(function.uid())
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.index.contains_key(uid)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn uids(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(|f| f.uid())
    }

    pub fn values(&self) -> impl Iterator<Item = &SourceFunction> {
        self.functions.iter()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SourceFunction)> {
        self.functions.iter().map(|f| (f.uid(), f))
    }

    /// Deepest directory containing every function's file, or `None` when
    /// empty or when the paths share no ancestor.
    pub fn get_common_path(&self) -> Option<PathBuf> {
        let mut paths = self.functions.iter().map(|f| f.path());
        let mut common: PathBuf = paths.next()?.to_path_buf();
        for path in paths {
            while !path.starts_with(&common) {
                if !common.pop() {
                    return None;
                }
            }
        }
        if self.functions.iter().all(|f| f.path() == common) {
            common.pop();
        }
        (!common.as_os_str().is_empty()).then_some(common)
    }

    /// Union of several datasets; later datasets win on duplicate uids.
    pub fn concat<'a>(datasets: impl IntoIterator<Item = &'a SourceCodeDataset>) -> Self {
        Self::new(datasets.into_iter().flat_map(|d| d.functions.iter().cloned()))
    }

    /// Extract a repository into a dataset.
    ///
    /// - `Path`: extract in place; a transform writes back into the original files.
    /// - `Temp`: with a transform, extract and transform a scratch copy so the
    ///   original stays untouched. Without one nothing is written, so the tree
    ///   is extracted directly.
    /// - `TempAppend`: with a transform, extract the original tree and a
    ///   transformed scratch copy concurrently and keep both passes. Without
    ///   one it behaves like `Path`.
    ///
    /// Scratch copies are deleted afterwards unless `keep_temp` is set.
    /// Functions from a scratch pass carry scratch paths (and uids).
    pub fn from_repository(
        path: &Path,
        mode: GenerationMode,
        transform: Option<Transform>,
        keep_temp: bool,
        pipeline: &Pipeline,
    ) -> Result<Self, DatasetError> {
        info!(repo = %path.display(), %mode, transformed = transform.is_some(), "building source dataset");
        match (mode, transform) {
            (GenerationMode::TempAppend, Some(transform)) => {
                let original = extraction_task(path, &pipeline.extract_options(None), &pipeline.extractors)?;
                let scratch = ScratchCopy::create(path, keep_temp)?;
                let modified = extraction_task(
                    scratch.root(),
                    &pipeline.extract_options(Some(transform)),
                    &pipeline.extractors,
                )?;

                let original_sink = ResultSink::new();
                let modified_sink = ResultSink::new();
                PoolCoordinator::new(pipeline.config.show_progress)
                    .add(original, &original_sink)
                    .add(modified, &modified_sink)
                    .run()?;
                Ok(Self::new(original_sink.into_vec().into_iter().chain(modified_sink.into_vec())))
            }
            (GenerationMode::Temp, Some(transform)) => {
                let scratch = ScratchCopy::create(path, keep_temp)?;
                let task = extraction_task(
                    scratch.root(),
                    &pipeline.extract_options(Some(transform)),
                    &pipeline.extractors,
                )?;
                Ok(Self::new(task.run()?))
            }
            (_, transform) => {
                let task = extraction_task(path, &pipeline.extract_options(transform), &pipeline.extractors)?;
                Ok(Self::new(task.run()?))
            }
        }
    }
}

impl FromIterator<SourceFunction> for SourceCodeDataset {
    fn from_iter<I: IntoIterator<Item = SourceFunction>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl<'a> IntoIterator for &'a SourceCodeDataset {
    type Item = &'a SourceFunction;
    type IntoIter = std::slice::Iter<'a, SourceFunction>;

    fn into_iter(self) -> Self::IntoIter {
        self.functions.iter()
    }
}

impl Dataset for SourceCodeDataset {
    fn to_table(&self) -> Table {
        let columns =
            ["uid", "path", "language", "name", "class_name", "start_byte", "end_byte", "definition"];
        let rows = self
            .functions
            .iter()
            .map(|f| {
                vec![
                    Value::from(f.uid()),
                    Value::from(f.path().to_string_lossy().to_string()),
                    Value::from(f.language()),
                    Value::from(f.name()),
                    f.class_name().map_or(Value::Null, Value::from),
                    Value::from(f.start_byte()),
                    Value::from(f.end_byte()),
                    Value::from(f.definition()),
                ]
            })
            .collect();
        Table::new(columns, rows)
    }
}
