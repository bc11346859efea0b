use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::info;

use crate::dataset::matching::match_functions;
use crate::dataset::{Dataset, DatasetError, SourceCodeDataset, Table};
use crate::model::{DecompiledFunction, Function};
use crate::pipeline::Pipeline;
use crate::services::decompiler::{decompile, decompile_task};
use crate::services::extractor::extraction_task;
use crate::services::pool::{PoolCoordinator, ResultSink};

/// A decompiled function and the source functions it was matched to.
pub type DecompiledEntry = (DecompiledFunction, SourceCodeDataset);

/// Mapping from decompiled uid to (decompiled function, candidate source group).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecompiledCodeDataset {
    entries: Vec<DecompiledEntry>,
    index: HashMap<String, usize>,
}

impl DecompiledCodeDataset {
    /// Build from pairs; a later pair replaces an earlier one with the same uid.
    pub fn new(entries: impl IntoIterator<Item = DecompiledEntry>) -> Self {
        let mut dataset = Self::default();
        for entry in entries {
            match dataset.index.get(entry.0.uid()) {
                Some(&slot) => dataset.entries[slot] = entry,
                None => {
                    dataset.index.insert(entry.0.uid().to_string(), dataset.entries.len());
                    dataset.entries.push(entry);
                }
            }
        }
        dataset
    }

    pub fn get(&self, uid: &str) -> Option<&DecompiledEntry> {
        self.index.get(uid).map(|&slot| &self.entries[slot])
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.index.contains_key(uid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &DecompiledEntry> {
        self.entries.iter()
    }

    /// Every entry whose source group contains `source_uid`.
    pub fn lookup(&self, source_uid: &str) -> Vec<&DecompiledEntry> {
        self.entries.iter().filter(|(_, group)| group.contains(source_uid)).collect()
    }

    /// All source functions referenced by any entry.
    pub fn to_source_code_dataset(&self) -> SourceCodeDataset {
        SourceCodeDataset::new(self.entries.iter().flat_map(|(_, group)| group.values().cloned()))
    }

    /// Copy with every decompiled function replaced by its stripped variant.
    pub fn to_stripped_dataset(&self) -> Self {
        Self::new(self.entries.iter().map(|(d, group)| (d.to_stripped(), group.clone())))
    }

    /// Union of several datasets; later datasets win on duplicate uids.
    pub fn concat<'a>(datasets: impl IntoIterator<Item = &'a DecompiledCodeDataset>) -> Self {
        Self::new(datasets.into_iter().flat_map(|d| d.entries.iter().cloned()))
    }

    /// Decompile `bins` and match the result against an existing source dataset.
    pub fn from_source_code_dataset(
        dataset: &SourceCodeDataset,
        bins: &[PathBuf],
        stripped: bool,
        pipeline: &Pipeline,
    ) -> Result<Self, DatasetError> {
        if bins.is_empty() {
            return Err(DatasetError::NoBinaries);
        }
        let decompiled = decompile(bins, &pipeline.config, &pipeline.decompilers)?;
        Ok(match_functions(dataset, decompiled, stripped))
    }

    /// Extract `path` and decompile `bins` concurrently, then match.
    ///
    /// Fails with [`DatasetError::NoBinaries`] before scheduling anything when
    /// `bins` is empty.
    pub fn from_repository(
        path: &Path,
        bins: &[PathBuf],
        stripped: bool,
        pipeline: &Pipeline,
    ) -> Result<Self, DatasetError> {
        if bins.is_empty() {
            return Err(DatasetError::NoBinaries);
        }
        info!(repo = %path.display(), binaries = bins.len(), stripped, "building decompiled dataset");
        let extraction = extraction_task(path, &pipeline.extract_options(None), &pipeline.extractors)?;
        let decompilation = decompile_task(bins, &pipeline.config, &pipeline.decompilers)?;

        let source_sink = ResultSink::new();
        let decompiled_sink = ResultSink::new();
        PoolCoordinator::new(pipeline.config.show_progress)
            .add(extraction, &source_sink)
            .add(decompilation, &decompiled_sink)
            .run()?;

        let source = SourceCodeDataset::new(source_sink.into_vec());
        Ok(match_functions(&source, decompiled_sink.into_vec(), stripped))
    }
}

impl FromIterator<DecompiledEntry> for DecompiledCodeDataset {
    fn from_iter<I: IntoIterator<Item = DecompiledEntry>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl Dataset for DecompiledCodeDataset {
    fn to_table(&self) -> Table {
        let columns = [
            "uid",
            "path",
            "name",
            "architecture",
            "definition",
            "assembly",
            "source_uids",
            "source_definitions",
        ];
        let rows = self
            .entries
            .iter()
            .map(|(d, group)| {
                vec![
                    Value::from(d.uid()),
                    Value::from(d.path().to_string_lossy().to_string()),
                    Value::from(d.name()),
                    Value::from(d.architecture()),
                    Value::from(d.definition()),
                    Value::from(d.assembly()),
                    Value::from(group.uids().collect::<Vec<_>>()),
                    Value::from(group.values().map(|f| f.definition()).collect::<Vec<_>>()),
                ]
            })
            .collect();
        Table::new(columns, rows)
    }
}
