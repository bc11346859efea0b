//! Source and decompiled function datasets.
//!
//! - [`SourceCodeDataset`]: uid -> source function, built from one or two
//!   extraction passes over a repository.
//! - [`DecompiledCodeDataset`]: decompiled uid -> (decompiled function, group
//!   of candidate source functions), built by [`matching`].
//! - [`export`]: tabular export by file extension.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use thiserror::Error;
use tracing::info;
use walkdir::WalkDir;

use crate::services::decompiler::DecompileError;
use crate::services::extractor::ExtractError;
use crate::services::pool::PoolError;

pub mod decompiled;
pub mod export;
pub mod matching;
pub mod source;

pub use decompiled::DecompiledCodeDataset;
pub use export::{ExportError, Table};
pub use source::SourceCodeDataset;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Must specify at least one binary")]
    NoBinaries,

    #[error("Unknown generation mode: {0} (expected path, temp, or temp-append)")]
    UnknownMode(String),

    #[error("Failed to prepare scratch copy of {}: {source}", .path.display())]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Decompile(#[from] DecompileError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Anything that can be flattened into a table and exported.
pub trait Dataset {
    fn to_table(&self) -> Table;

    /// Export by file extension (see [`export::save_table`]).
    fn save_as(&self, path: &Path) -> Result<(), ExportError> {
        export::save_table(&self.to_table(), path)
    }
}

/// Where source extraction reads (and transforms write).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationMode {
    /// Extract the tree in place; transforms write back into the original files.
    Path,
    /// Extract a scratch copy so the original tree is never touched.
    #[default]
    Temp,
    /// Extract the original tree and a transformed scratch copy side by side
    /// and keep both sets of functions.
    TempAppend,
}

impl GenerationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMode::Path => "path",
            GenerationMode::Temp => "temp",
            GenerationMode::TempAppend => "temp-append",
        }
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationMode {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "path" => Ok(GenerationMode::Path),
            "temp" => Ok(GenerationMode::Temp),
            "temp-append" => Ok(GenerationMode::TempAppend),
            other => Err(DatasetError::UnknownMode(other.to_string())),
        }
    }
}

/// Scratch copy of a repository, removed on drop unless kept.
pub(crate) enum ScratchCopy {
    Owned { _dir: TempDir, root: PathBuf },
    Kept { root: PathBuf },
}

impl ScratchCopy {
    pub(crate) fn create(repo: &Path, keep: bool) -> Result<Self, DatasetError> {
        let scratch_err = |source| DatasetError::Scratch { path: repo.to_path_buf(), source };
        let dir = tempfile::Builder::new().prefix("codepair-repo-").tempdir().map_err(scratch_err)?;
        let name = repo.file_name().map(|n| n.to_os_string()).unwrap_or_else(|| "repo".into());
        let root = dir.path().join(name);
        copy_tree(repo, &root).map_err(scratch_err)?;
        if keep {
            let kept = dir.keep();
            info!(path = %kept.display(), "keeping scratch copy");
            Ok(ScratchCopy::Kept { root })
        } else {
            Ok(ScratchCopy::Owned { _dir: dir, root })
        }
    }

    pub(crate) fn root(&self) -> &Path {
        match self {
            ScratchCopy::Owned { root, .. } | ScratchCopy::Kept { root } => root,
        }
    }
}

/// Copy `from` into `to`. Symlinks are followed, so the copy holds regular
/// files and edits to it never reach a link target.
fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    for entry in WalkDir::new(from).follow_links(true) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
