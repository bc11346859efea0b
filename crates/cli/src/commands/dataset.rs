use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use codepair_core::dataset::{Dataset, DecompiledCodeDataset, GenerationMode, SourceCodeDataset};
use codepair_core::services::decompiler::decompile;
use codepair_core::Pipeline;
use tracing::info;

use crate::{canonicalize_or_current, load_config};

fn pipeline(config: Option<&str>) -> Result<Pipeline> {
    let config = load_config(config.map(Path::new))?;
    Pipeline::new(config).context("Invalid pipeline config")
}

fn existing_dir(repo: &str) -> Result<PathBuf> {
    let path = canonicalize_or_current(repo)?;
    if !path.is_dir() {
        return Err(anyhow!("Repository directory does not exist: {}", path.display()));
    }
    Ok(path)
}

fn binary_paths(bins: &[String]) -> Result<Vec<PathBuf>> {
    bins.iter().map(|b| canonicalize_or_current(b)).collect()
}

/// Extract every function under `repo` and export the dataset to `out`.
pub fn extract_command(
    repo: &str,
    out: &str,
    mode: &str,
    keep_temp: bool,
    config: Option<&str>,
) -> Result<()> {
    let pipeline = pipeline(config)?;
    let repo = existing_dir(repo)?;
    let mode: GenerationMode = mode.parse()?;

    let dataset = SourceCodeDataset::from_repository(&repo, mode, None, keep_temp, &pipeline)
        .with_context(|| format!("Failed to extract {}", repo.display()))?;
    dataset.save_as(Path::new(out)).with_context(|| format!("Failed to export to {out}"))?;

    info!(functions = dataset.len(), out, "extraction complete");
    println!("Extracted {} functions from {} -> {}", dataset.len(), repo.display(), out);
    Ok(())
}

/// Decompile binaries (or directories of binaries) and write the functions as JSON records.
pub fn decompile_command(bins: &[String], out: &str, config: Option<&str>) -> Result<()> {
    let pipeline = pipeline(config)?;
    let paths = binary_paths(bins)?;
    if paths.is_empty() {
        return Err(anyhow!("Must specify at least one binary"));
    }

    let functions = decompile(&paths, &pipeline.config, &pipeline.decompilers)
        .context("Decompilation failed")?;
    fs::write(out, serde_json::to_string_pretty(&functions)?)
        .with_context(|| format!("Failed to write {out}"))?;

    println!("Decompiled {} functions from {} input(s) -> {}", functions.len(), paths.len(), out);
    Ok(())
}

/// Extract `repo`, decompile `bins`, pair the two, and export the result to `out`.
pub fn build_command(
    repo: &str,
    bins: &[String],
    out: &str,
    stripped: bool,
    config: Option<&str>,
) -> Result<()> {
    let pipeline = pipeline(config)?;
    let repo = existing_dir(repo)?;
    let paths = binary_paths(bins)?;

    let dataset = DecompiledCodeDataset::from_repository(&repo, &paths, stripped, &pipeline)
        .with_context(|| format!("Failed to build dataset for {}", repo.display()))?;
    dataset.save_as(Path::new(out)).with_context(|| format!("Failed to export to {out}"))?;

    println!("Paired {} decompiled functions -> {}", dataset.len(), out);
    Ok(())
}
