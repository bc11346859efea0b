use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use codepair_core::dataset::{
    DatasetError, DecompiledCodeDataset, GenerationMode, SourceCodeDataset,
};
use codepair_core::model::{DecompiledFunction, DecompiledFunctionRecord, Function, SourceFunction};
use codepair_core::services::decompiler::{DecompileError, Decompiler, DecompilerRegistry};
use codepair_core::services::extractor::{default_extractor_registry, Transform};
use codepair_core::{Pipeline, PipelineConfig};

const A_C: &str = "int foo(void) { return 1; }\nint bar(void) { return 2; }\n";
const RENAMED_A_C: &str = "int foo_v2(void) { return 1; }\nint bar_v2(void) { return 2; }\n";

/// Decompiler that reports a fixed set of function names for every binary.
struct FakeDecompiler {
    names: Vec<String>,
    calls: Arc<AtomicUsize>,
}

impl Decompiler for FakeDecompiler {
    fn decompile(&self, path: &Path) -> Result<Vec<DecompiledFunction>, DecompileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .names
            .iter()
            .map(|name| {
                DecompiledFunction::from_json(DecompiledFunctionRecord {
                    uid: format!("{}:{name}", path.display()),
                    path: path.display().to_string(),
                    definition: format!("undefined4 {name}(void) {{ return {name}(); }}"),
                    name: name.clone(),
                    assembly: format!("{name}:\n  call {name}\n  ret"),
                    architecture: "x86_64".into(),
                })
            })
            .collect())
    }
}

struct Counters {
    built: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

fn fake_pipeline(names: &[&str]) -> (Pipeline, Counters) {
    let built = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();

    let mut decompilers = DecompilerRegistry::new();
    let (factory_built, factory_calls) = (Arc::clone(&built), Arc::clone(&calls));
    decompilers.register("fake", move |_: &PipelineConfig| {
        factory_built.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeDecompiler { names: names.clone(), calls: Arc::clone(&factory_calls) })
            as Box<dyn Decompiler>)
    });

    let config = PipelineConfig {
        decompiler: "fake".into(),
        max_extractor_workers: Some(2),
        max_decompiler_workers: Some(2),
        show_progress: false,
        ..Default::default()
    };
    let pipeline =
        Pipeline::with_registries(config, default_extractor_registry(), decompilers).unwrap();
    (pipeline, Counters { built, calls })
}

fn repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/a.c"), A_C).unwrap();
    dir
}

fn bin(dir: &Path) -> PathBuf {
    let path = dir.join("app");
    fs::write(&path, b"not really a binary").unwrap();
    path
}

/// Renames each function to `<name>_v2`, writing the change back to disk.
fn rename_transform() -> Transform {
    Arc::new(|f: SourceFunction| -> anyhow::Result<SourceFunction> {
        let renamed = format!("{}_v2", f.name());
        let definition = f.definition().replacen(f.name(), &renamed, 1);
        Ok(f.with_definition(definition, Some(&renamed), true)?)
    })
}

fn assert_spans_match(content: &str, functions: &[&SourceFunction]) {
    for f in functions {
        assert_eq!(&content[f.start_byte()..f.end_byte()], f.definition(), "span of {}", f.uid());
    }
}

fn sorted_names(dataset: &SourceCodeDataset) -> Vec<String> {
    let mut names: Vec<String> = dataset.values().map(|f| f.name().to_string()).collect();
    names.sort();
    names
}

#[test]
fn path_mode_without_transform_extracts_in_place() {
    let repo = repo();
    let (pipeline, _) = fake_pipeline(&[]);
    let dataset =
        SourceCodeDataset::from_repository(repo.path(), GenerationMode::Path, None, false, &pipeline)
            .unwrap();
    assert_eq!(dataset.len(), 2);
    let file = repo.path().join("src/a.c");
    assert!(dataset.contains(&format!("{}:foo", file.display())));
    assert_eq!(dataset.get_common_path().as_deref(), Some(file.parent().unwrap()));
}

#[test]
fn path_mode_with_transform_rewrites_original_files() {
    let repo = repo();
    let (pipeline, _) = fake_pipeline(&[]);
    let dataset = SourceCodeDataset::from_repository(
        repo.path(),
        GenerationMode::Path,
        Some(rename_transform()),
        false,
        &pipeline,
    )
    .unwrap();

    assert_eq!(sorted_names(&dataset), ["bar_v2", "foo_v2"]);
    let on_disk = fs::read_to_string(repo.path().join("src/a.c")).unwrap();
    assert_eq!(on_disk, RENAMED_A_C);
    assert_spans_match(&on_disk, &dataset.values().collect::<Vec<_>>());
}

#[test]
fn transformed_functions_can_be_edited_again() {
    let repo = repo();
    let (pipeline, _) = fake_pipeline(&[]);
    let dataset = SourceCodeDataset::from_repository(
        repo.path(),
        GenerationMode::Path,
        Some(rename_transform()),
        false,
        &pipeline,
    )
    .unwrap();

    let file = repo.path().join("src/a.c");
    let bar = dataset.get(&format!("{}:bar_v2", file.display())).unwrap();
    bar.with_definition("int bar_v2(void) { return 20; }", None, true).unwrap();
    assert_eq!(
        fs::read_to_string(&file).unwrap(),
        "int foo_v2(void) { return 1; }\nint bar_v2(void) { return 20; }\n"
    );
}

#[test]
fn transform_without_write_back_keeps_extracted_spans() {
    let repo = repo();
    let (pipeline, _) = fake_pipeline(&[]);
    let upper: Transform = Arc::new(|f: SourceFunction| -> anyhow::Result<SourceFunction> {
        Ok(f.with_definition(f.definition().to_uppercase(), None, false)?)
    });
    let dataset = SourceCodeDataset::from_repository(
        repo.path(),
        GenerationMode::Path,
        Some(upper),
        false,
        &pipeline,
    )
    .unwrap();

    assert_eq!(fs::read_to_string(repo.path().join("src/a.c")).unwrap(), A_C);
    let mut spans: Vec<(usize, usize)> =
        dataset.values().map(|f| (f.start_byte(), f.end_byte())).collect();
    spans.sort();
    assert_eq!(spans, [(0, 27), (28, 55)]);
}

#[test]
fn temp_mode_leaves_original_untouched() {
    let repo = repo();
    let (pipeline, _) = fake_pipeline(&[]);
    let dataset = SourceCodeDataset::from_repository(
        repo.path(),
        GenerationMode::Temp,
        Some(rename_transform()),
        false,
        &pipeline,
    )
    .unwrap();

    assert_eq!(sorted_names(&dataset), ["bar_v2", "foo_v2"]);
    assert_eq!(fs::read_to_string(repo.path().join("src/a.c")).unwrap(), A_C);
    for f in dataset.values() {
        assert!(!f.path().starts_with(repo.path()));
        assert!(!f.path().exists(), "scratch copy should be removed");
    }
    assert_spans_match(RENAMED_A_C, &dataset.values().collect::<Vec<_>>());
}

#[test]
fn temp_mode_can_keep_the_scratch_copy() {
    let repo = repo();
    let (pipeline, _) = fake_pipeline(&[]);
    let dataset = SourceCodeDataset::from_repository(
        repo.path(),
        GenerationMode::Temp,
        Some(rename_transform()),
        true,
        &pipeline,
    )
    .unwrap();

    let kept = dataset.values().next().unwrap().path().to_path_buf();
    assert!(kept.exists());
    let kept_content = fs::read_to_string(&kept).unwrap();
    assert_eq!(kept_content, RENAMED_A_C);
    assert_spans_match(&kept_content, &dataset.values().collect::<Vec<_>>());
    let scratch_root = kept.ancestors().nth(3).unwrap().to_path_buf();
    fs::remove_dir_all(scratch_root).unwrap();
}

#[test]
fn temp_append_mode_keeps_both_passes() {
    let repo = repo();
    let (pipeline, _) = fake_pipeline(&[]);
    let dataset = SourceCodeDataset::from_repository(
        repo.path(),
        GenerationMode::TempAppend,
        Some(rename_transform()),
        false,
        &pipeline,
    )
    .unwrap();

    assert_eq!(sorted_names(&dataset), ["bar", "bar_v2", "foo", "foo_v2"]);
    assert_eq!(fs::read_to_string(repo.path().join("src/a.c")).unwrap(), A_C);
    let originals: Vec<_> = dataset.values().filter(|f| f.path().starts_with(repo.path())).collect();
    assert_eq!(originals.len(), 2);
    assert!(originals.iter().all(|f| !f.name().ends_with("_v2")));
    assert_spans_match(A_C, &originals);
    let transformed: Vec<_> =
        dataset.values().filter(|f| !f.path().starts_with(repo.path())).collect();
    assert_eq!(transformed.len(), 2);
    assert_spans_match(RENAMED_A_C, &transformed);
}

#[cfg(unix)]
#[test]
fn symlinked_sources_are_extracted_in_every_mode() {
    let shared = tempfile::tempdir().unwrap();
    let target = shared.path().join("lib.c");
    fs::write(&target, A_C).unwrap();
    let repo = tempfile::tempdir().unwrap();
    std::os::unix::fs::symlink(&target, repo.path().join("link.c")).unwrap();
    let (pipeline, _) = fake_pipeline(&[]);

    let in_place =
        SourceCodeDataset::from_repository(repo.path(), GenerationMode::Path, None, false, &pipeline)
            .unwrap();
    assert_eq!(sorted_names(&in_place), ["bar", "foo"]);
    assert!(in_place.contains(&format!("{}:foo", repo.path().join("link.c").display())));

    let scratch = SourceCodeDataset::from_repository(
        repo.path(),
        GenerationMode::Temp,
        Some(rename_transform()),
        false,
        &pipeline,
    )
    .unwrap();
    assert_eq!(sorted_names(&scratch), ["bar_v2", "foo_v2"]);
    assert_eq!(fs::read_to_string(&target).unwrap(), A_C);
}

#[test]
fn unsupported_language_fails_before_scheduling() {
    let repo = repo();
    let (mut pipeline, _) = fake_pipeline(&[]);
    pipeline.config.languages = vec!["cobol".into()];
    let err =
        SourceCodeDataset::from_repository(repo.path(), GenerationMode::Path, None, false, &pipeline)
            .unwrap_err();
    assert!(err.to_string().contains("cobol"), "unexpected error: {err}");
}

#[test]
fn zero_binaries_fails_before_any_work() {
    let repo = repo();
    let (pipeline, counters) = fake_pipeline(&["foo"]);

    let err = DecompiledCodeDataset::from_repository(repo.path(), &[], false, &pipeline).unwrap_err();
    assert!(matches!(err, DatasetError::NoBinaries));

    let source = SourceCodeDataset::default();
    let err =
        DecompiledCodeDataset::from_source_code_dataset(&source, &[], false, &pipeline).unwrap_err();
    assert!(matches!(err, DatasetError::NoBinaries));

    assert_eq!(counters.built.load(Ordering::SeqCst), 0);
    assert_eq!(counters.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn from_repository_pairs_decompiled_functions_with_source() {
    let repo = repo();
    let bins = tempfile::tempdir().unwrap();
    let app = bin(bins.path());
    let (pipeline, counters) = fake_pipeline(&["foo", "bar", "_start", "qux"]);

    let dataset =
        DecompiledCodeDataset::from_repository(repo.path(), &[app.clone()], false, &pipeline)
            .unwrap();

    assert_eq!(counters.built.load(Ordering::SeqCst), 1);
    assert_eq!(counters.calls.load(Ordering::SeqCst), 1);
    assert_eq!(dataset.len(), 2);
    let (decompiled, group) = dataset.get(&format!("{}:foo", app.display())).unwrap();
    assert_eq!(decompiled.name(), "foo");
    let source_uid = format!("{}:foo", repo.path().join("src/a.c").display());
    assert_eq!(group.uids().collect::<Vec<_>>(), [source_uid.as_str()]);
    assert!(!dataset.contains(&format!("{}:qux", app.display())));

    let hits = dataset.lookup(&source_uid);
    assert_eq!(hits.len(), 1);
    assert_eq!(dataset.to_source_code_dataset().len(), 2);
}

#[test]
fn stripped_dataset_renames_but_keeps_keys() {
    let repo = repo();
    let bins = tempfile::tempdir().unwrap();
    let app = bin(bins.path());
    let (pipeline, _) = fake_pipeline(&["foo"]);

    let source =
        SourceCodeDataset::from_repository(repo.path(), GenerationMode::Path, None, false, &pipeline)
            .unwrap();
    let stripped =
        DecompiledCodeDataset::from_source_code_dataset(&source, &[app.clone()], true, &pipeline)
            .unwrap();
    let (function, group) = stripped.get(&format!("{}:foo", app.display())).unwrap();
    assert!(function.name().starts_with("sub_"));
    assert!(!function.definition().contains("foo"));
    assert_eq!(group.len(), 1);

    let plain =
        DecompiledCodeDataset::from_source_code_dataset(&source, &[app], false, &pipeline).unwrap();
    assert_eq!(plain.to_stripped_dataset(), stripped);
}

#[test]
fn decompiled_datasets_concatenate_by_uid() {
    let repo = repo();
    let bins = tempfile::tempdir().unwrap();
    let app = bin(bins.path());
    let (pipeline, _) = fake_pipeline(&["foo", "bar"]);
    let source =
        SourceCodeDataset::from_repository(repo.path(), GenerationMode::Path, None, false, &pipeline)
            .unwrap();

    let first =
        DecompiledCodeDataset::from_source_code_dataset(&source, &[app.clone()], false, &pipeline)
            .unwrap();
    let second = first.to_stripped_dataset();
    let merged = DecompiledCodeDataset::concat([&first, &second]);
    assert_eq!(merged.len(), 2);
    assert!(merged.values().all(|(f, _)| f.name().starts_with("sub_")));
}

#[test]
fn unknown_decompiler_is_reported_with_available_names() {
    let repo = repo();
    let bins = tempfile::tempdir().unwrap();
    let app = bin(bins.path());
    let (mut pipeline, _) = fake_pipeline(&[]);
    pipeline.config.decompiler = "ida".into();

    let err = DecompiledCodeDataset::from_repository(repo.path(), &[app], false, &pipeline)
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("ida") && message.contains("fake"), "unexpected error: {message}");
}
