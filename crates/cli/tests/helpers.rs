use std::fs;

use codepair::{canonicalize_or_current, load_config, verbosity_filter};
use tempfile::tempdir;

#[test]
fn canonicalize_or_current_resolves_existing_path() {
    let tmp = tempdir().expect("tempdir");
    let subdir = tmp.path().join("nested");
    fs::create_dir_all(&subdir).expect("create nested");

    let result = canonicalize_or_current(subdir.to_str().unwrap()).expect("canonicalize nested");
    assert_eq!(result, subdir.canonicalize().expect("canonicalize subdir"));
}

#[test]
fn canonicalize_or_current_joins_missing_path_onto_cwd() {
    let result = canonicalize_or_current("does/not/exist").expect("fallback path");
    assert!(result.is_absolute());
    assert!(result.ends_with("does/not/exist"));
}

#[test]
fn verbosity_maps_to_filter_levels() {
    assert_eq!(verbosity_filter(0), "warn");
    assert_eq!(verbosity_filter(1), "info");
    assert_eq!(verbosity_filter(2), "debug");
    assert_eq!(verbosity_filter(7), "debug");
}

#[test]
fn load_config_defaults_without_a_file() {
    let config = load_config(None).expect("default config");
    assert_eq!(config.decompiler, "ghidra");
    assert!(config.show_progress);
}

#[test]
fn load_config_reports_missing_file() {
    let tmp = tempdir().expect("tempdir");
    let err = load_config(Some(tmp.path().join("missing.json").as_path())).unwrap_err();
    assert!(err.to_string().contains("Failed to read pipeline config"));
}
