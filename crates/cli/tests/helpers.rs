use std::fs;

use flowguard::{canonicalize_or_current, sha256_file, verbosity_filter};
use tempfile::tempdir;

#[test]
fn canonicalize_or_current_returns_cwd_for_dot() {
    let cwd = std::env::current_dir().expect("cwd");
    assert_eq!(canonicalize_or_current(".").expect("canonicalize"), cwd);
}

#[test]
fn canonicalize_or_current_resolves_existing_path() {
    let tmp = tempdir().expect("tempdir");
    let file = tmp.path().join("module.json");
    fs::write(&file, "{}").expect("write");
    let resolved = canonicalize_or_current(file.to_str().expect("utf8 path")).expect("resolve");
    assert_eq!(resolved, file.canonicalize().expect("canon"));
}

#[test]
fn canonicalize_or_current_joins_missing_relative_path() {
    let cwd = std::env::current_dir().expect("cwd");
    let resolved = canonicalize_or_current("does/not/exist.json").expect("resolve");
    assert_eq!(resolved, cwd.join("does/not/exist.json"));
}

#[test]
fn sha256_file_hashes_contents() {
    let tmp = tempdir().expect("tempdir");
    let file = tmp.path().join("data.bin");
    fs::write(&file, b"abc").expect("write");
    assert_eq!(
        sha256_file(&file).expect("hash"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn sha256_file_errors_on_missing_file() {
    let tmp = tempdir().expect("tempdir");
    let err = sha256_file(&tmp.path().join("absent")).expect_err("missing file");
    assert!(err.to_string().contains("Failed to open file for hashing"));
}

#[test]
fn verbosity_maps_to_filter_levels() {
    assert_eq!(verbosity_filter(0), "warn");
    assert_eq!(verbosity_filter(1), "info");
    assert_eq!(verbosity_filter(2), "debug");
    assert_eq!(verbosity_filter(7), "trace");
}
