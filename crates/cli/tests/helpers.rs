use std::fs;

use anyhow::anyhow;
use malsim::commands::{error_kind, resolve_config, run_targets, select_extractor, BatchSummary};
use malsim::{canonicalize_or_current, collect_targets};
use malsim_core::db::DEFAULT_DATABASE;
use malsim_core::services::{ExtractorRegistry, FunctionExtractor};
use malsim_core::EngineError;
use tempfile::tempdir;

#[test]
fn canonicalize_or_current_returns_cwd_for_dot() {
    let original = std::env::current_dir().expect("cwd");
    let tmp = tempdir().expect("tempdir");
    std::env::set_current_dir(tmp.path()).expect("chdir tmp");

    let result = canonicalize_or_current(".").expect("canonicalize").canonicalize().expect("canon");
    let expected = tmp.path().canonicalize().expect("canon tmp");
    assert_eq!(result, expected);

    std::env::set_current_dir(original).expect("restore cwd");
}

#[test]
fn collect_targets_walks_nested_directories_sorted() {
    let tmp = tempdir().expect("tempdir");
    let root = tmp.path();
    fs::create_dir_all(root.join("b/deeper")).expect("create dirs");
    fs::write(root.join("z.bin"), b"z").expect("write");
    fs::write(root.join("a.bin"), b"a").expect("write");
    fs::write(root.join("b/deeper/m.bin"), b"m").expect("write");

    let targets = collect_targets(root).expect("collect");
    assert_eq!(
        targets,
        vec![root.join("a.bin"), root.join("b/deeper/m.bin"), root.join("z.bin")]
    );
}

#[cfg(unix)]
#[test]
fn collect_targets_skips_symlinks() {
    let tmp = tempdir().expect("tempdir");
    let root = tmp.path();
    fs::write(root.join("real.bin"), b"r").expect("write");
    std::os::unix::fs::symlink(root, root.join("loop")).expect("symlink dir");
    std::os::unix::fs::symlink(root.join("real.bin"), root.join("alias.bin"))
        .expect("symlink file");

    assert_eq!(collect_targets(root).expect("collect"), vec![root.join("real.bin")]);
}

#[test]
fn collect_targets_returns_a_single_file_as_is() {
    let tmp = tempdir().expect("tempdir");
    let file = tmp.path().join("one.bin");
    fs::write(&file, b"1").expect("write");
    assert_eq!(collect_targets(&file).expect("collect"), vec![file]);
}

#[test]
fn resolve_config_applies_database_override() {
    let defaults = resolve_config(None, None).expect("defaults");
    assert_eq!(defaults.database, DEFAULT_DATABASE);

    let tmp = tempdir().expect("tempdir");
    let config = tmp.path().join("engine.yaml");
    fs::write(&config, "database: from-file.db\ncompare_all: true\n").expect("write config");

    let from_file = resolve_config(Some(&config), None).expect("from file");
    assert_eq!(from_file.database, "from-file.db");
    assert!(from_file.compare_all);

    let overridden = resolve_config(Some(&config), Some("flag.db")).expect("override");
    assert_eq!(overridden.database, "flag.db");
    assert!(overridden.compare_all);
}

#[test]
fn select_extractor_lists_known_names_on_miss() {
    let registry = ExtractorRegistry::with_defaults();
    assert_eq!(select_extractor(&registry, "symbols").expect("symbols").name(), "symbols");

    let err = select_extractor(&registry, "ida").err().expect("unknown extractor");
    let msg = err.to_string();
    assert!(msg.contains("Unknown extractor 'ida'"), "{msg}");
    assert!(msg.contains("symbols"), "{msg}");
}

#[test]
fn error_kind_names_engine_errors() {
    assert_eq!(error_kind(&anyhow::Error::new(EngineError::EmptyCorpus)), "empty_corpus");
    let wrapped = anyhow::Error::new(EngineError::EmptyFunctionSet).context("scoring x");
    assert_eq!(error_kind(&wrapped), "empty_function_set");
    assert_eq!(error_kind(&anyhow!("something else")), "unexpected");
}

#[test]
fn run_targets_continues_past_failures_in_a_directory() {
    let tmp = tempdir().expect("tempdir");
    fs::write(tmp.path().join("good.bin"), b"g").expect("write");
    fs::write(tmp.path().join("bad.bin"), b"b").expect("write");

    let mut seen = Vec::new();
    let summary = run_targets(tmp.path(), |path| {
        seen.push(path.to_path_buf());
        if path.ends_with("bad.bin") {
            Err(anyhow::Error::new(EngineError::EmptyFunctionSet))
        } else {
            Ok(())
        }
    })
    .expect("batch run");

    assert_eq!(summary, BatchSummary { processed: 1, failed: 1 });
    assert_eq!(seen.len(), 2);
}

#[test]
fn run_targets_propagates_single_file_failure() {
    let tmp = tempdir().expect("tempdir");
    let file = tmp.path().join("only.bin");
    fs::write(&file, b"o").expect("write");

    let err = run_targets(&file, |_| Err(anyhow::Error::new(EngineError::EmptyCorpus)))
        .expect_err("single target error");
    assert_eq!(error_kind(&err), "empty_corpus");

    let missing = run_targets(&tmp.path().join("absent"), |_| Ok(())).expect_err("missing path");
    assert!(missing.to_string().contains("Path does not exist"));
}
