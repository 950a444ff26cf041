mod common;

use std::path::PathBuf;

use common::{digest, entry, fp, seed, CountingCatalog, FetchWatcher, TableHasher};
use malsim_core::db::{Catalog, CorpusCache, CorpusStore, EngineConfig};
use malsim_core::model::TrustLevel;
use malsim_core::services::{ScoringEngine, TargetProfile};
use malsim_core::EngineError;

fn profile(label: &str, filetype: &str) -> TargetProfile {
    TargetProfile {
        path: PathBuf::from(format!("/samples/{label}")),
        digest: digest(label),
        filetype: filetype.to_string(),
        fingerprints: vec![fp("3:t1:"), fp("3:t2:")],
        sizes: vec![10, 30],
        packer: None,
    }
}

fn hasher() -> TableHasher {
    TableHasher::default()
        .with("3:t1:", "3:a1:", 80)
        .with("3:t2:", "3:a1:", 40)
        .with("3:t1:", "3:b1:", 90)
        .with("3:t2:", "3:b1:", 90)
}

#[test]
fn report_combines_averages_and_strong_match_metadata() {
    let store = CorpusStore::open_in_memory().expect("open in-memory corpus");
    seed(
        &store,
        &[
            entry("A", TrustLevel::Whitelist, "ELF", &["3:a1:"]),
            entry("B", TrustLevel::Blacklist, "ELF", &["3:b1:"]),
            entry("C", TrustLevel::Blacklist, "PE32", &["3:t1:", "3:t2:"]),
        ],
    );
    let hasher = hasher();
    let config = EngineConfig::default();

    let report = ScoringEngine::new(&store, &hasher, &config)
        .score(&profile("target", "ELF"))
        .expect("score");

    assert_eq!(report.candidates_considered, 2);
    assert_eq!(report.result.whitelist_average, 50);
    assert_eq!(report.result.blacklist_average, 90);
    assert_eq!(report.result.composite_score, -40);
    assert_eq!(report.strong_matches.len(), 1);
    assert_eq!(report.strong_matches[0].id, digest("B"));
    assert_eq!(report.strong_matches[0].trust_level, TrustLevel::Blacklist);
    assert_eq!(report.strong_matches[0].score, 90.0);
    assert_eq!(report.possible_authors, vec!["B-author".to_string()]);
    assert_eq!(report.possible_filenames, vec!["B.bin".to_string()]);
    assert!(report.comments.is_empty());
    assert_eq!(report.learned, None);
    assert!(!store.contains_binary(&digest("target")).expect("contains"));
}

#[test]
fn compare_all_includes_other_filetypes() {
    let store = CorpusStore::open_in_memory().expect("open in-memory corpus");
    seed(
        &store,
        &[
            entry("A", TrustLevel::Whitelist, "ELF", &["3:a1:"]),
            entry("C", TrustLevel::Whitelist, "PE32", &["3:t1:", "3:t2:"]),
        ],
    );
    let hasher = hasher();
    let config = EngineConfig { compare_all: true, ..EngineConfig::default() };

    let report = ScoringEngine::new(&store, &hasher, &config)
        .score(&profile("target", "ELF"))
        .expect("score");
    assert_eq!(report.candidates_considered, 2);
    // (50 + 100) / 2
    assert_eq!(report.result.whitelist_average, 75);
}

#[test]
fn no_same_filetype_candidates_is_an_empty_corpus() {
    let store = CorpusStore::open_in_memory().expect("open in-memory corpus");
    seed(&store, &[entry("A", TrustLevel::Whitelist, "ELF", &["3:a1:"])]);
    let hasher = hasher();
    let config = EngineConfig::default();

    let result =
        ScoringEngine::new(&store, &hasher, &config).score(&profile("target", "PE32 x86"));
    assert!(matches!(result, Err(EngineError::EmptyCorpus)));
}

#[test]
fn target_without_functions_is_rejected() {
    let store = CorpusStore::open_in_memory().expect("open in-memory corpus");
    seed(&store, &[entry("A", TrustLevel::Whitelist, "ELF", &["3:a1:"])]);
    let hasher = hasher();
    let config = EngineConfig::default();
    let mut target = profile("stripped", "ELF");
    target.fingerprints.clear();
    target.sizes.clear();

    let result = ScoringEngine::new(&store, &hasher, &config).score(&target);
    assert!(matches!(result, Err(EngineError::EmptyFunctionSet)));
}

#[test]
fn decisive_verdict_is_fed_back_once() {
    let store = CorpusStore::open_in_memory().expect("open in-memory corpus");
    seed(&store, &[entry("B", TrustLevel::Blacklist, "ELF", &["3:b1:"])]);
    let hasher = hasher();
    let config = EngineConfig { add_strong_matches: true, ..EngineConfig::default() };
    let engine = ScoringEngine::new(&store, &hasher, &config);
    let target = profile("target", "ELF");

    let first = engine.score(&target).expect("first score");
    assert_eq!(first.result.composite_score, -90);
    assert_eq!(first.learned, Some(TrustLevel::Blacklist));

    let learned = store.get_binary(&digest("target")).expect("get").expect("learned record");
    assert_eq!(learned.trust_level, TrustLevel::Blacklist);
    assert_eq!(learned.author, "unknown");
    assert_eq!(learned.filenames, "unknown");
    assert_eq!(learned.filetype, "ELF");
    let fingerprints = store.fingerprints_for(&digest("target")).expect("fps");
    assert_eq!(fingerprints, vec!["3:t1:", "3:t2:"]);

    // The target now matches itself; it is already catalogued so nothing is learned.
    let second = engine.score(&target).expect("second score");
    assert_eq!(second.candidates_considered, 2);
    assert_eq!(second.result.blacklist_average, 95);
    assert_eq!(second.learned, None);
    assert_eq!(store.list_binaries().expect("list").len(), 2);
}

#[test]
fn indecisive_verdict_is_not_learned() {
    let store = CorpusStore::open_in_memory().expect("open in-memory corpus");
    seed(&store, &[entry("A", TrustLevel::Whitelist, "ELF", &["3:a1:"])]);
    let hasher = hasher();
    let config = EngineConfig { add_strong_matches: true, ..EngineConfig::default() };

    let report = ScoringEngine::new(&store, &hasher, &config)
        .score(&profile("target", "ELF"))
        .expect("score");
    assert_eq!(report.result.composite_score, 50);
    assert_eq!(report.learned, None);
    assert!(!store.contains_binary(&digest("target")).expect("contains"));
}

#[test]
fn disk_backed_run_fetches_candidates_in_bounded_chunks() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = CorpusStore::open(&tmp.path().join("corpus.db")).expect("open corpus");
    seed(
        &store,
        &[
            entry("A", TrustLevel::Whitelist, "ELF", &["3:a1:"]),
            entry("B", TrustLevel::Blacklist, "ELF", &["3:b1:"]),
            entry("C", TrustLevel::Blacklist, "PE32", &["3:t1:", "3:t2:"]),
        ],
    );
    let catalog = CountingCatalog::new(CorpusCache::disk_backed(store));
    let hasher = hasher();
    let config = EngineConfig { disk_chunk: 1, ..EngineConfig::default() };
    let watcher = FetchWatcher::new(&catalog.fetched);

    let report = ScoringEngine::new(&catalog, &hasher, &config)
        .with_observer(&watcher)
        .score(&profile("target", "ELF"))
        .expect("score");

    // Two target functions against one fingerprint per candidate, one candidate per fetch.
    assert_eq!(watcher.seen(), vec![1, 1, 2, 2]);
    assert_eq!(*watcher.last_total.lock().expect("lock"), 4);
    assert_eq!(report.candidates_considered, 2);
    assert_eq!(report.result.whitelist_average, 50);
    assert_eq!(report.result.blacklist_average, 90);
}
