mod common;

use std::sync::atomic::{AtomicU64, Ordering};

use common::{entry, fp, seed, CountingCatalog, FetchWatcher, TableHasher};
use malsim_core::db::{CandidateFilter, Catalog, CorpusCache, CorpusStore};
use malsim_core::model::{CandidateBinary, TrustLevel};
use malsim_core::services::{
    load_candidates, CandidateFingerprints, ProgressObserver, SimilarityScorer, WeightVector,
};
use malsim_core::EngineError;

#[derive(Default)]
struct CountingObserver {
    calls: AtomicU64,
    last_total: AtomicU64,
    max_done: AtomicU64,
}

impl ProgressObserver for CountingObserver {
    fn on_progress(&self, done: u64, total: u64) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_total.store(total, Ordering::SeqCst);
        self.max_done.fetch_max(done, Ordering::SeqCst);
    }
}

fn corpus() -> CorpusStore {
    let store = CorpusStore::open_in_memory().expect("open in-memory corpus");
    seed(
        &store,
        &[
            entry("A", TrustLevel::Whitelist, "ELF", &["3:a1:", "3:a2:"]),
            entry("B", TrustLevel::Blacklist, "ELF", &["3:b1:"]),
            entry("C", TrustLevel::Blacklist, "PE32", &["3:c1:"]),
        ],
    );
    store
}

fn hasher() -> TableHasher {
    TableHasher::default()
        .with("3:t1:", "3:a1:", 80)
        .with("3:t1:", "3:a2:", 60)
        .with("3:t2:", "3:a2:", 40)
        .with("3:t2:", "3:b1:", 95)
}

#[test]
fn matrix_holds_best_match_per_target_function() {
    let store = corpus();
    let candidates =
        load_candidates(&store, &CandidateFilter::Filetype("ELF".into())).expect("load");
    assert_eq!(candidates.len(), 2);

    let hasher = hasher();
    let target = [fp("3:t1:"), fp("3:t2:")];
    let matrix = SimilarityScorer::new(&hasher).score(&target, &candidates).expect("score");

    assert_eq!(matrix.len(), 2);
    assert_eq!(matrix.rows()[0].candidate.trust_level, TrustLevel::Whitelist);
    assert_eq!(matrix.rows()[0].scores, vec![80, 40]);
    assert_eq!(matrix.rows()[1].scores, vec![0, 95]);

    let weights = WeightVector::from_sizes(&[10, 30]).expect("weights");
    let totals = matrix.weighted(&weights);
    assert_eq!(totals[0].total, 50.0);
    assert_eq!(totals[1].total, 71.25);
}

#[test]
fn no_candidate_of_the_same_filetype_is_an_empty_corpus() {
    let store = corpus();
    let macho = CandidateFilter::Filetype("Mach-O 64-bit arm64".into());
    assert!(matches!(load_candidates(&store, &macho), Err(EngineError::EmptyCorpus)));

    let empty = CorpusStore::open_in_memory().expect("open in-memory corpus");
    let result = load_candidates(&empty, &CandidateFilter::All);
    assert!(matches!(result, Err(EngineError::EmptyCorpus)));

    let hasher = hasher();
    let direct = SimilarityScorer::new(&hasher).score(&[fp("3:t1:")], &[]);
    assert!(matches!(direct, Err(EngineError::EmptyCorpus)));
}

#[test]
fn compare_all_widens_the_pool() {
    let store = corpus();
    let all = load_candidates(&store, &CandidateFilter::All).expect("load");
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].fingerprints, vec!["3:a1:".to_string(), "3:a2:".to_string()]);
}

#[test]
fn observer_sees_every_comparison() {
    let store = corpus();
    let candidates = load_candidates(&store, &CandidateFilter::All).expect("load");
    let hasher = hasher();
    let observer = CountingObserver::default();
    let target = [fp("3:t1:"), fp("3:t2:")];

    SimilarityScorer::new(&hasher)
        .with_observer(&observer)
        .score(&target, &candidates)
        .expect("score");

    // (2 + 1 + 1) candidate fingerprints x 2 target functions.
    assert_eq!(observer.calls.load(Ordering::SeqCst), 8);
    assert_eq!(observer.last_total.load(Ordering::SeqCst), 8);
    assert_eq!(observer.max_done.load(Ordering::SeqCst), 8);
}

#[test]
fn dedicated_worker_pool_matches_global_pool() {
    let store = corpus();
    let candidates = load_candidates(&store, &CandidateFilter::All).expect("load");
    let hasher = hasher();
    let target = [fp("3:t1:"), fp("3:t2:"), fp("3:a1:")];

    let global = SimilarityScorer::new(&hasher).score(&target, &candidates).expect("score");
    let pooled = SimilarityScorer::new(&hasher)
        .with_workers(3)
        .expect("build pool")
        .score(&target, &candidates)
        .expect("score");
    assert_eq!(global, pooled);
}

#[test]
fn candidate_without_fingerprints_scores_zero() {
    let hasher = hasher();
    let bare = CandidateFingerprints {
        candidate: CandidateBinary {
            id: common::digest("bare"),
            trust_level: TrustLevel::Blacklist,
        },
        fingerprints: Vec::new(),
    };
    let matrix = SimilarityScorer::new(&hasher)
        .score(&[fp("3:t1:"), fp("3:t2:")], &[bare])
        .expect("score");
    assert_eq!(matrix.rows()[0].scores, vec![0, 0]);
}

fn five_candidates(store: &CorpusStore) {
    seed(
        store,
        &[
            entry("A", TrustLevel::Whitelist, "ELF", &["3:a1:"]),
            entry("B", TrustLevel::Blacklist, "ELF", &["3:b1:"]),
            entry("C", TrustLevel::Blacklist, "ELF", &["3:c1:"]),
            entry("D", TrustLevel::Whitelist, "ELF", &["3:d1:"]),
            entry("E", TrustLevel::Blacklist, "ELF", &["3:e1:"]),
        ],
    );
}

#[test]
fn chunked_catalog_scoring_fetches_one_chunk_at_a_time() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = CorpusStore::open(&tmp.path().join("corpus.db")).expect("open corpus");
    five_candidates(&store);
    let catalog = CountingCatalog::new(CorpusCache::disk_backed(store));
    assert!(!catalog.memory_resident());

    let hasher = TableHasher::default().with("3:t1:", "3:c1:", 70);
    let watcher = FetchWatcher::new(&catalog.fetched);
    let matrix = SimilarityScorer::new(&hasher)
        .with_observer(&watcher)
        .with_chunk_size(2)
        .score_catalog(&[fp("3:t1:")], &catalog, &CandidateFilter::All)
        .expect("score");

    // Every comparison ran with at most the current chunk fetched.
    assert_eq!(watcher.seen(), vec![2, 2, 4, 4, 5]);
    assert_eq!(*watcher.last_total.lock().expect("lock"), 5);
    assert_eq!(catalog.fetched.load(Ordering::SeqCst), 5);

    let scores: Vec<_> = matrix.rows().iter().map(|row| row.scores[0]).collect();
    assert_eq!(scores, vec![0, 0, 70, 0, 0]);
}

#[test]
fn unchunked_catalog_scoring_matches_preloaded_pool() {
    let store = CorpusStore::open_in_memory().expect("open in-memory corpus");
    five_candidates(&store);
    let catalog = CountingCatalog::new(store);
    assert!(catalog.memory_resident());

    let hasher = TableHasher::default().with("3:t1:", "3:b1:", 55);
    let watcher = FetchWatcher::new(&catalog.fetched);
    let target = [fp("3:t1:")];
    let streamed = SimilarityScorer::new(&hasher)
        .with_observer(&watcher)
        .score_catalog(&target, &catalog, &CandidateFilter::All)
        .expect("score");
    assert_eq!(watcher.seen(), vec![5; 5]);

    let pool = load_candidates(&catalog.inner, &CandidateFilter::All).expect("load");
    let preloaded = SimilarityScorer::new(&hasher).score(&target, &pool).expect("score");
    assert_eq!(streamed, preloaded);

    let chunked = SimilarityScorer::new(&hasher)
        .with_chunk_size(3)
        .score_catalog(&target, &catalog, &CandidateFilter::All)
        .expect("score");
    assert_eq!(streamed, chunked);
}

#[test]
fn catalog_scoring_of_an_empty_pool_is_an_empty_corpus() {
    let store = corpus();
    let hasher = hasher();
    let macho = CandidateFilter::Filetype("Mach-O 64-bit arm64".into());
    let scorer = SimilarityScorer::new(&hasher).with_chunk_size(1);
    let result = scorer.score_catalog(&[fp("3:t1:")], &store, &macho);
    assert!(matches!(result, Err(EngineError::EmptyCorpus)));
}
