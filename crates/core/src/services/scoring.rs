//! Best-match scoring of a target's functions against a candidate pool.

use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};

use crate::db::{CandidateFilter, Catalog};
use crate::error::{EngineError, EngineResult};
use crate::model::{CandidateBinary, Fingerprint};
use crate::services::classify::CandidateScore;
use crate::services::weights::WeightVector;
use crate::similarity::FingerprintHasher;

/// Optional side channel notified after every fingerprint comparison.
///
/// Calls can arrive from several worker threads at once; `done` is monotonic
/// overall but a given observer may see values slightly out of order.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, done: u64, total: u64);
}

/// A candidate binary together with every fingerprint it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFingerprints {
    pub candidate: CandidateBinary,
    pub fingerprints: Vec<String>,
}

/// Fetch the candidate pool for `filter` and each candidate's fingerprints.
///
/// Fails with `EmptyCorpus` when nothing in the catalog matches.
pub fn load_candidates(
    catalog: &dyn Catalog,
    filter: &CandidateFilter,
) -> EngineResult<Vec<CandidateFingerprints>> {
    let candidates = catalog.candidates(filter)?;
    if candidates.is_empty() {
        return Err(EngineError::EmptyCorpus);
    }
    fetch_fingerprints(catalog, candidates)
}

fn fetch_fingerprints(
    catalog: &dyn Catalog,
    candidates: Vec<CandidateBinary>,
) -> EngineResult<Vec<CandidateFingerprints>> {
    let mut out = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let fingerprints = catalog.fingerprints_for(&candidate.id)?;
        out.push(CandidateFingerprints { candidate, fingerprints });
    }
    Ok(out)
}

/// Best-match scores of every target function against one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRow {
    pub candidate: CandidateBinary,
    /// Parallel to the target's function list; each entry in `[0, 100]`.
    pub scores: Vec<u8>,
}

/// Dense (candidate × target function) best-match matrix.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScoreMatrix {
    rows: Vec<ScoreRow>,
}

impl ScoreMatrix {
    pub fn rows(&self) -> &[ScoreRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Fold each row into one weighted total, in row order.
    pub fn weighted(&self, weights: &WeightVector) -> Vec<CandidateScore> {
        self.rows
            .iter()
            .map(|row| CandidateScore {
                candidate: row.candidate.clone(),
                total: weights.weighted_score(&row.scores),
            })
            .collect()
    }
}

/// Computes score matrices; candidates are scored independently and in parallel.
pub struct SimilarityScorer<'a> {
    hasher: &'a dyn FingerprintHasher,
    pool: Option<ThreadPool>,
    observer: Option<&'a dyn ProgressObserver>,
    chunk: Option<usize>,
}

impl<'a> SimilarityScorer<'a> {
    /// Scorer running on rayon's global pool.
    pub fn new(hasher: &'a dyn FingerprintHasher) -> Self {
        Self { hasher, pool: None, observer: None, chunk: None }
    }

    /// Run on a dedicated pool of `workers` threads instead of the global one.
    pub fn with_workers(mut self, workers: usize) -> EngineResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|idx| format!("malsim-score-{idx}"))
            .build()?;
        self.pool = Some(pool);
        Ok(self)
    }

    pub fn with_observer(mut self, observer: &'a dyn ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// In [`Self::score_catalog`], fetch fingerprints for at most `candidates`
    /// binaries at a time instead of the whole pool up front.
    pub fn with_chunk_size(mut self, candidates: usize) -> Self {
        self.chunk = Some(candidates.max(1));
        self
    }

    /// Score `target` against every candidate. Rows come back in candidate order.
    pub fn score(
        &self,
        target: &[Fingerprint],
        candidates: &[CandidateFingerprints],
    ) -> EngineResult<ScoreMatrix> {
        if candidates.is_empty() {
            return Err(EngineError::EmptyCorpus);
        }

        let owned: u64 = candidates.iter().map(|c| c.fingerprints.len() as u64).sum();
        let done = AtomicU64::new(0);
        let progress =
            Progress { observer: self.observer, done: &done, total: owned * target.len() as u64 };

        Ok(ScoreMatrix { rows: self.score_rows(target, candidates, &progress) })
    }

    /// Score `target` against the candidates `filter` selects from `catalog`,
    /// pulling fingerprints in chunks when a chunk size is set.
    pub fn score_catalog(
        &self,
        target: &[Fingerprint],
        catalog: &dyn Catalog,
        filter: &CandidateFilter,
    ) -> EngineResult<ScoreMatrix> {
        let candidates = catalog.candidates(filter)?;
        if candidates.is_empty() {
            return Err(EngineError::EmptyCorpus);
        }

        let total = catalog.fingerprint_total(filter)? * target.len() as u64;
        let done = AtomicU64::new(0);
        let progress = Progress { observer: self.observer, done: &done, total };

        let chunk = self.chunk.unwrap_or(candidates.len());
        let mut rows = Vec::with_capacity(candidates.len());
        for batch in candidates.chunks(chunk) {
            let loaded = fetch_fingerprints(catalog, batch.to_vec())?;
            rows.extend(self.score_rows(target, &loaded, &progress));
        }
        Ok(ScoreMatrix { rows })
    }

    fn score_rows(
        &self,
        target: &[Fingerprint],
        candidates: &[CandidateFingerprints],
        progress: &Progress<'_>,
    ) -> Vec<ScoreRow> {
        let compute = || {
            candidates
                .par_iter()
                .map(|candidate| ScoreRow {
                    candidate: candidate.candidate.clone(),
                    scores: target
                        .iter()
                        .map(|fp| self.best_match(fp, &candidate.fingerprints, progress))
                        .collect(),
                })
                .collect::<Vec<_>>()
        };

        match &self.pool {
            Some(pool) => pool.install(compute),
            None => compute(),
        }
    }

    /// Highest score of `target` against any of `owned`; 0 when `owned` is empty.
    fn best_match(&self, target: &Fingerprint, owned: &[String], progress: &Progress<'_>) -> u8 {
        let mut best = 0u8;
        for candidate in owned {
            let score = self.hasher.compare(target.as_str(), candidate).min(100);
            if score > best {
                best = score;
            }
            progress.tick();
        }
        best
    }
}

struct Progress<'a> {
    observer: Option<&'a dyn ProgressObserver>,
    done: &'a AtomicU64,
    total: u64,
}

impl Progress<'_> {
    fn tick(&self) {
        if let Some(observer) = self.observer {
            let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
            observer.on_progress(done, self.total);
        }
    }
}
