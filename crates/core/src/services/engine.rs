//! One scoring run end to end: candidates, matrix, weights, verdict, feedback.

use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::db::{Catalog, EngineConfig};
use crate::error::{EngineError, EngineResult};
use crate::model::{BinaryMetadata, ContentDigest, TrustLevel};
use crate::services::classify::{CandidateScore, ClassificationResult, Classifier};
use crate::services::learning::LearningPipeline;
use crate::services::profile::TargetProfile;
use crate::services::scoring::{ProgressObserver, SimilarityScorer};
use crate::services::weights::WeightVector;
use crate::similarity::FingerprintHasher;

/// Catalog details of one strongly matching binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrongMatchDetail {
    pub id: ContentDigest,
    pub trust_level: TrustLevel,
    pub author: String,
    pub filenames: String,
    pub comment: String,
    /// Weighted similarity total against the target.
    pub score: f64,
}

/// Everything a frontend needs to render the verdict for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub target: PathBuf,
    pub digest: ContentDigest,
    pub filetype: String,
    pub candidates_considered: usize,
    pub result: ClassificationResult,
    pub strong_matches: Vec<StrongMatchDetail>,
    /// Distinct non-empty authors of the strong matches, first seen first.
    pub possible_authors: Vec<String>,
    pub possible_filenames: Vec<String>,
    pub comments: Vec<String>,
    /// Trust level the target was fed back into the corpus as, if any.
    pub learned: Option<TrustLevel>,
    /// RFC 3339 timestamp.
    pub scored_at: String,
}

/// Scores profiled targets against a catalog under one configuration.
pub struct ScoringEngine<'a> {
    catalog: &'a dyn Catalog,
    hasher: &'a dyn FingerprintHasher,
    config: &'a EngineConfig,
    observer: Option<&'a dyn ProgressObserver>,
}

impl<'a> ScoringEngine<'a> {
    pub fn new(
        catalog: &'a dyn Catalog,
        hasher: &'a dyn FingerprintHasher,
        config: &'a EngineConfig,
    ) -> Self {
        Self { catalog, hasher, config, observer: None }
    }

    pub fn with_observer(mut self, observer: &'a dyn ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Score `profile`; with `add_strong_matches` set, a decisive verdict is
    /// written back to the catalog.
    pub fn score(&self, profile: &TargetProfile) -> EngineResult<ScoreReport> {
        let filter = self.config.candidate_filter(&profile.filetype);

        let mut scorer = SimilarityScorer::new(self.hasher);
        if let Some(workers) = self.config.workers {
            scorer = scorer.with_workers(workers)?;
        }
        if let Some(observer) = self.observer {
            scorer = scorer.with_observer(observer);
        }
        if !self.catalog.memory_resident() {
            scorer = scorer.with_chunk_size(self.config.disk_chunk);
        }
        let matrix = scorer.score_catalog(&profile.fingerprints, self.catalog, &filter)?;

        let weights = WeightVector::from_sizes(&profile.sizes)?;
        debug!(weights = ?weights.as_slice(), "function weights");

        let scores = matrix.weighted(&weights);
        for (row, score) in matrix.rows().iter().zip(&scores) {
            debug!(
                candidate = %score.candidate.id,
                unweighted = ?row.scores,
                total = score.total,
                "candidate score"
            );
        }

        let classifier = Classifier::new(self.config.thresholds);
        let result = classifier.classify(&scores);
        let strong_matches = self.strong_match_details(&result, &scores)?;

        let learned = if self.config.add_strong_matches {
            self.feed_back(profile, classifier.learn_decision(result.composite_score))?
        } else {
            None
        };

        info!(
            target = %profile.path.display(),
            whitelist = result.whitelist_average,
            blacklist = result.blacklist_average,
            composite = result.composite_score,
            strong_matches = result.strong_matches.len(),
            "target scored"
        );

        let mut report = ScoreReport {
            target: profile.path.clone(),
            digest: profile.digest.clone(),
            filetype: profile.filetype.clone(),
            candidates_considered: matrix.len(),
            result,
            strong_matches,
            possible_authors: Vec::new(),
            possible_filenames: Vec::new(),
            comments: Vec::new(),
            learned,
            scored_at: Utc::now().to_rfc3339(),
        };
        for detail in &report.strong_matches {
            push_distinct(&mut report.possible_authors, &detail.author);
            push_distinct(&mut report.possible_filenames, &detail.filenames);
            push_distinct(&mut report.comments, &detail.comment);
        }
        Ok(report)
    }

    /// Strong matches in candidate order, joined with their catalog records.
    fn strong_match_details(
        &self,
        result: &ClassificationResult,
        scores: &[CandidateScore],
    ) -> EngineResult<Vec<StrongMatchDetail>> {
        let mut details = Vec::new();
        for score in scores.iter().filter(|s| result.strong_matches.contains(&s.candidate.id)) {
            let Some(record) = self.catalog.get_binary(&score.candidate.id)? else {
                continue;
            };
            details.push(StrongMatchDetail {
                id: record.id,
                trust_level: record.trust_level,
                author: record.author,
                filenames: record.filenames,
                comment: record.comment,
                score: score.total,
            });
        }
        Ok(details)
    }

    /// Learn the target as `decision`. An already catalogued target is not an error here.
    fn feed_back(
        &self,
        profile: &TargetProfile,
        decision: Option<TrustLevel>,
    ) -> EngineResult<Option<TrustLevel>> {
        let Some(trust_level) = decision else {
            return Ok(None);
        };

        let pipeline = LearningPipeline::new(self.catalog);
        match pipeline.ingest_profile(profile, trust_level, BinaryMetadata::default(), false) {
            Ok(outcome) => {
                info!(id = %outcome.id, %trust_level, "strong match learned into corpus");
                Ok(Some(trust_level))
            }
            Err(EngineError::AlreadyCataloged(id)) => {
                warn!(id = %id, "strong match already in corpus; not learned again");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

fn push_distinct(values: &mut Vec<String>, value: &str) {
    if !value.is_empty() && !values.iter().any(|v| v == value) {
        values.push(value.to_string());
    }
}
