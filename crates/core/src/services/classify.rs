//! Trust-level pooling, averages and the strong-match decision.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::{CandidateBinary, ContentDigest, TrustLevel};

/// Classification thresholds. The defaults are the values the corpus was tuned with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Weighted totals at or below this are discarded as noise (strict `>`).
    pub noise_floor: f64,
    /// Weighted totals above this are reported as strong matches (strict `>`).
    pub strong_match: f64,
    /// Composite scores beyond `±learn` trigger feedback learning.
    pub learn: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { noise_floor: 25.0, strong_match: 80.0, learn: 80 }
    }
}

/// One candidate's weighted similarity total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub candidate: CandidateBinary,
    pub total: f64,
}

/// Output of a classification pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub whitelist_average: i64,
    pub blacklist_average: i64,
    /// `whitelist_average - blacklist_average`, always within `[-100, 100]`.
    pub composite_score: i64,
    pub strong_matches: BTreeSet<ContentDigest>,
}

/// Stateless classifier; every call is a pure function of its inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Classifier {
    thresholds: Thresholds,
}

impl Classifier {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn classify(&self, scores: &[CandidateScore]) -> ClassificationResult {
        let mut whitelist = Vec::new();
        let mut blacklist = Vec::new();
        let mut strong_matches = BTreeSet::new();

        for score in scores {
            if score.total > self.thresholds.noise_floor {
                match score.candidate.trust_level {
                    TrustLevel::Whitelist => whitelist.push(score.total),
                    TrustLevel::Blacklist => blacklist.push(score.total),
                }
            }
            if score.total > self.thresholds.strong_match {
                strong_matches.insert(score.candidate.id.clone());
            }
        }

        let whitelist_average = floor_mean(whitelist);
        let blacklist_average = floor_mean(blacklist);

        ClassificationResult {
            whitelist_average,
            blacklist_average,
            composite_score: whitelist_average - blacklist_average,
            strong_matches,
        }
    }

    /// Trust level the target should be learned as, if any.
    pub fn learn_decision(&self, composite_score: i64) -> Option<TrustLevel> {
        learn_decision(composite_score, self.thresholds.learn)
    }
}

/// `composite != 100 && composite > threshold` learns whitelist; the mirrored rule learns
/// blacklist. Exactly ±100 never learns.
pub fn learn_decision(composite_score: i64, threshold: i64) -> Option<TrustLevel> {
    if composite_score != 100 && composite_score > threshold {
        Some(TrustLevel::Whitelist)
    } else if composite_score != -100 && composite_score < -threshold {
        Some(TrustLevel::Blacklist)
    } else {
        None
    }
}

/// Truncated mean of a pool; an empty pool counts as a single zero.
///
/// Values are summed in sorted order so the result does not depend on the
/// order candidates finished scoring in.
fn floor_mean(mut pool: Vec<f64>) -> i64 {
    if pool.is_empty() {
        pool.push(0.0);
    }
    pool.sort_by(f64::total_cmp);
    let sum: f64 = pool.iter().sum();
    let mean = sum / pool.len() as f64;
    mean.floor().clamp(0.0, 100.0) as i64
}
