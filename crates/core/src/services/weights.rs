//! Size-proportional weighting of a target's functions.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Normalized weights parallel to the target's function list.
///
/// Larger functions are harder to fuzzy-match, so a match on one counts for more.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    weights: Vec<f64>,
}

impl WeightVector {
    /// `weight_i = size_i / sum(sizes)`.
    ///
    /// Fails with `EmptyFunctionSet` on an empty list or one whose sizes sum to zero.
    pub fn from_sizes(sizes: &[u64]) -> EngineResult<Self> {
        let total: u64 = sizes.iter().sum();
        if sizes.is_empty() || total == 0 {
            return Err(EngineError::EmptyFunctionSet);
        }
        let total = total as f64;
        Ok(Self { weights: sizes.iter().map(|&s| s as f64 / total).collect() })
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// `sum(score_i * weight_i)`; extra entries on either side are ignored.
    pub fn weighted_score(&self, scores: &[u8]) -> f64 {
        self.weights.iter().zip(scores).map(|(w, &s)| f64::from(s) * w).sum()
    }
}
