//! Error taxonomy for the scoring and learning engine.

use std::path::PathBuf;

use thiserror::Error;

use crate::db::DbError;
use crate::model::{ContentDigest, FormatError};
use crate::services::extract::ExtractError;

/// Every failure a scoring or learning operation can surface.
///
/// All variants are recoverable at batch-item granularity: a caller walking a
/// directory logs the error and moves on to the next file.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The target could not be read or analyzed.
    #[error("Failed to extract functions from {}: {reason}", path.display())]
    ExtractionFailure { path: PathBuf, reason: String },

    /// Ingestion without overwrite hit an id that is already catalogued.
    #[error("Binary {0} is already in the corpus; use overwrite to replace it")]
    AlreadyCataloged(ContentDigest),

    /// Malformed content digest or fingerprint handed to the learning pipeline.
    #[error("Invalid fingerprint input: {0}")]
    InvalidFingerprint(#[from] FormatError),

    /// No catalogued binary matched the candidate filter.
    #[error("There is nothing in the corpus matching the requested filetype")]
    EmptyCorpus,

    /// The target has no functions (or only zero-length ones) to weight.
    #[error("Target has no functions to score")]
    EmptyFunctionSet,

    #[error("Corpus database error: {0}")]
    Db(#[from] DbError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build scoring worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl EngineError {
    /// Stable, machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::ExtractionFailure { .. } => "extraction_failure",
            EngineError::AlreadyCataloged(_) => "already_cataloged",
            EngineError::InvalidFingerprint(_) => "invalid_fingerprint",
            EngineError::EmptyCorpus => "empty_corpus",
            EngineError::EmptyFunctionSet => "empty_function_set",
            EngineError::Db(_) => "database",
            EngineError::Io { .. } => "io",
            EngineError::WorkerPool(_) => "worker_pool",
        }
    }

    pub fn extraction(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        EngineError::ExtractionFailure { path: path.into(), reason: reason.to_string() }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io { path: path.into(), source }
    }
}

impl From<ExtractError> for EngineError {
    fn from(err: ExtractError) -> Self {
        let path = err.path().to_path_buf();
        EngineError::ExtractionFailure { path, reason: err.to_string() }
    }
}

/// Convenience result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
