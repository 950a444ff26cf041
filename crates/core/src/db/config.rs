use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::db::{load_engine_config, CacheMode, CandidateFilter};
use crate::services::classify::Thresholds;

/// Default corpus database file, relative to the working directory.
pub const DEFAULT_DATABASE: &str = "malsim.db";

/// Functions at or below this many bytes are not fingerprinted.
pub const DEFAULT_MIN_FUNCTION_SIZE: u64 = 20;

/// Candidates whose fingerprints are fetched together when reading from disk.
pub const DEFAULT_DISK_CHUNK: usize = 64;

/// Serializable engine configuration.
///
/// Loaded from JSON or YAML (see [`crate::db::load_engine_config`]); every
/// field has a default so a partial file is fine. CLI flags are applied on top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the corpus database file.
    pub database: String,
    /// Compare against the entire corpus instead of same-filetype binaries only.
    pub compare_all: bool,
    /// Never mirror the corpus into memory.
    pub leave_db_on_disk: bool,
    /// Feed strongly classified targets back into the corpus.
    pub add_strong_matches: bool,
    /// Minimum function length in bytes (strict `>`).
    pub min_function_size: u64,
    pub thresholds: Thresholds,
    /// Worker threads for the candidate loop; `None` uses the global rayon pool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    /// Name of the function extractor to use.
    pub extractor: String,
    /// Candidates fetched per batch when the corpus is read from disk.
    pub disk_chunk: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database: DEFAULT_DATABASE.to_string(),
            compare_all: false,
            leave_db_on_disk: false,
            add_strong_matches: false,
            min_function_size: DEFAULT_MIN_FUNCTION_SIZE,
            thresholds: Thresholds::default(),
            workers: None,
            extractor: "symbols".to_string(),
            disk_chunk: DEFAULT_DISK_CHUNK,
        }
    }
}

impl EngineConfig {
    /// Load from a `.json`, `.yaml` or `.yml` file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        load_engine_config(path)
    }

    pub fn cache_mode(&self) -> CacheMode {
        CacheMode::from_leave_on_disk(self.leave_db_on_disk)
    }

    pub fn candidate_filter(&self, filetype: &str) -> CandidateFilter {
        CandidateFilter::for_target(self.compare_all, filetype)
    }
}
