//! Corpus database integration.
//!
//! This module wraps a SQLite database storing:
//! - Catalogued binaries (content digest, trust level, filetype, free-text metadata)
//! - Function fingerprints owned by each binary
//!
//! The rest of the engine talks to the corpus through the [`Catalog`] trait so
//! it does not care whether reads hit the durable file or an in-memory replica
//! (see [`CorpusCache`]).

pub mod cache;
pub mod config;
pub mod corpus_db;
pub mod util;

pub use cache::*;
pub use config::*;
pub use corpus_db::*;
pub use util::*;

use serde::{Deserialize, Serialize};

use crate::model::{BinaryRecord, CandidateBinary, CatalogEntry, ContentDigest};

/// Which catalogued binaries a scoring run compares against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateFilter {
    /// Every binary in the corpus.
    All,
    /// Only binaries whose stored filetype equals this one.
    Filetype(String),
}

impl CandidateFilter {
    pub fn for_target(compare_all: bool, filetype: &str) -> Self {
        if compare_all {
            CandidateFilter::All
        } else {
            CandidateFilter::Filetype(filetype.to_string())
        }
    }
}

/// How `write_entry` treats an id that is already catalogued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Leave the existing entry untouched.
    InsertOnly,
    /// Delete the existing entry and its fingerprints, then insert.
    Replace,
}

impl WriteMode {
    pub fn from_overwrite(overwrite: bool) -> Self {
        if overwrite {
            WriteMode::Replace
        } else {
            WriteMode::InsertOnly
        }
    }
}

/// Result of a single `write_entry` transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    Inserted,
    Replaced,
    /// Id already present and the mode was `InsertOnly`; nothing was written.
    Duplicate,
}

/// Typed query/mutate surface shared by [`CorpusStore`] and [`CorpusCache`].
pub trait Catalog {
    fn contains_binary(&self, id: &ContentDigest) -> DbResult<bool>;
    fn get_binary(&self, id: &ContentDigest) -> DbResult<Option<BinaryRecord>>;
    fn list_binaries(&self) -> DbResult<Vec<BinaryRecord>>;
    fn candidates(&self, filter: &CandidateFilter) -> DbResult<Vec<CandidateBinary>>;
    /// Raw fingerprint strings owned by `id`, in insertion order.
    fn fingerprints_for(&self, id: &ContentDigest) -> DbResult<Vec<String>>;
    /// Number of fingerprints owned by the binaries `filter` selects.
    fn fingerprint_total(&self, filter: &CandidateFilter) -> DbResult<u64>;
    /// True when reads are served from memory, so loading every candidate's
    /// fingerprints at once costs no more than the catalog already does.
    fn memory_resident(&self) -> bool {
        false
    }
    /// Duplicate check plus delete/insert as one atomic transaction.
    fn write_entry(&self, entry: &CatalogEntry, mode: WriteMode) -> DbResult<WriteOutcome>;
}
