//! malsim-core
//!
//! Core library for scoring unknown binaries against a corpus of catalogued
//! whitelist/blacklist binaries by function-level fuzzy-hash similarity.
//!
//! This crate holds the data model, the corpus database, function extraction,
//! fingerprinting, the scoring/classification pipeline and corpus learning.
//! Frontends (the `malsim` CLI) only parse arguments and render reports.

pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod services;
pub mod similarity;

pub use error::{EngineError, EngineResult};

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
