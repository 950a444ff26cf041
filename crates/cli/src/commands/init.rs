use std::path::Path;

use anyhow::{Context, Result};
use malsim_core::db::{open_corpus, Catalog, CURRENT_SCHEMA_VERSION};

use crate::commands::resolve_config;

/// Create (or migrate) the corpus database.
pub fn init_command(config: Option<&Path>, database: Option<&str>) -> Result<()> {
    let engine = resolve_config(config, database)?;
    let store = open_corpus(&engine)?;
    let binaries = store.list_binaries().context("Failed to list binaries")?;

    println!("Corpus database ready:");
    println!("  Path: {}", engine.database);
    println!("  Schema version: {}", CURRENT_SCHEMA_VERSION);
    println!("  Binaries: {}", binaries.len());
    Ok(())
}
