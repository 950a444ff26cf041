use std::path::Path;

use anyhow::{Context, Result};
use malsim_core::db::{open_corpus, Catalog};

use crate::commands::resolve_config;

/// List every catalogued binary.
pub fn list_command(config: Option<&Path>, database: Option<&str>, json: bool) -> Result<()> {
    let engine = resolve_config(config, database)?;
    let store = open_corpus(&engine)?;
    let binaries = store.list_binaries().context("Failed to list binaries")?;

    if json {
        let serialized = serde_json::to_string_pretty(&binaries)?;
        println!("{}", serialized);
        return Ok(());
    }

    println!("Binaries:");
    if binaries.is_empty() {
        println!("(none)");
        return Ok(());
    }

    for bin in binaries {
        let functions = store.function_count(&bin.id).context("Failed to count functions")?;
        println!(
            "- {} [{}] (filetype: {}, functions: {}, author: {}, filenames: {})",
            bin.id, bin.trust_level, bin.filetype, functions, bin.author, bin.filenames
        );
        if !bin.comment.is_empty() {
            println!("    {}", bin.comment);
        }
    }
    Ok(())
}
