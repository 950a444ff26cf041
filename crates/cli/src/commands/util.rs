use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use malsim_core::db::{load_engine_config, EngineConfig};
use malsim_core::services::{ExtractorRegistry, FunctionExtractor};
use malsim_core::EngineError;
use tracing::{error, info};

use crate::collect_targets;

/// Load the engine config (file if given, defaults otherwise) and apply the
/// `--database` override.
pub fn resolve_config(config: Option<&Path>, database: Option<&str>) -> Result<EngineConfig> {
    let mut engine = match config {
        Some(path) => load_engine_config(path)?,
        None => EngineConfig::default(),
    };
    if let Some(db) = database {
        engine.database = db.to_string();
    }
    Ok(engine)
}

/// Look an extractor up by name, listing the known names on a miss.
pub fn select_extractor<'r>(
    registry: &'r ExtractorRegistry,
    name: &str,
) -> Result<&'r dyn FunctionExtractor> {
    registry.get(name).ok_or_else(|| {
        let available = registry.names().join(", ");
        anyhow!("Unknown extractor '{}'. Available extractors: {}", name, available)
    })
}

/// Stable error kind for diagnostics; anything that is not an engine error is "unexpected".
pub fn error_kind(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<EngineError>().map(EngineError::kind).unwrap_or("unexpected")
}

/// Counts from a single- or multi-target run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub failed: usize,
}

/// Run `op` over every file under `root`.
///
/// When `root` is a single file, the first error is returned. For a directory,
/// each failure is logged and the walk continues.
pub fn run_targets<F>(root: &Path, mut op: F) -> Result<BatchSummary>
where
    F: FnMut(&Path) -> Result<()>,
{
    if !root.exists() {
        return Err(anyhow!("Path does not exist: {}", root.display()));
    }

    if !root.is_dir() {
        op(root)?;
        return Ok(BatchSummary { processed: 1, failed: 0 });
    }

    let targets: Vec<PathBuf> = collect_targets(root)
        .with_context(|| format!("Failed to walk directory {}", root.display()))?;
    let mut summary = BatchSummary::default();
    for target in &targets {
        match op(target) {
            Ok(()) => summary.processed += 1,
            Err(err) => {
                summary.failed += 1;
                error!(
                    path = %target.display(),
                    kind = error_kind(&err),
                    error = %format!("{err:#}"),
                    "skipping target"
                );
            }
        }
    }
    info!(processed = summary.processed, failed = summary.failed, "batch complete");
    Ok(summary)
}
