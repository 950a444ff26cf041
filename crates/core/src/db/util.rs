use std::path::Path;

use anyhow::{anyhow, Context, Result};

use crate::db::{CorpusCache, CorpusStore, EngineConfig, SystemMemory};

/// Load an engine config from JSON (`.json`) or YAML (`.yaml`/`.yml`).
pub fn load_engine_config(path: &Path) -> Result<EngineConfig> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read engine config at {}", path.display()))?;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default().to_lowercase();
    let config: EngineConfig = match ext.as_str() {
        "json" => serde_json::from_str(&body).context("Failed to parse engine config JSON")?,
        "yaml" | "yml" => {
            serde_yaml::from_str(&body).context("Failed to parse engine config YAML")?
        }
        other => return Err(anyhow!("Unsupported engine config format: {other:?}")),
    };
    Ok(config)
}

/// Open (creating if needed) the durable corpus named by the config.
pub fn open_corpus(config: &EngineConfig) -> Result<CorpusStore> {
    let db_path = Path::new(&config.database);
    CorpusStore::open(db_path)
        .with_context(|| format!("Failed to open corpus database at {}", db_path.display()))
}

/// Open the durable corpus and decide on its backing for this run.
pub fn acquire_corpus(config: &EngineConfig) -> Result<CorpusCache> {
    let store = open_corpus(config)?;
    CorpusCache::acquire(store, config.cache_mode(), &SystemMemory)
        .context("Failed to prepare corpus for this run")
}

/// Open the durable corpus for a write-only run; it is never mirrored.
pub fn open_corpus_for_writes(config: &EngineConfig) -> Result<CorpusCache> {
    Ok(CorpusCache::disk_backed(open_corpus(config)?))
}
