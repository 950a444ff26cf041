use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use malsim_core::db::open_corpus_for_writes;
use malsim_core::model::{BinaryMetadata, TrustLevel};
use malsim_core::services::{
    sniff_filetype, ExtractorRegistry, LearningPipeline, SignatureFile, TargetProfile,
};
use malsim_core::similarity::SpamsumHasher;

use crate::commands::{resolve_config, run_targets, select_extractor, BatchSummary};

/// Parameters of a `learn` invocation.
#[derive(Debug, Clone)]
pub struct LearnOptions {
    pub path: PathBuf,
    pub trust_level: TrustLevel,
    pub author: String,
    /// Explicit filenames; defaults to each target's path.
    pub filenames: Option<String>,
    pub comment: String,
    pub overwrite: bool,
    /// Treat targets as signature files instead of binaries.
    pub sigs_only: bool,
    /// Filetype recorded for signature files; sniffed from the file otherwise.
    pub filetype: Option<String>,
    pub database: Option<String>,
    pub config: Option<PathBuf>,
    pub extractor: Option<String>,
}

/// Learn one binary, signature file or directory of either into the corpus.
pub fn learn_command(opts: &LearnOptions) -> Result<BatchSummary> {
    let engine = resolve_config(opts.config.as_deref(), opts.database.as_deref())?;
    let registry = ExtractorRegistry::with_defaults();
    let extractor_name = opts.extractor.as_deref().unwrap_or(engine.extractor.as_str());
    let extractor = select_extractor(&registry, extractor_name)?;
    let corpus = open_corpus_for_writes(&engine)?;
    let pipeline = LearningPipeline::new(&corpus);
    let batch = opts.path.is_dir();

    run_targets(&opts.path, |target| {
        let filenames = match (&opts.filenames, batch) {
            (Some(given), false) => given.clone(),
            _ => target.display().to_string(),
        };
        let metadata = BinaryMetadata {
            author: opts.author.clone(),
            filenames,
            comment: opts.comment.clone(),
        };

        let outcome = if opts.sigs_only {
            let signatures = SignatureFile::read(target)?;
            let filetype = match &opts.filetype {
                Some(filetype) => filetype.clone(),
                None => sniff_target(target)?,
            };
            pipeline.ingest_signatures(
                signatures,
                opts.trust_level,
                &filetype,
                metadata,
                opts.overwrite,
            )?
        } else {
            let profile = TargetProfile::from_path(
                target,
                extractor,
                &SpamsumHasher,
                engine.min_function_size,
            )?;
            pipeline.ingest_profile(&profile, opts.trust_level, metadata, opts.overwrite)?
        };

        println!(
            "=> {} added as {} ({:?}, {} functions): {}",
            outcome.id,
            outcome.trust_level,
            outcome.outcome,
            outcome.fingerprints,
            target.display()
        );
        Ok(())
    })
}

fn sniff_target(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(sniff_filetype(&bytes))
}
