use std::path::PathBuf;

use anyhow::{Context, Result};
use malsim_core::db::acquire_corpus;
use malsim_core::services::{
    ExtractorRegistry, ProgressObserver, ScoreReport, ScoringEngine, TargetProfile,
};
use malsim_core::similarity::SpamsumHasher;
use tracing::info;

use crate::commands::{resolve_config, run_targets, select_extractor, BatchSummary};

/// Log a progress line every this many comparisons.
const PROGRESS_INTERVAL: u64 = 10_000;

/// Parameters of a `score` invocation; `None`/`false` defers to the config file.
#[derive(Debug, Clone, Default)]
pub struct ScoreOptions {
    pub path: PathBuf,
    pub compare_all: bool,
    pub leave_db_on_disk: bool,
    pub add_strong_matches: bool,
    pub json: bool,
    pub workers: Option<usize>,
    pub database: Option<String>,
    pub config: Option<PathBuf>,
    pub extractor: Option<String>,
}

/// Reports comparison progress through tracing.
struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_progress(&self, done: u64, total: u64) {
        if done % PROGRESS_INTERVAL == 0 || done == total {
            info!(done, total, "comparisons done");
        }
    }
}

/// Score one binary or a directory of binaries against the corpus.
pub fn score_command(opts: &ScoreOptions) -> Result<BatchSummary> {
    let mut engine_config = resolve_config(opts.config.as_deref(), opts.database.as_deref())?;
    engine_config.compare_all |= opts.compare_all;
    engine_config.leave_db_on_disk |= opts.leave_db_on_disk;
    engine_config.add_strong_matches |= opts.add_strong_matches;
    if opts.workers.is_some() {
        engine_config.workers = opts.workers;
    }

    let registry = ExtractorRegistry::with_defaults();
    let extractor = select_extractor(
        &registry,
        opts.extractor.as_deref().unwrap_or(engine_config.extractor.as_str()),
    )?;
    let corpus = acquire_corpus(&engine_config)?;
    let progress = LogProgress;
    let engine =
        ScoringEngine::new(&corpus, &SpamsumHasher, &engine_config).with_observer(&progress);

    let mut reports = Vec::new();
    let summary = run_targets(&opts.path, |target| {
        let profile = TargetProfile::from_path(
            target,
            extractor,
            &SpamsumHasher,
            engine_config.min_function_size,
        )?;
        let report = engine
            .score(&profile)
            .with_context(|| format!("Failed to score {}", target.display()))?;
        if !opts.json {
            print_report(&report);
        }
        reports.push(report);
        Ok(())
    })?;

    if opts.json {
        let serialized = if opts.path.is_dir() {
            serde_json::to_string_pretty(&reports)?
        } else {
            serde_json::to_string_pretty(&reports.first())?
        };
        println!("{}", serialized);
    }
    Ok(summary)
}

fn print_report(report: &ScoreReport) {
    let result = &report.result;
    println!("Target: {}", report.target.display());
    println!("  Digest: {}", report.digest);
    println!("  Filetype: {}", report.filetype);
    println!("  Candidates: {}", report.candidates_considered);
    println!("Whitelist Average: {}", result.whitelist_average);
    println!("Blacklist Average: {}", result.blacklist_average);
    println!("            Score: {} ({})", result.composite_score, verdict(result.composite_score));

    if !report.possible_authors.is_empty() {
        println!("Possible authors of this binary:");
        for author in &report.possible_authors {
            println!("  - {}", author);
        }
    }
    if !report.possible_filenames.is_empty() {
        println!("Possible filenames this binary could go by:");
        for filename in &report.possible_filenames {
            println!("  - {}", filename);
        }
    }
    if !report.comments.is_empty() {
        println!("Comments about similar binaries:");
        for comment in &report.comments {
            println!("  - {}", comment);
        }
    }
    if let Some(learned) = report.learned {
        println!("=> Added to corpus as {}", learned);
    }
    println!("{}", "-".repeat(30));
}

fn verdict(composite: i64) -> &'static str {
    match composite {
        i64::MIN..=-51 => "likely malicious",
        -50..=-1 => "leans malicious",
        0 => "inconclusive",
        1..=50 => "leans benign",
        _ => "likely benign",
    }
}
