use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use malsim::commands::{
    init_command, learn_command, list_command, score_command, sigs_command, LearnOptions,
    ScoreOptions,
};
use malsim::canonicalize_or_current;
use malsim_core::logging::{init_tracing, init_tracing_json, verbosity_directive};
use malsim_core::model::TrustLevel;

/// Function-level similarity scoring of binaries against a whitelist/blacklist corpus.
///
/// This CLI is a thin wrapper around `malsim-core` (exposed in code as `malsim_core`).
/// All substantive logic lives in the library.
#[derive(Parser, Debug)]
#[command(
    name = "malsim",
    version,
    about = "Score binaries against a trusted/untrusted corpus",
    long_about = None
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON on stderr.
    #[arg(long, default_value_t = false, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

/// Where the corpus lives and how the engine is configured.
#[derive(Args, Debug, Clone)]
struct CorpusArgs {
    /// Path to the corpus database. Overrides the config file.
    #[arg(short = 'D', long)]
    database: Option<String>,

    /// Engine config file (.json, .yaml or .yml).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or migrate the corpus database.
    Init {
        #[command(flatten)]
        corpus: CorpusArgs,
    },

    /// Print the signature file (content digest + one fingerprint per function) for a binary.
    Sigs {
        /// Binary to fingerprint.
        path: String,

        /// Write signatures here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Engine config file (.json, .yaml or .yml).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Function extractor to use (see config `extractor`).
        #[arg(long)]
        extractor: Option<String>,
    },

    /// Add a binary, signature file or directory to the corpus with a trust level.
    Learn {
        /// Binary, signature file or directory (walked recursively, symlinks skipped).
        path: String,

        /// Classification of the binary.
        #[arg(value_parser = parse_trust_level)]
        trust_level: TrustLevel,

        /// Suspected author.
        #[arg(short, long, default_value = "unknown")]
        author: String,

        /// Filenames the binary is known by. Defaults to its path.
        #[arg(short, long)]
        filenames: Option<String>,

        /// Free-text comment.
        #[arg(short, long, default_value = "")]
        comment: String,

        /// Replace an existing entry with the same content digest.
        #[arg(short, long, default_value_t = false)]
        overwrite: bool,

        /// Skip extraction; PATH holds signature files produced by `sigs`.
        /// Line 1 must be a SHA-256 digest; MD5-keyed signature files are rejected.
        #[arg(short, long, default_value_t = false)]
        sigs_only: bool,

        /// Filetype to record for signature files.
        #[arg(long)]
        filetype: Option<String>,

        /// Function extractor to use.
        #[arg(long)]
        extractor: Option<String>,

        #[command(flatten)]
        corpus: CorpusArgs,
    },

    /// Score a binary or directory of binaries against the corpus.
    Score {
        /// Binary or directory (walked recursively, symlinks skipped).
        path: String,

        /// Compare against the whole corpus instead of same-filetype binaries only.
        #[arg(short, long, default_value_t = false)]
        all: bool,

        /// Never mirror the corpus into memory.
        #[arg(long, default_value_t = false)]
        leave_db_on_disk: bool,

        /// Learn decisively classified targets back into the corpus.
        #[arg(long, default_value_t = false)]
        add_strong_matches: bool,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Worker threads for candidate scoring.
        #[arg(long)]
        workers: Option<usize>,

        /// Function extractor to use.
        #[arg(long)]
        extractor: Option<String>,

        #[command(flatten)]
        corpus: CorpusArgs,
    },

    /// List catalogued binaries.
    List {
        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,

        #[command(flatten)]
        corpus: CorpusArgs,
    },
}

fn parse_trust_level(value: &str) -> Result<TrustLevel, String> {
    value.parse().map_err(|e: malsim_core::model::FormatError| e.to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let directive = verbosity_directive(cli.verbose);
    if cli.log_json {
        init_tracing_json(directive);
    } else {
        init_tracing(directive);
    }

    match cli.command {
        Command::Init { corpus } => {
            init_command(corpus.config.as_deref(), corpus.database.as_deref())?
        }
        Command::Sigs { path, output, config, extractor } => {
            let path = canonicalize_or_current(&path)?;
            sigs_command(&path, output.as_deref(), config.as_deref(), extractor.as_deref())?
        }
        Command::Learn {
            path,
            trust_level,
            author,
            filenames,
            comment,
            overwrite,
            sigs_only,
            filetype,
            extractor,
            corpus,
        } => {
            let opts = LearnOptions {
                // Kept as given: it doubles as the default `filenames` metadata.
                path: PathBuf::from(path),
                trust_level,
                author,
                filenames,
                comment,
                overwrite,
                sigs_only,
                filetype,
                database: corpus.database,
                config: corpus.config,
                extractor,
            };
            learn_command(&opts)?;
        }
        Command::Score {
            path,
            all,
            leave_db_on_disk,
            add_strong_matches,
            json,
            workers,
            extractor,
            corpus,
        } => {
            let opts = ScoreOptions {
                path: canonicalize_or_current(&path)?,
                compare_all: all,
                leave_db_on_disk,
                add_strong_matches,
                json,
                workers,
                database: corpus.database,
                config: corpus.config,
                extractor,
            };
            score_command(&opts)?;
        }
        Command::List { json, corpus } => {
            list_command(corpus.config.as_deref(), corpus.database.as_deref(), json)?
        }
    }

    Ok(())
}
