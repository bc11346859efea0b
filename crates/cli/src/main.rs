use anyhow::Result;
use clap::{Parser, Subcommand};
use codepair::commands::{
    build_command, decompile_command, extract_command, list_decompilers_command,
    list_extractors_command,
};
use codepair::init_logging;

/// Paired source/decompiled function dataset builder.
///
/// This CLI is a thin wrapper around `codepair-core` (exposed in code as `codepair_core`).
/// All substantive logic lives in the library so it can be tested thoroughly
/// and reused from other frontends.
#[derive(Parser, Debug)]
#[command(
    name = "codepair",
    version,
    about = "Build datasets pairing source functions with their decompiled counterparts",
    long_about = None
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract every function in a source repository and export the dataset.
    ///
    /// The output format follows the extension of `--out` (json, jsonl, csv,
    /// tsv, md, tex, html, xml, db/sqlite).
    Extract {
        /// Repository root to extract.
        #[arg(long)]
        repo: String,

        /// Output file.
        #[arg(long)]
        out: String,

        /// Generation mode: path, temp, or temp-append.
        #[arg(long, default_value = "temp")]
        mode: String,

        /// Keep scratch copies instead of deleting them afterwards.
        #[arg(long, default_value_t = false)]
        keep_temp: bool,

        /// Pipeline config file (JSON, or YAML by extension).
        #[arg(long)]
        config: Option<String>,
    },

    /// Decompile binaries and write the functions as JSON records.
    ///
    /// Directories contribute every recognized binary directly inside them.
    Decompile {
        /// Output JSON file.
        #[arg(long)]
        out: String,

        /// Pipeline config file (JSON, or YAML by extension).
        #[arg(long)]
        config: Option<String>,

        /// Binaries or directories of binaries.
        #[arg(required = true)]
        bins: Vec<String>,
    },

    /// Extract a repository, decompile its binaries, and pair the functions.
    Build {
        /// Repository root to extract.
        #[arg(long)]
        repo: String,

        /// Output file; format follows the extension.
        #[arg(long)]
        out: String,

        /// Replace decompiled symbol names with stripped `sub_` names.
        #[arg(long, default_value_t = false)]
        stripped: bool,

        /// Pipeline config file (JSON, or YAML by extension).
        #[arg(long)]
        config: Option<String>,

        /// Binaries built from the repository.
        bins: Vec<String>,
    },

    /// List the languages source extraction supports.
    ListExtractors {
        /// Emit JSON instead of human-readable output.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List the decompilers that can be selected in the config.
    ListDecompilers {
        /// Emit JSON instead of human-readable output.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Extract { repo, out, mode, keep_temp, config } => {
            extract_command(&repo, &out, &mode, keep_temp, config.as_deref())?
        }
        Command::Decompile { out, config, bins } => {
            decompile_command(&bins, &out, config.as_deref())?
        }
        Command::Build { repo, out, stripped, config, bins } => {
            build_command(&repo, &bins, &out, stripped, config.as_deref())?
        }
        Command::ListExtractors { json } => list_extractors_command(json)?,
        Command::ListDecompilers { json } => list_decompilers_command(json)?,
    }

    Ok(())
}
