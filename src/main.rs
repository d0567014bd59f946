//! # md-assist CLI (`mda`)
//!
//! ## Usage
//!
//! ```bash
//! mda --config ./config/mda.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mda chunk <file>` | Split a markdown file into word-bounded chunk files |
//! | `mda upload <file>` | Upload a document (or reuse the remembered upload) |
//! | `mda ask "<query>"` | Ask the assistant about the uploaded document |
//! | `mda session` | Show the remembered assistant, thread, and file ids |
//!
//! ## Examples
//!
//! ```bash
//! # Chunk with the default 4000-word budget into ./chunks
//! mda chunk SPDMSpecification.md --out-dir chunks
//!
//! # Preview chunk sizes without writing anything
//! mda chunk SPDMSpecification.md --max-words 1500 --dry-run
//!
//! # Ask a question; creates the assistant and thread on first use
//! OPENAI_API_KEY=sk-... mda ask "Summarize the key exchange" --file SPDMSpecification.md
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use md_assist::{ask_cmd, chunk_cmd, config, logging};

/// md-assist — chunk markdown documents and query them through a hosted
/// assistant.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Without one, every setting takes its default.
#[derive(Parser)]
#[command(
    name = "mda",
    about = "md-assist — chunk markdown documents and query them through a hosted assistant",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/mda.toml")]
    config: PathBuf,

    /// Enable debug logging on stderr (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a markdown file into word-bounded chunks.
    ///
    /// Paragraphs (separated by a blank line) are never split. Each chunk
    /// is written to `<file name>_chunk_<n>.md`.
    Chunk {
        /// Markdown file to split.
        path: PathBuf,

        /// Maximum words per chunk (overrides `chunking.max_words`).
        #[arg(long)]
        max_words: Option<usize>,

        /// Directory to write chunk files into (overrides `chunking.output_dir`).
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Show chunk sizes without writing files.
        #[arg(long)]
        dry_run: bool,

        /// With --dry-run, print the report as JSON.
        #[arg(long, requires = "dry_run")]
        json: bool,
    },

    /// Upload a document for the assistant, or reuse the remembered upload.
    Upload {
        /// Markdown file to upload.
        path: PathBuf,
    },

    /// Ask the assistant a question about the uploaded document.
    ///
    /// Creates the assistant and thread on first use and remembers their
    /// ids in `assistant.state_path`.
    Ask {
        /// The question to ask.
        query: String,

        /// Document to upload when no upload is remembered
        /// (defaults to `assistant.document`).
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Show the remembered assistant, thread, and file ids.
    Session,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    // A missing config file means defaults; a broken one is an error.
    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        tracing::debug!(config = %cli.config.display(), "no config file, using defaults");
        config::Config::minimal()
    };

    match cli.command {
        Commands::Chunk {
            path,
            max_words,
            out_dir,
            dry_run,
            json,
        } => {
            chunk_cmd::run_chunk(&cfg, &path, max_words, out_dir, dry_run, json)?;
        }
        Commands::Upload { path } => {
            ask_cmd::run_upload(&cfg, &path).await?;
        }
        Commands::Ask { query, file } => {
            ask_cmd::run_ask(&cfg, &query, file).await?;
        }
        Commands::Session => {
            ask_cmd::run_session(&cfg)?;
        }
    }

    Ok(())
}
