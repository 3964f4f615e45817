//! # vidscribe CLI
//!
//! ## Usage
//!
//! ```bash
//! vidscribe --config ./config/vidscribe.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vidscribe videos <root>` | List video files under a folder |
//! | `vidscribe extract <archive> <dest>` | Extract a zip archive |
//! | `vidscribe process <root> <audio> <text>` | Chunk, transcribe, and record every video |
//! | `vidscribe index --json-path <p>` | Build and persist the vector index |
//! | `vidscribe query --json-path <p> --query <q>` | Search transcripts |
//!
//! ## Examples
//!
//! ```bash
//! # Transcribe a course in 30 second chunks
//! vidscribe process ./course ./work/audio ./work/text --chunk-ms 30000
//!
//! # Ask a question, rebuilding the index first
//! vidscribe query --json-path ./transcriptions.json --query "setting up the database" --rebuild
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use vidscribe::progress::ProgressMode;
use vidscribe::{archive, config, discover, pipeline, search};

/// vidscribe: transcribe video folders and search the transcripts.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults.
#[derive(Parser)]
#[command(
    name = "vidscribe",
    about = "Transcribe folders of videos and search the transcripts",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/vidscribe.toml")]
    config: PathBuf,

    /// Progress on stderr: `auto`, `human`, `json`, or `off`.
    #[arg(long, global = true, default_value = "auto")]
    progress: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every video file found under a folder.
    Videos {
        /// Folder to search recursively.
        root: PathBuf,
    },

    /// Extract a `.zip` archive into a folder.
    Extract {
        archive: PathBuf,
        dest: PathBuf,
    },

    /// Transcribe every video under a folder.
    ///
    /// Audio chunks are written under `audio_folder`, per-chunk text files
    /// under `text_folder`, and the combined record to
    /// `transcriptions.json` next to `root_folder`.
    ///
    /// The default `google` provider needs an API key, read from
    /// `[transcription] api_key` or the `GOOGLE_SPEECH_API_KEY` environment
    /// variable. The `openai` provider reads `OPENAI_API_KEY` instead.
    Process {
        root_folder: PathBuf,
        audio_folder: PathBuf,
        text_folder: PathBuf,

        /// Chunk length in milliseconds (overrides `[chunking] chunk_ms`).
        #[arg(long)]
        chunk_ms: Option<u64>,

        /// Remove the root folder after a fully successful run.
        #[arg(long)]
        delete_root: bool,
    },

    /// Build the vector index from a transcript record.
    ///
    /// Any existing index artifacts are deleted first.
    Index {
        /// Path to `transcriptions.json`.
        #[arg(long, alias = "json_path")]
        json_path: PathBuf,
    },

    /// Search a transcript record.
    ///
    /// Reuses the persisted index when it was built from the same record
    /// with the same embedding model, otherwise rebuilds it.
    Query {
        /// Path to `transcriptions.json`.
        #[arg(long, alias = "json_path")]
        json_path: PathBuf,

        /// Natural-language query.
        #[arg(long)]
        query: String,

        /// Number of results (defaults to `[retrieval] top_k`).
        #[arg(short)]
        k: Option<usize>,

        /// Rebuild the index even if it is fresh.
        #[arg(long)]
        rebuild: bool,

        /// Output format: `text` or `json`.
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that don't require config
    match &cli.command {
        Commands::Videos { root } => {
            discover::run_list_videos(root)?;
            return Ok(());
        }
        Commands::Extract { archive, dest } => {
            archive::run_extract(archive, dest)?;
            return Ok(());
        }
        _ => {}
    }

    let mut cfg = config::load_config(&cli.config)?;
    let progress = ProgressMode::parse(&cli.progress)?.reporter();

    match cli.command {
        Commands::Process {
            root_folder,
            audio_folder,
            text_folder,
            chunk_ms,
            delete_root,
        } => {
            if let Some(ms) = chunk_ms {
                cfg.chunking.chunk_ms = ms;
            }
            if delete_root {
                cfg.cleanup.delete_root = true;
            }
            config::validate(&cfg)?;
            pipeline::run_process(
                &cfg,
                &root_folder,
                &audio_folder,
                &text_folder,
                progress.as_ref(),
            )
            .await?;
        }
        Commands::Index { json_path } => {
            search::run_index(&cfg, &json_path, progress.as_ref()).await?;
        }
        Commands::Query {
            json_path,
            query,
            k,
            rebuild,
            format,
        } => {
            search::run_query(
                &cfg,
                &json_path,
                &query,
                k,
                rebuild,
                &format,
                progress.as_ref(),
            )
            .await?;
        }
        Commands::Videos { .. } | Commands::Extract { .. } => {}
    }

    Ok(())
}
