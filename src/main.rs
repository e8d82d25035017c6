//! # fileweave CLI (`fw`)
//!
//! The `fw` binary drives the indexing pipeline: database
//! initialization, repository/vault scanning, file ingestion with
//! content-addressed versioning, markdown rendering, and the document
//! conversion/embedding queue.
//!
//! ## Usage
//!
//! ```bash
//! fw --config ./config/fw.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fw init` | Create the SQLite database and run schema migrations |
//! | `fw scan repos <path>` | Discover git repositories under a path |
//! | `fw scan vaults <path>` | Discover note vaults under a path |
//! | `fw scan list <path>` | List all non-ignored files under a path |
//! | `fw process <repos\|vaults\|all>` | Ingest scanned files into versioned records |
//! | `fw doc convert <source>` | Convert one ad-hoc URL or markdown file |
//! | `fw doc process-pending` | Run the pipeline over every queued input |
//! | `fw doc process-file <id>` | Run the pipeline for one file record |
//! | `fw file show <id>` | Print one file record |
//! | `fw file search <text>` | Search records by name/content |
//! | `fw status` | Indexing status summary |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use fileweave::{
    config, docs, files, ingest, migrate, models::ScanKind, pipeline, queue, scanner, stats,
};

/// fileweave — content-addressed file versioning and document indexing.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/fw.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "fw",
    about = "fileweave — content-addressed file versioning and document indexing",
    version,
    long_about = "fileweave scans filesystem roots (git repositories and note vaults), \
    deduplicates files by content hash into versioned records, renders canonical markdown \
    into a mirrored vault tree, and feeds it through a conversion, chunking, and embedding \
    pipeline tracked by a durable processing queue."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/fw.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. This
    /// command is idempotent — running it multiple times is safe.
    Init,

    /// Scan filesystem roots.
    Scan {
        #[command(subcommand)]
        target: ScanTarget,
    },

    /// Ingest scanned files into versioned records.
    ///
    /// Reads the file lists recorded by `fw scan`, creates a new file
    /// record version for every new or changed file, renders canonical
    /// markdown into the vault tree, and enqueues each new version for
    /// document processing.
    Process {
        #[command(subcommand)]
        target: ProcessTarget,
    },

    /// Document conversion and embedding.
    Doc {
        #[command(subcommand)]
        action: DocAction,
    },

    /// Inspect file records.
    File {
        #[command(subcommand)]
        action: FileAction,
    },

    /// Show the indexing status summary.
    Status,
}

/// Scan subcommands.
#[derive(Subcommand)]
enum ScanTarget {
    /// Discover git repositories (any directory containing `.git`).
    Repos {
        /// Path to scan.
        path: PathBuf,

        /// Walk all files instead of asking git for the tracked set.
        #[arg(long)]
        untracked: bool,
    },

    /// Discover note vaults (any directory containing the vault marker).
    Vaults {
        /// Path to scan.
        path: PathBuf,
    },

    /// List all non-ignored files under a path.
    List {
        /// Path to list.
        path: PathBuf,

        /// Output the full scan result as JSON.
        #[arg(long, short)]
        json: bool,
    },
}

/// Process subcommands.
#[derive(Subcommand)]
enum ProcessTarget {
    /// Process files from scanned repositories.
    Repos,
    /// Process files from scanned vaults.
    Vaults,
    /// Process files from every scanned root.
    All,
}

/// Document pipeline subcommands.
#[derive(Subcommand)]
enum DocAction {
    /// Convert a single ad-hoc source (URL or markdown file path).
    Convert {
        /// Source URL or file path to convert.
        source: String,
    },

    /// Process every unprocessed queue entry.
    ///
    /// Retries entries whose earlier attempts failed; one entry's
    /// failure never halts the sweep.
    ProcessPending,

    /// Process a specific file record through the pipeline.
    ProcessFile {
        /// File record id.
        file_id: String,
    },

    /// Print a document and its chunks.
    Show {
        /// Document id.
        id: i64,
    },

    /// Print the error trail of every queue entry that recorded one.
    Errors,
}

/// File record subcommands.
#[derive(Subcommand)]
enum FileAction {
    /// Print one file record in full.
    Show {
        /// File record id.
        id: String,
    },

    /// Search file records by name or content.
    Search {
        /// Text to search for.
        text: String,
    },

    /// List records matching one equality filter.
    List {
        #[arg(long)]
        source_type: Option<String>,
        #[arg(long)]
        source_name: Option<String>,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        suffix: Option<String>,
        #[arg(long)]
        mimetype: Option<String>,
    },

    /// Print the derived line rows for a file record.
    Lines {
        /// File record id.
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Scan { target } => match target {
            ScanTarget::Repos { path, untracked } => {
                scanner::run_scan_repos(&cfg, &path, !untracked).await?;
            }
            ScanTarget::Vaults { path } => {
                scanner::run_scan_vaults(&cfg, &path).await?;
            }
            ScanTarget::List { path, json } => {
                scanner::run_scan_list(&cfg, &path, json).await?;
            }
        },
        Commands::Process { target } => match target {
            ProcessTarget::Repos => ingest::run_process(&cfg, Some(ScanKind::Repo)).await?,
            ProcessTarget::Vaults => ingest::run_process(&cfg, Some(ScanKind::Vault)).await?,
            ProcessTarget::All => ingest::run_process(&cfg, None).await?,
        },
        Commands::Doc { action } => match action {
            DocAction::Convert { source } => {
                pipeline::run_convert(&cfg, &source).await?;
            }
            DocAction::ProcessPending => {
                pipeline::run_process_pending(&cfg).await?;
            }
            DocAction::ProcessFile { file_id } => {
                pipeline::run_process_file(&cfg, &file_id).await?;
            }
            DocAction::Show { id } => {
                docs::run_doc_show(&cfg, id).await?;
            }
            DocAction::Errors => {
                queue::run_queue_errors(&cfg).await?;
            }
        },
        Commands::File { action } => match action {
            FileAction::Show { id } => {
                files::run_file_show(&cfg, &id).await?;
            }
            FileAction::Search { text } => {
                files::run_file_search(&cfg, &text).await?;
            }
            FileAction::List {
                source_type,
                source_name,
                host,
                suffix,
                mimetype,
            } => {
                let filter = match (&source_type, &source_name, &host, &suffix, &mimetype) {
                    (Some(v), None, None, None, None) => files::FileFilter::SourceType(v),
                    (None, Some(v), None, None, None) => files::FileFilter::SourceName(v),
                    (None, None, Some(v), None, None) => files::FileFilter::Host(v),
                    (None, None, None, Some(v), None) => files::FileFilter::Suffix(v),
                    (None, None, None, None, Some(v)) => files::FileFilter::Mimetype(v),
                    _ => anyhow::bail!(
                        "specify exactly one of --source-type, --source-name, --host, --suffix, --mimetype"
                    ),
                };
                files::run_file_list(&cfg, filter).await?;
            }
            FileAction::Lines { id } => {
                files::run_file_lines(&cfg, &id).await?;
            }
        },
        Commands::Status => {
            stats::run_status(&cfg).await?;
        }
    }

    Ok(())
}
