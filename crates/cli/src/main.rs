//! medchat CLI — the main entry point.
//!
//! Commands:
//! - `serve`  — Start the HTTP gateway (`POST /stream`, `GET /health`)
//! - `index`  — Build the vector index from the dialogue dataset
//! - `ask`    — Run one query through the pipeline and stream to stdout
//! - `config` — Print the effective configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "medchat",
    about = "medchat — retrieval-augmented medical information chat",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Build the vector index from a JSON Lines dataset
    Index {
        /// Dataset to ingest (defaults to retrieval.dataset_path)
        #[arg(short, long)]
        dataset: Option<PathBuf>,

        /// Rebuild even if an index already exists
        #[arg(short, long)]
        force: bool,
    },

    /// Ask a single question and stream the reply
    Ask {
        /// The question
        query: String,

        /// JSON file holding prior turns: [{"sender": "user"|"bot", "text": "..."}]
        #[arg(long)]
        history_file: Option<PathBuf>,
    },

    /// Show the effective configuration (secrets redacted)
    Config {
        /// Print only the config file location
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so `ask` output stays clean on stdout.
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Index { dataset, force } => commands::index::run(dataset, force).await?,
        Commands::Ask {
            query,
            history_file,
        } => commands::ask::run(query, history_file).await?,
        Commands::Config { path } => commands::config_cmd::run(path)?,
    }

    Ok(())
}
