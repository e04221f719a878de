mod cli;
mod server;
mod tools;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mneme::config::MnemeConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mneme", version, about = "Personal knowledge agent with dual vector + graph retrieval")]
struct Cli {
    /// Config file (defaults to ~/.mneme/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a single question
    Ask {
        query: String,
        /// Print the full turn result as JSON
        #[arg(long)]
        json: bool,
        /// Also show status, turn id and entities
        #[arg(short, long)]
        verbose: bool,
    },
    /// Interactive multi-turn conversation
    Chat {
        #[arg(short, long)]
        verbose: bool,
    },
    /// Inspect the knowledge corpus
    Corpus {
        #[command(subcommand)]
        action: CorpusAction,
    },
    /// Start the MCP server (stdio transport)
    Serve,
}

#[derive(Subcommand)]
enum CorpusAction {
    /// Show chunk, node, edge and group counts
    Stats {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = match &cli.config {
        Some(path) => MnemeConfig::load_from(path)?,
        None => MnemeConfig::load()?,
    };

    // Log to stderr so stdout stays clean for MCP JSON-RPC and answers.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Ask {
            query,
            json,
            verbose,
        } => {
            cli::ask::ask(&config, &query, json, verbose).await?;
        }
        Command::Chat { verbose } => {
            cli::chat::chat(&config, verbose).await?;
        }
        Command::Corpus { action } => match action {
            CorpusAction::Stats { json } => {
                cli::corpus::stats(&config, json)?;
            }
        },
        Command::Serve => {
            anyhow::ensure!(
                config.server.transport == "stdio",
                "unsupported transport {:?}; only \"stdio\" is available",
                config.server.transport
            );
            server::serve_stdio(config).await?;
        }
    }

    Ok(())
}
