mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use sutta_agent::config::SuttaConfig;

#[derive(Parser)]
#[command(name = "sutta", version, about = "Research agent over the Sutta Pitaka")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a question and get a cited answer
    Ask {
        question: String,
        /// Model id, e.g. ollama/llama3.1 (see `sutta models`)
        #[arg(short, long)]
        model: Option<String>,
        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the suttas most related to a query, without the agent
    Search {
        query: String,
        /// Number of passages to pull before grouping (10-500)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Index pre-chunked passages from a JSONL file
    Import { file: PathBuf },
    /// List models available to the agent
    Models,
    /// Show corpus and memory statistics
    Stats,
    /// Export stored insights as JSON to stdout
    Export,
    /// Delete all stored insights
    Reset,
    /// Run database diagnostics
    Doctor,
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to ~/.sutta-agent/models/
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = SuttaConfig::load()?;

    // stdout carries answers and JSON; logs go to stderr
    let filter =
        EnvFilter::try_new(&config.logging.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Ask {
            question,
            model,
            json,
        } => cli::ask::ask(config, &question, model.as_deref(), json).await?,
        Command::Search { query, top_k, json } => {
            cli::search::search(config, &query, top_k, json).await?
        }
        Command::Import { file } => cli::import::import(&config, &file).await?,
        Command::Models => cli::models::models(&config),
        Command::Stats => cli::stats::stats(&config)?,
        Command::Export => cli::export::export(&config)?,
        Command::Reset => cli::reset::reset(&config)?,
        Command::Doctor => cli::doctor::doctor(&config)?,
        Command::Model { action } => match action {
            ModelAction::Download => cli::model_download(&config.embedding).await?,
        },
    }

    Ok(())
}
