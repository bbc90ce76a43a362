//! # HR Assistant CLI (`hrbot`)
//!
//! ## Usage
//!
//! ```bash
//! hrbot --config ./config/hrbot.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `hrbot rebuild` | Index the policy folder and print statistics |
//! | `hrbot search "<question>"` | Show the context bundle a question retrieves |
//! | `hrbot ask "<question>" [--online]` | Answer a question, streaming to stdout |
//! | `hrbot serve` | Rebuild, then start the HTTP API |
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); answers go to stdout.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use hr_assistant::assistant::Assistant;
use hr_assistant::config::load_config;
use hr_assistant::server::run_server;

/// HR policy assistant: hybrid retrieval over company documents with
/// LLM-generated answers.
#[derive(Parser)]
#[command(name = "hrbot", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/hrbot.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the keyword and semantic indices from the policy folder.
    Rebuild,

    /// Show the retrieved context for a question without generating.
    Search {
        question: String,

        /// Print the context bundle as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Answer a question.
    Ask {
        question: String,

        /// Answer from general knowledge instead of the policy documents.
        #[arg(long)]
        online: bool,
    },

    /// Rebuild, then serve the HTTP API on `[server].bind`.
    Serve {
        /// Override the bind address.
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let assistant = Assistant::from_config(&config)?;

    match cli.command {
        Commands::Rebuild => {
            let report = assistant.rebuild().await?;
            println!("Index generation {}", report.generation);
            println!("  documents:        {}", report.documents);
            println!("  failed documents: {}", report.failed_documents.len());
            for name in &report.failed_documents {
                println!("    - {}", name);
            }
            println!("  chunks:           {} ({} tables)", report.chunks, report.table_chunks);
            if report.semantic_enabled {
                println!(
                    "  semantic records: {} ({} failed batches)",
                    report.semantic_records, report.failed_batches
                );
            } else {
                println!("  semantic index:   disabled");
            }
        }
        Commands::Search { question, json } => {
            assistant.rebuild().await?;
            let report = assistant.search(&question).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Expanded: {}", report.expanded_question);
                match &report.rendered {
                    Some(rendered) => println!("\n{}", rendered),
                    None => println!("\nNo relevant context found."),
                }
            }
        }
        Commands::Ask { question, online } => {
            if !online {
                assistant.rebuild().await?;
            }
            let mut answer = assistant.ask_streaming(&question, online).await?;
            let mut stdout = std::io::stdout();
            while let Some(delta) = answer.text.next().await {
                write!(stdout, "{}", delta?)?;
                stdout.flush()?;
            }
            writeln!(stdout)?;
        }
        Commands::Serve { bind } => {
            if let Err(e) = assistant.rebuild().await {
                warn!(error = %format!("{:#}", e), "startup index build failed; POST /api/update_index to retry");
            }
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            run_server(&bind, Arc::new(assistant)).await?;
        }
    }

    Ok(())
}
