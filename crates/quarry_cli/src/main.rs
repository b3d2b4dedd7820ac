//! Quarry CLI
//!
//! Command-line tools for running selector queries over JSON documents.
//!
//! # Commands
//!
//! - `find` - Load JSON-lines documents, declare indexes and run a selector
//! - `indexes` - List the indexes recorded in an index database

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Quarry command-line query tools.
#[derive(Parser)]
#[command(name = "quarry")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the index database; in-memory when absent
    #[arg(global = true, long)]
    index_db: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a selector over documents loaded from a JSON-lines file
    Find {
        /// JSON-lines file with one document object per line
        #[arg(short, long)]
        docs: PathBuf,

        /// Selector as JSON, e.g. '{"name": "mike"}'
        #[arg(short, long)]
        selector: String,

        /// Comma-separated fields of a JSON index (repeatable)
        #[arg(short, long = "index")]
        indexes: Vec<String>,

        /// Comma-separated fields of the text index
        #[arg(long)]
        text_index: Option<String>,

        /// Tokenizer of the text index, e.g. porter
        #[arg(long)]
        tokenizer: Option<String>,

        /// Sort field as `field`, `field:asc` or `field:desc` (repeatable)
        #[arg(long = "sort")]
        sort: Vec<String>,

        /// Number of results to skip
        #[arg(long, default_value = "0")]
        skip: usize,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Comma-separated top-level fields to return
        #[arg(short, long)]
        fields: Option<String>,

        /// Output format (jsonl, json)
        #[arg(long, default_value = "jsonl")]
        format: String,
    },

    /// List the indexes recorded in an index database
    Indexes {
        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Find {
            docs,
            selector,
            indexes,
            text_index,
            tokenizer,
            sort,
            skip,
            limit,
            fields,
            format,
        } => {
            let args = commands::find::FindArgs {
                docs,
                index_db: cli.index_db,
                selector,
                indexes,
                text_index,
                tokenizer,
                sort,
                skip,
                limit,
                fields,
            };
            commands::find::run(&args, &format)?;
        }
        Commands::Indexes { format } => {
            let path = cli.index_db.ok_or("Index database path required for indexes")?;
            commands::indexes::run(&path, &format)?;
        }
        Commands::Version => {
            println!("Quarry CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
