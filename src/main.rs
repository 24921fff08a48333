//! # RepoLens CLI (`rlens`)
//!
//! The `rlens` binary drives the analysis pipeline against an ingestion
//! dump produced by the repository fetch collaborator (a gitingest-style
//! text file). Fetching and cloning are not this tool's job — it starts
//! from the dump on disk.
//!
//! ## Usage
//!
//! ```bash
//! rlens --config ./repolens.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rlens ingest <dump>` | Parse, chunk, embed, and index a dump |
//! | `rlens ask <dump> "<question>"` | Answer a question about the repository |
//! | `rlens graph <dump>` | Print the dependency graph as JSON |
//! | `rlens stats <dump>` | Print corpus statistics |
//!
//! ## Examples
//!
//! ```bash
//! # Index a dump (prints the content fingerprint)
//! rlens ingest ./acme-api.txt
//!
//! # Ask a grounded question
//! rlens ask ./acme-api.txt "Where is request authentication handled?"
//!
//! # Export graph topology for the visualization layer
//! rlens graph ./acme-api.txt > graph.json
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use repolens::config::{self, Config};
use repolens::engine::Engine;
use repolens::inference::create_service;
use repolens::parser::fingerprint;

/// RepoLens — repository knowledge indexing and retrieval-augmented
/// question answering.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file with chunking, retrieval, inference, and index settings.
#[derive(Parser)]
#[command(
    name = "rlens",
    about = "RepoLens — repository knowledge indexing and RAG question answering",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults are used if
    /// the file does not exist.
    #[arg(long, global = true, default_value = "./repolens.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse, chunk, embed, and index an ingestion dump.
    ///
    /// Prints the content fingerprint and an ingestion report. With the
    /// default `disabled` inference provider the index is built without
    /// embeddings and queries will report no relevant context.
    Ingest {
        /// Path to the ingestion dump file.
        dump: PathBuf,
    },

    /// Answer a natural-language question about the repository.
    Ask {
        /// Path to the ingestion dump file.
        dump: PathBuf,

        /// The question to answer.
        question: String,
    },

    /// Print the dependency graph (nodes and edges) as JSON.
    Graph {
        /// Path to the ingestion dump file.
        dump: PathBuf,
    },

    /// Print corpus statistics for an ingested dump.
    Stats {
        /// Path to the ingestion dump file.
        dump: PathBuf,
    },
}

fn load_or_default(path: &PathBuf) -> Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        Ok(Config::default())
    }
}

async fn ingest_dump(engine: &Engine, dump: &PathBuf) -> Result<(String, repolens::models::IngestReport)> {
    let raw = std::fs::read_to_string(dump)
        .with_context(|| format!("Failed to read dump file: {}", dump.display()))?;
    let fp = fingerprint(&raw);
    let report = engine.ingest(&fp, &raw).await?;
    Ok((fp, report))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_or_default(&cli.config)?;
    let service = create_service(&config.inference)?;
    let engine = Engine::new(config, service);

    match cli.command {
        Commands::Ingest { dump } => {
            let (fp, report) = ingest_dump(&engine, &dump).await?;
            println!("ingest {}", dump.display());
            println!("  fingerprint: {}", fp);
            println!("  status: {:?}", report.status);
            println!("  files: {}", report.file_count);
            println!("  chunks: {}", report.chunk_count);
            for warning in &report.warnings {
                println!("  warning: {}", warning);
            }
            println!("ok");
        }

        Commands::Ask { dump, question } => {
            let (fp, _report) = ingest_dump(&engine, &dump).await?;
            let answer = engine.query(&fp, &question).await?;

            println!("{}", answer.answer_text);
            println!();
            println!("confidence: {:.2}", answer.confidence);
            if !answer.cited_sources.is_empty() {
                println!("sources:");
                for source in &answer.cited_sources {
                    println!("  - {}", source);
                }
            }
        }

        Commands::Graph { dump } => {
            let (fp, _report) = ingest_dump(&engine, &dump).await?;
            let graph = engine.graph(&fp)?;
            println!("{}", serde_json::to_string_pretty(&graph)?);
        }

        Commands::Stats { dump } => {
            let (fp, _report) = ingest_dump(&engine, &dump).await?;
            let stats = engine.stats(&fp)?;
            println!("stats {}", dump.display());
            println!("  fingerprint: {}", stats.fingerprint);
            println!("  files: {}", stats.file_count);
            println!("  chunks: {} ({} embedded)", stats.chunk_count, stats.embedded_count);
            println!("  dependencies: {}", stats.dependency_count);
            println!("  languages:");
            for (lang, count) in &stats.languages {
                println!("    {}: {}", lang, count);
            }
            println!("  file kinds:");
            for (kind, count) in &stats.file_kinds {
                println!("    {}: {}", kind, count);
            }
        }
    }

    Ok(())
}
