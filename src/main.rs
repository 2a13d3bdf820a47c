//! # docquery CLI (`docq`)
//!
//! The `docq` binary is the interface to docquery. It provides commands for
//! ingesting a directory of PDFs into the vector index and asking questions
//! about the indexed content, one-shot or as an interactive chat session.
//!
//! ## Usage
//!
//! ```bash
//! docq --config ./config/docquery.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docq ingest` | Ingest PDFs from the source directory (incremental) |
//! | `docq ask "<question>"` | Answer a single question against the index |
//! | `docq chat` | Interactive question-answering session with history |
//! | `docq stats` | Show vector index statistics |
//!
//! ## Examples
//!
//! ```bash
//! # Incremental ingestion from the configured directory
//! docq ingest --config ./config/docquery.toml
//!
//! # Re-ingest everything, replacing stored vectors
//! docq ingest --force
//!
//! # Preview chunk counts without writing anything
//! docq ingest --dry-run
//!
//! # One-shot question (any supported language)
//! docq ask "what is the fiscal deficit target?"
//!
//! # Interactive session
//! docq chat
//! ```

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use docquery::config::{self, Config};
use docquery::embedding::{create_provider, EmbeddingProvider};
use docquery::index::{create_index, VectorIndex};
use docquery::ingest::Ingestor;
use docquery::models::{ConversationTurn, FileStatus, IngestReport};
use docquery::pipeline::ChatEngine;

/// docquery CLI — multilingual question answering over local PDF documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docquery.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docq",
    about = "docquery — multilingual question answering over local PDF documents",
    version,
    long_about = "docquery ingests a directory of PDFs into a vector index (recursive \
    chunking, Cohere embeddings, Pinecone or in-memory storage) and answers questions \
    about them through a retrieval-augmented chat loop with language normalization \
    and out-of-band source attribution."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/docquery.toml`. All ingestion, chunking,
    /// provider, and retrieval settings are read from this file.
    #[arg(long, global = true, default_value = "./config/docquery.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Ingest PDF documents into the vector index.
    ///
    /// Scans the source directory for PDFs, skips files whose content
    /// fingerprint matches the processed-files cache, and chunks, embeds,
    /// and upserts the rest. Safe to re-run: unchanged files are skipped
    /// and changed files overwrite their old vectors.
    Ingest {
        /// Directory to scan instead of the configured source directory.
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Ignore the processed-files cache and re-ingest every file,
        /// deleting its previously stored vectors first.
        #[arg(long)]
        force: bool,

        /// Show page and chunk counts without embedding or writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Answer a single question against the indexed documents.
    ///
    /// The question may be in any supported language; the answer comes back
    /// in the same language with source attributions listed after it.
    Ask {
        /// The question to answer.
        question: String,
    },

    /// Start an interactive question-answering session.
    ///
    /// Maintains conversation history so follow-up questions are understood
    /// in context. Type `exit` or press Ctrl-D to leave.
    Chat,

    /// Show vector index statistics.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("docquery=warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest {
            dir,
            force,
            dry_run,
        } => run_ingest(&cfg, dir, force, dry_run).await?,
        Commands::Ask { question } => run_ask(&cfg, &question).await?,
        Commands::Chat => run_chat(&cfg).await?,
        Commands::Stats => run_stats(&cfg).await?,
    }

    Ok(())
}

async fn run_ingest(cfg: &Config, dir: Option<PathBuf>, force: bool, dry_run: bool) -> Result<()> {
    let embedder: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&cfg.embedding)?);
    let index: Arc<dyn VectorIndex> = Arc::from(create_index(&cfg.index, cfg.embedding.dimension)?);
    if !dry_run {
        index.ensure_ready().await?;
    }

    let dir = dir.unwrap_or_else(|| cfg.ingest.source_dir.clone());
    let ingestor = Ingestor::new(cfg, embedder, index);
    let report = ingestor.run(&dir, force, dry_run).await?;
    print_report(&report, dry_run);

    if report.status == "partial" {
        std::process::exit(1);
    }
    Ok(())
}

fn print_report(report: &IngestReport, dry_run: bool) {
    for file in &report.details {
        match file.status {
            FileStatus::Skipped => println!("  {} — unchanged, skipped", file.filename),
            FileStatus::Empty => println!("  {} — no extractable text", file.filename),
            FileStatus::Succeeded if dry_run => println!(
                "  {} — {} pages, {} chunks (dry run)",
                file.filename, file.pages, file.chunks
            ),
            FileStatus::Succeeded => println!(
                "  {} — {} pages, {} chunks, {} vectors",
                file.filename, file.pages, file.chunks, file.vectors_added
            ),
            FileStatus::Failed => println!(
                "  {} — FAILED: {}",
                file.filename,
                file.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
    println!(
        "\nIngestion {}: {} documents, {} chunks, {} errors",
        report.status, report.documents_ingested, report.total_chunks, report.errors
    );
}

async fn run_ask(cfg: &Config, question: &str) -> Result<()> {
    let engine = ChatEngine::new(cfg)?;
    let response = engine.answer(question, &[]).await?;

    println!("{}", response.answer);
    print_sources(&response.sources);
    Ok(())
}

async fn run_chat(cfg: &Config) -> Result<()> {
    let engine = ChatEngine::new(cfg)?;
    let mut history: Vec<ConversationTurn> = Vec::new();

    println!("docquery chat — type a question, or `exit` to leave.\n");

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "exit" || question == "quit" {
            break;
        }

        if history.is_empty() {
            let title = engine.title_for(question).await;
            println!("[{}]\n", title);
        }

        match engine.answer(question, &history).await {
            Ok(response) => {
                println!("\n{}", response.answer);
                print_sources(&response.sources);
                println!();

                let mut assistant = ConversationTurn::assistant(&response.answer);
                assistant.sources = response.sources;
                history.push(ConversationTurn::user(question));
                history.push(assistant);
            }
            Err(e) => {
                eprintln!("error: {:#}", e);
            }
        }
    }

    Ok(())
}

fn print_sources(sources: &[docquery::models::SourceAttribution]) {
    if sources.is_empty() {
        return;
    }
    println!("\nSources:");
    for source in sources {
        println!("  - {}, page {}", source.doc_name, source.page_number);
    }
}

async fn run_stats(cfg: &Config) -> Result<()> {
    let index: Arc<dyn VectorIndex> = Arc::from(create_index(&cfg.index, cfg.embedding.dimension)?);
    index.ensure_ready().await?;
    let stats = index.stats().await?;

    println!("Index: {}", cfg.index.index_name);
    println!("  vectors:   {}", stats.total_vector_count);
    println!("  dimension: {}", stats.dimension);
    if !stats.namespaces.is_empty() {
        println!("  namespaces: {}", stats.namespaces.join(", "));
    }
    Ok(())
}
