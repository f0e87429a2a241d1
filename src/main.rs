//! # ragpipe CLI
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragpipe init` | Create the SQLite vector index schema |
//! | `ragpipe ingest` | Run one ingestion tick over the pending prefix |
//! | `ragpipe ask "<question>"` | Answer a question through the RAG pipeline |
//! | `ragpipe serve` | Start the chat API and the periodic ingestion scheduler |
//!
//! All commands accept `--config` pointing to a TOML configuration file.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use ragpipe::chat::{ChatOutcome, ChatService};
use ragpipe::config;
use ragpipe::db;
use ragpipe::embedding;
use ragpipe::index::SqliteVectorIndex;
use ragpipe::ingest::{run_scheduler, IngestionPipeline};
use ragpipe::llm;
use ragpipe::retrieval::RetrievalAugmenter;
use ragpipe::server;
use ragpipe::store;

/// ragpipe — a blob-store-fed document ingestion and retrieval-augmented
/// chat service.
#[derive(Parser)]
#[command(
    name = "ragpipe",
    about = "Blob-store-fed document ingestion and retrieval-augmented chat service",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragpipe.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the vector index schema.
    ///
    /// Creates the SQLite database file and tables. Idempotent.
    Init,

    /// Run one ingestion tick: discover pending documents, load, chunk,
    /// embed, and archive them.
    Ingest {
        /// List discovered keys without loading, embedding, or archiving.
        #[arg(long)]
        dry_run: bool,
    },

    /// Ask a question through the retrieval-augmented pipeline.
    Ask {
        /// The question to answer.
        question: String,
    },

    /// Start the HTTP chat API together with the periodic ingestion
    /// scheduler.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.index.path).await?;
            db::init_schema(&pool).await?;
            println!("Vector index initialized at {}", cfg.index.path.display());
        }
        Commands::Ingest { dry_run } => {
            let blob_store = store::create_store(&cfg.store)?;
            let pool = db::connect(&cfg.index.path).await?;
            db::init_schema(&pool).await?;
            let embedder = embedding::create_embedder(&cfg.embedding)?;
            let index = Arc::new(SqliteVectorIndex::new(pool, embedder));
            let pipeline = IngestionPipeline::new(blob_store, index, &cfg)?;

            if dry_run {
                let keys = pipeline.discover().await?;
                println!("ingest (dry-run)");
                println!("  pending documents: {}", keys.len());
                for key in keys {
                    println!("  {}", key);
                }
                return Ok(());
            }

            let report = pipeline.run_tick().await?;
            println!("ingest");
            println!("  discovered: {}", report.discovered);
            println!("  indexed chunks: {}", report.indexed_chunks);
            println!("  succeeded: {}", report.succeeded.len());
            println!("  failed: {}", report.failed.len());
            println!("  archived: {}", report.archived);
            println!("  archive skipped: {}", report.archive_skipped);
        }
        Commands::Ask { question } => {
            let chat = build_chat_service(&cfg).await?;
            match chat.answer(&question).await? {
                ChatOutcome::Answer(text) => println!("{}", text),
                ChatOutcome::NoAnswer => println!("(no answer)"),
                ChatOutcome::NoContext => println!("{}", server::REFUSAL_MESSAGE),
            }
        }
        Commands::Serve => {
            let blob_store = store::create_store(&cfg.store)?;
            let pool = db::connect(&cfg.index.path).await?;
            db::init_schema(&pool).await?;
            let embedder = embedding::create_embedder(&cfg.embedding)?;
            let index = Arc::new(SqliteVectorIndex::new(pool, embedder));

            let pipeline = Arc::new(IngestionPipeline::new(
                blob_store,
                index.clone(),
                &cfg,
            )?);
            tokio::spawn(run_scheduler(pipeline, cfg.ingestion.interval_secs));

            let augmenter = RetrievalAugmenter::new(index, &cfg.retrieval);
            let llm_client = llm::create_llm_client(&cfg.chat)?;
            let chat = Arc::new(ChatService::new(augmenter, llm_client));

            server::run_server(&cfg, chat).await?;
        }
    }

    Ok(())
}

async fn build_chat_service(cfg: &config::Config) -> Result<ChatService> {
    let pool = db::connect(&cfg.index.path).await?;
    db::init_schema(&pool).await?;
    let embedder = embedding::create_embedder(&cfg.embedding)?;
    let index = Arc::new(SqliteVectorIndex::new(pool, embedder));
    let augmenter = RetrievalAugmenter::new(index, &cfg.retrieval);
    let llm_client = llm::create_llm_client(&cfg.chat)?;
    Ok(ChatService::new(augmenter, llm_client))
}
