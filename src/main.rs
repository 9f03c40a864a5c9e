//! # Ragmill CLI
//!
//! The `ragmill` binary operates the engine locally and serves the HTTP
//! API.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragmill init` | Create the SQLite database and run schema migrations |
//! | `ragmill corpora` | List corpora with ingestion progress |
//! | `ragmill scan <corpus>` | Discover `*.txt` files under the corpus path |
//! | `ragmill estimate <corpus>` | Project embedding cost before ingesting |
//! | `ragmill ingest <corpus>` | Run the ingestion pipeline |
//! | `ragmill ask <corpus> "<query>"` | Start or continue a grounded conversation |
//! | `ragmill serve` | Start the HTTP API server |
//!
//! `<corpus>` accepts a corpus id or its unique name. All commands read the
//! TOML configuration given by `--config` (default `./config/ragmill.toml`);
//! provider credentials come from `OPENAI_API_KEY`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ragmill::config;
use ragmill::conversation::{self, ContinueConversation, StartConversation};
use ragmill::corpus;
use ragmill::cost;
use ragmill::db;
use ragmill::engine::Engine;
use ragmill::ingest;
use ragmill::migrate;
use ragmill::server;

/// Ragmill — a retrieval-augmented generation engine for document corpora
/// and grounded conversations.
#[derive(Parser)]
#[command(
    name = "ragmill",
    about = "Ragmill — corpus ingestion, cost estimation, and grounded conversations",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragmill.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// List corpora with their file and ingestion counts.
    Corpora,

    /// Scan a corpus path and record newly discovered files.
    Scan {
        /// Corpus id or name.
        corpus: String,
    },

    /// Project the embedding cost of un-ingested files. No provider calls.
    Estimate {
        /// Corpus id or name.
        corpus: String,

        /// Also price files that are already ingested.
        #[arg(long)]
        include_ingested: bool,
    },

    /// Ingest every un-ingested file: chunk, embed, and store vectors.
    Ingest {
        /// Corpus id or name.
        corpus: String,
    },

    /// Ask a question grounded in a corpus.
    Ask {
        /// Corpus id or name.
        corpus: String,

        /// The question.
        query: String,

        /// Maximum number of context chunks to retrieve.
        #[arg(long)]
        limit: Option<u64>,

        /// Continue an existing conversation instead of starting one.
        #[arg(long)]
        conversation: Option<String>,
    },

    /// Start the HTTP API server.
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
    let config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&config).await?;
            migrate::run(&pool).await?;
            pool.close().await;
            println!("database initialized at {}", config.db.path.display());
        }

        Commands::Corpora => {
            let pool = db::connect(&config).await?;
            let corpora = corpus::list_corpora(&pool).await?;

            if corpora.is_empty() {
                println!("No corpora.");
            } else {
                println!(
                    "{:<28} {:<24} {:>8} {:>10}  {}",
                    "NAME", "EMBEDDING MODEL", "FILES", "INGESTED", "ID"
                );
                for c in &corpora {
                    let files = corpus::list_files(&pool, &c.id).await?;
                    let ingested = files.iter().filter(|f| f.is_ingested).count();
                    println!(
                        "{:<28} {:<24} {:>8} {:>10}  {}",
                        c.name,
                        c.embedding_model,
                        files.len(),
                        ingested,
                        c.id
                    );
                }
            }
            pool.close().await;
        }

        Commands::Scan { corpus: corpus_ref } => {
            let pool = db::connect(&config).await?;
            let corpus = corpus::resolve_corpus(&pool, &corpus_ref).await?;
            let added = corpus::scan_corpus_files(&pool, &corpus.id).await?;

            println!("scan {}", corpus.name);
            println!("  new files: {}", added.len());
            for file in &added {
                println!("    {}", file.filename);
            }
            pool.close().await;
        }

        Commands::Estimate {
            corpus: corpus_ref,
            include_ingested,
        } => {
            let pool = db::connect(&config).await?;
            let corpus = corpus::resolve_corpus(&pool, &corpus_ref).await?;
            let summary =
                cost::estimate_corpus_cost(&pool, &corpus.id, include_ingested).await?;

            println!("cost estimate for {} ({})", summary.corpus_name, summary.model);
            println!("  {:<40} {:>10} {:>12}", "FILE", "TOKENS", "COST (USD)");
            for row in &summary.files {
                match &row.error {
                    Some(e) => println!("  {:<40} {:>10} {:>12}  [{}]", row.filename, "-", "-", e),
                    None => println!(
                        "  {:<40} {:>10} {:>12.6}",
                        row.filename, row.tokens, row.cost
                    ),
                }
            }
            println!(
                "  total: {} tokens, {:.6} USD across {} files ({} ingested, {} pending)",
                summary.total_tokens,
                summary.total_cost,
                summary.file_count,
                summary.ingested_count,
                summary.uningested_count
            );
            pool.close().await;
        }

        Commands::Ingest { corpus: corpus_ref } => {
            let pool = db::connect(&config).await?;
            let corpus = corpus::resolve_corpus(&pool, &corpus_ref).await?;
            let engine = Engine::new(&config, pool)?;
            let report = ingest::ingest_corpus(&engine, &corpus.id).await?;

            println!("ingest {}", corpus.name);
            if report.files.is_empty() {
                println!("  nothing to ingest");
            }
            for outcome in &report.files {
                match &outcome.error {
                    Some(e) => println!("  FAIL {} — {}", outcome.filename, e),
                    None => println!("  ok   {} ({} chunks)", outcome.filename, outcome.chunks),
                }
            }
            println!("  succeeded: {}, failed: {}", report.succeeded, report.failed);
        }

        Commands::Ask {
            corpus: corpus_ref,
            query,
            limit,
            conversation: conversation_id,
        } => {
            let pool = db::connect(&config).await?;
            let corpus = corpus::resolve_corpus(&pool, &corpus_ref).await?;
            let engine = Engine::new(&config, pool)?;

            let response = match conversation_id {
                Some(id) => {
                    conversation::continue_conversation(
                        &engine,
                        &id,
                        ContinueConversation { query, limit },
                    )
                    .await?
                }
                None => {
                    conversation::start_conversation(
                        &engine,
                        &corpus.id,
                        StartConversation {
                            query,
                            title: None,
                            limit,
                        },
                    )
                    .await?
                }
            };

            let part = response.parts.last().expect("turn appends a part");
            println!("{}", part.response);
            println!();
            println!(
                "  conversation: {} (part {})",
                response.id,
                part.part_index + 1
            );
            println!("  context chunks: {}", part.chunks_retrieved);
            for source in &part.sources {
                println!("  source: {}", source.filename);
            }
        }

        Commands::Serve => {
            let pool = db::connect(&config).await?;
            migrate::run(&pool).await?;
            let engine = Arc::new(Engine::new(&config, pool)?);
            server::run_server(&config, engine).await?;
        }
    }

    Ok(())
}
