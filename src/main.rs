use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use log::info;
use std::io;
use std::path::{Path, PathBuf};

use pdf_rag::chunking::{ChunkingConfig, TextSplitter};
use pdf_rag::config::Config;
use pdf_rag::database::{collection_name_for, QdrantStore, VectorStore};
use pdf_rag::document::{load_documents, Document};
use pdf_rag::gemini::GeminiClient;
use pdf_rag::rag::RagEngine;

type Engine = RagEngine<GeminiClient, QdrantStore, GeminiClient>;

/// A RAG (Retrieval-Augmented Generation) pipeline using Gemini and Qdrant
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load and chunk a document without calling any service
    Split {
        /// Path to the document (text or PDF)
        path: PathBuf,
        #[command(flatten)]
        chunking: ChunkingArgs,
        /// Print every chunk instead of only the summary
        #[arg(long)]
        show: bool,
    },
    /// Load, chunk, embed and store documents
    Ingest {
        /// Files or directories to index
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[command(flatten)]
        collection: CollectionArgs,
        #[command(flatten)]
        chunking: ChunkingArgs,
        /// Drop the collection before indexing
        #[arg(long)]
        recreate: bool,
    },
    /// Answer one question from an indexed collection
    Query {
        question: String,
        #[command(flatten)]
        collection: CollectionArgs,
        #[command(flatten)]
        retrieval: RetrievalArgs,
    },
    /// Answer questions interactively
    Chat {
        #[command(flatten)]
        collection: CollectionArgs,
        #[command(flatten)]
        retrieval: RetrievalArgs,
    },
    /// Index a single document if needed, then answer questions about it
    Run {
        /// Path to the document to process (supports text and PDF)
        path: PathBuf,
        #[command(flatten)]
        chunking: ChunkingArgs,
        #[command(flatten)]
        retrieval: RetrievalArgs,
    },
    /// Delete a collection
    Delete {
        #[command(flatten)]
        collection: CollectionArgs,
    },
}

#[derive(Args, Debug)]
struct CollectionArgs {
    /// Qdrant collection name (defaults to RAG_COLLECTION)
    #[arg(long, short)]
    collection: Option<String>,
}

#[derive(Args, Debug)]
struct ChunkingArgs {
    /// Maximum chunk length in characters
    #[arg(long)]
    chunk_size: Option<usize>,
    /// Characters shared between consecutive chunks
    #[arg(long)]
    chunk_overlap: Option<usize>,
}

#[derive(Args, Debug)]
struct RetrievalArgs {
    /// Number of chunks to retrieve per question
    #[arg(long, short = 'k')]
    top_k: Option<u64>,
}

impl CollectionArgs {
    fn resolve(&self, config: &Config) -> String {
        self.collection
            .clone()
            .unwrap_or_else(|| config.collection.clone())
    }
}

impl ChunkingArgs {
    fn resolve(&self, config: &Config) -> Result<ChunkingConfig> {
        ChunkingConfig::new(
            self.chunk_size.unwrap_or(config.chunking.chunk_size),
            self.chunk_overlap.unwrap_or(config.chunking.chunk_overlap),
        )
    }
}

impl RetrievalArgs {
    fn resolve(&self, config: &Config) -> Result<u64> {
        match self.top_k {
            Some(0) => Err(anyhow::anyhow!("--top-k must be greater than zero")),
            Some(top_k) => Ok(top_k),
            None => Ok(config.top_k),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Invalid configuration")?;

    run(cli.command, config).await
}

async fn run(command: Command, config: Config) -> Result<()> {
    match command {
        Command::Split {
            path,
            chunking,
            show,
        } => {
            let splitter = TextSplitter::new(chunking.resolve(&config)?);
            let document = Document::from_file(&path).context("Failed to process document")?;
            print_chunks(&splitter, &document, show);
        }

        Command::Ingest {
            paths,
            collection,
            chunking,
            recreate,
        } => {
            let collection = collection.resolve(&config);
            let engine = build_engine(&config, chunking.resolve(&config)?)?;
            let documents = load_documents(&paths)?;
            let report = engine.ingest(&collection, &documents, recreate).await?;

            println!(
                "Indexed {} chunks from {} document(s) into {} ({} skipped)",
                report.chunks, report.documents, report.collection, report.skipped_documents
            );
        }

        Command::Query {
            question,
            collection,
            retrieval,
        } => {
            let collection = collection.resolve(&config);
            let engine = build_engine(&config, config.chunking.clone())?;
            ensure_collection(&engine, &collection).await?;

            let answer = engine
                .answer(&collection, &question, retrieval.resolve(&config)?)
                .await?;
            println!("{}", answer);
        }

        Command::Chat {
            collection,
            retrieval,
        } => {
            let collection = collection.resolve(&config);
            let top_k = retrieval.resolve(&config)?;
            let engine = build_engine(&config, config.chunking.clone())?;
            ensure_collection(&engine, &collection).await?;

            chat(&engine, &collection, top_k).await?;
        }

        Command::Run {
            path,
            chunking,
            retrieval,
        } => {
            let top_k = retrieval.resolve(&config)?;
            let engine = build_engine(&config, chunking.resolve(&config)?)?;

            let document = Document::from_file(&path).context("Failed to process document")?;
            let collection = collection_name_for(&document.document_id);
            info!("Document type: {}", document.mime_type);

            // Only process file if collection doesn't exist
            engine
                .index_if_missing(&collection, &document)
                .await
                .context("Failed to process file")?;

            chat(&engine, &collection, top_k).await?;
        }

        Command::Delete { collection } => {
            let collection = collection.resolve(&config);
            let store = QdrantStore::new(config.qdrant.clone())?;
            if store.collection_exists(&collection).await? {
                store.delete_collection(&collection).await?;
                println!("Deleted collection {}", collection);
            } else {
                println!("Collection {} does not exist", collection);
            }
        }
    }

    Ok(())
}

fn build_engine(config: &Config, chunking: ChunkingConfig) -> Result<Engine> {
    let store =
        QdrantStore::new(config.qdrant.clone()).context("Failed to initialize Qdrant client")?;
    let gemini = GeminiClient::new(config.gemini.clone())?;

    Ok(RagEngine::new(gemini.clone(), store, gemini, chunking))
}

async fn ensure_collection(engine: &Engine, collection: &str) -> Result<()> {
    if !engine.collection_exists(collection).await? {
        anyhow::bail!(
            "Collection {} does not exist; run `ingest` first",
            collection
        );
    }
    Ok(())
}

async fn chat(engine: &Engine, collection: &str, top_k: u64) -> Result<()> {
    let stdin = io::stdin();
    engine
        .run_query_loop(collection, top_k, stdin.lock(), io::stdout())
        .await
        .context("Error in query loop")
}

fn print_chunks(splitter: &TextSplitter, document: &Document, show: bool) {
    let chunks = splitter.split_document(document);
    let tokens: usize = chunks.iter().map(|c| c.token_count).sum();
    let source = document
        .source
        .as_deref()
        .map(Path::display)
        .map(|p| p.to_string())
        .unwrap_or_else(|| document.document_id.clone());

    println!(
        "{}: {} characters, {} chunks (size {}, overlap {}), ~{} tokens",
        source,
        document.content.chars().count(),
        chunks.len(),
        splitter.config().chunk_size,
        splitter.config().chunk_overlap,
        tokens
    );

    if show {
        for chunk in &chunks {
            println!(
                "\n--- chunk {} @ byte {} (~{} tokens)\n{}",
                chunk.chunk_index, chunk.start_position, chunk.token_count, chunk.text
            );
        }
    }
}
