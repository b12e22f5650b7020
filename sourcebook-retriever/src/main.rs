use clap::{Parser, Subcommand};
use sourcebook_embed::{CachedProvider, EmbedConfig, EmbeddingCache, FastEmbedProvider};
use sourcebook_retriever::config::RetrievalConfig;
use sourcebook_retriever::lifecycle::LifecycleManager;
use sourcebook_retriever::retriever::Retriever;
use sourcebook_retriever::store::{IndexStatus, IndexStore, StoreBackend, open_store};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// A CLI tool to ingest documents and search them with blended
/// semantic/lexical retrieval.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base directory containing the sourcebook.db database file
    #[arg(short, long, default_value = ".")]
    base_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest a document and print its file id
    Ingest {
        /// Path to the document to ingest
        file: PathBuf,
    },
    /// Search one or more ingested documents
    Search {
        /// The query text
        query: String,
        /// File ids to search (comma-separated)
        #[arg(long, value_delimiter = ',')]
        file_ids: Vec<String>,
        /// Maximum number of results
        #[arg(short, long, default_value_t = 5)]
        top_k: usize,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show the lifecycle state of one document's index
    Status {
        /// File id to inspect
        file_id: String,
    },
    /// Delete a document's index
    Delete {
        /// File id to delete
        file_id: String,
    },
    /// Show database statistics
    Stats,
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn embedding_provider() -> anyhow::Result<Arc<CachedProvider<FastEmbedProvider>>> {
    let embed_config = EmbedConfig::default();
    let cache = EmbeddingCache::new(embed_config.cache_capacity);
    let provider = FastEmbedProvider::create(embed_config).await?;
    Ok(Arc::new(CachedProvider::new(provider, cache)))
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = RetrievalConfig::default().with_backend(StoreBackend::Sqlite {
        path: args.base_dir.join("sourcebook.db"),
    });
    let store = open_store(&config.backend).await?;

    match args.command {
        Commands::Ingest { file } => {
            let text = tokio::fs::read_to_string(&file).await?;
            let provider = embedding_provider().await?;
            let lifecycle = LifecycleManager::new(provider, store, &config)?;
            let file_id = lifecycle.ingest_source(&text).await?;
            println!("{file_id}");
            Ok(())
        }
        Commands::Search {
            query,
            file_ids,
            top_k,
            format,
        } => {
            let provider = embedding_provider().await?;
            let retriever = Retriever::new(provider, store, config);
            let results = retriever.search_across(&query, &file_ids, top_k).await?;

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&results)?);
                }
                OutputFormat::Summary => {
                    println!("Found {} results:", results.len());
                    for result in results {
                        println!(
                            "  [{:.3}] source {} chunk {} (semantic {:.3})",
                            result.relevance_score,
                            result.file_id,
                            result.chunk_index,
                            result.semantic_score
                        );
                        println!("    {}", preview(&result.chunk_text, 120));
                    }
                }
            }
            Ok(())
        }
        Commands::Status { file_id } => {
            match store.status(&file_id).await? {
                IndexStatus::Missing => println!("{file_id}: missing"),
                IndexStatus::Pending => println!("{file_id}: pending"),
                IndexStatus::Ready {
                    chunk_count,
                    dimension,
                } => println!("{file_id}: ready ({chunk_count} chunks, dimension {dimension})"),
            }
            Ok(())
        }
        Commands::Delete { file_id } => {
            store.delete(&file_id).await?;
            println!("Deleted {file_id}");
            Ok(())
        }
        Commands::Stats => {
            let stats = store.stats().await?;
            println!("Sources: {}", stats.sources);
            println!("  Ready: {}", stats.ready_sources);
            println!("  Pending: {}", stats.pending_sources);
            println!("Chunks: {}", stats.chunks);
            Ok(())
        }
    }
}

/// First `max_chars` characters of a chunk, flattened to one line.
fn preview(text: &str, max_chars: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c == '\n' { ' ' } else { c })
        .take(max_chars)
        .collect();
    if text.chars().count() > max_chars {
        format!("{flat}...")
    } else {
        flat
    }
}
