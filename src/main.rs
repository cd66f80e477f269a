use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use docrag_cli::{
    format_collections, format_folder_preview, format_folder_report, format_health,
    format_indexing_result, format_search_results, format_summary, print_json, run_shell,
    FolderPreview,
};
use docrag_core::{
    DocumentIndexer, EmbeddingProvider, RAGEngine, RAGQuery, RagConfig, StoreBackend, VectorStore,
};
use docrag_embed::{build_provider, EmbeddingConfig};
use docrag_store::{
    folder_info, summarize_documents, LocalDocumentIndexer, LocalRAGEngine, LocalVectorStore,
    QdrantVectorStore,
};

#[derive(Parser)]
#[command(name = "docrag")]
#[command(about = "Load documents into vector collections and search them", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory holding the local vector store
    #[arg(long, global = true)]
    persist_dir: Option<PathBuf>,

    /// Print machine-readable JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a single document into a collection
    Load {
        file: PathBuf,
        #[arg(short, long)]
        collection: String,
    },
    /// Load every matching document under a folder
    LoadDir {
        folder: PathBuf,
        #[arg(short, long)]
        collection: String,
        /// File extensions to include, e.g. pdf,txt
        #[arg(long, value_delimiter = ',')]
        ext: Vec<String>,
        /// List matching files and their sizes, then stop
        #[arg(long)]
        info_only: bool,
        /// Show what would be loaded without embedding anything
        #[arg(long, conflicts_with = "info_only")]
        dry_run: bool,
    },
    /// List loaded documents
    List {
        #[arg(short, long)]
        collection: Option<String>,
    },
    /// Delete every chunk loaded from a source
    Delete {
        source: String,
        #[arg(short, long)]
        collection: String,
    },
    /// Search a collection
    Search {
        query: String,
        #[arg(short, long)]
        collection: String,
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        #[arg(long)]
        threshold: Option<f32>,
        /// Print the prompt context built from the hits
        #[arg(long)]
        context: bool,
    },
    /// List collections
    Collections,
    /// Drop a collection and all its chunks
    Drop { collection: String },
    /// Check chunk counts and searchability
    Check {
        #[arg(short, long)]
        collection: Vec<String>,
    },
    /// Interactive search shell
    Shell {
        #[arg(short, long)]
        collection: String,
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        #[arg(long)]
        threshold: Option<f32>,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn open_store(config: &RagConfig) -> Result<Arc<dyn VectorStore>> {
    match &config.backend {
        StoreBackend::Local => {
            debug!(path = ?config.persist_dir, "Opening local vector store");
            let store = LocalVectorStore::open(&config.persist_dir)
                .await
                .with_context(|| format!("Failed to open {}", config.persist_dir.display()))?;
            Ok(Arc::new(store))
        }
        StoreBackend::Qdrant { url, api_key } => {
            let mut store = QdrantVectorStore::new(url.clone(), api_key.clone())?;
            store.connect().await?;
            Ok(Arc::new(store))
        }
    }
}

/// Embed a short text so a bad key or endpoint fails before a long upload starts
async fn check_embeddings(embedder: &dyn EmbeddingProvider) -> Result<()> {
    embedder
        .embed_query("test")
        .await
        .with_context(|| format!("Embedding service check failed for {}", embedder.model_id()))?;
    info!(model = embedder.model_id(), "Embedding service is reachable");
    Ok(())
}

async fn open_embedder() -> Result<Arc<dyn EmbeddingProvider>> {
    let config = EmbeddingConfig::from_env()?;
    debug!(provider = %config.provider, model = %config.model, "Using embedding provider");
    let mut provider = build_provider(&config)?;
    provider
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {} embeddings", config.provider))?;
    Ok(Arc::from(provider))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = RagConfig::from_env()?;
    if let Some(dir) = cli.persist_dir {
        config.persist_dir = dir;
    }
    config.validate()?;

    let store = open_store(&config).await?;

    match cli.command {
        Commands::Load { file, collection } => {
            let indexer = LocalDocumentIndexer::new(
                store,
                open_embedder().await?,
                config.indexing_config(),
            )?;
            let result = indexer.index_from_file(&collection, &file).await?;
            if cli.json {
                print_json(&result)?;
            } else {
                print!("{}", format_indexing_result(&file.to_string_lossy(), &result));
            }
            if !result.is_success() {
                bail!("{} chunks could not be indexed", result.chunks_failed);
            }
        }
        Commands::LoadDir {
            folder,
            collection,
            ext,
            info_only,
            dry_run,
        } => {
            let extensions = if ext.is_empty() {
                config.extensions.clone()
            } else {
                ext
            };

            let preview = match (info_only, dry_run) {
                (true, _) => Some(FolderPreview::InfoOnly),
                (_, true) => Some(FolderPreview::DryRun),
                _ => None,
            };
            if let Some(preview) = preview {
                let info = folder_info(&folder, &extensions)?;
                if cli.json {
                    print_json(&json!({
                        "collection": collection,
                        "dry_run": preview == FolderPreview::DryRun,
                        "folder": info,
                    }))?;
                } else {
                    print!("{}", format_folder_preview(&info, &collection, preview));
                }
                return Ok(());
            }

            let embedder = open_embedder().await?;
            check_embeddings(embedder.as_ref()).await?;
            let indexer = LocalDocumentIndexer::new(store, embedder, config.indexing_config())?;
            let report = indexer.index_folder(&collection, &folder, &extensions).await?;
            if cli.json {
                print_json(&report)?;
            } else {
                print!("{}", format_folder_report(&report));
            }
        }
        Commands::List { collection } => {
            let summary = summarize_documents(store.as_ref(), collection.as_deref()).await?;
            if cli.json {
                print_json(&summary)?;
            } else {
                print!("{}", format_summary(&summary));
            }
        }
        Commands::Delete { source, collection } => {
            let deleted = store.delete_where(&collection, "source", &source).await?;
            if cli.json {
                print_json(&json!({
                    "collection": collection,
                    "source": source,
                    "deleted": deleted,
                }))?;
            } else if deleted == 0 {
                println!("{} No chunks found for {}", "⚠️".yellow(), source.bold());
            } else {
                println!(
                    "{} Deleted {} chunks of {} from {}",
                    "🗑️".green(),
                    deleted,
                    source.bold(),
                    collection.bold()
                );
            }
        }
        Commands::Search {
            query,
            collection,
            top_k,
            threshold,
            context,
        } => {
            let mut engine = LocalRAGEngine::new(store, open_embedder().await?);
            engine.initialize().await?;

            let rag_query = RAGQuery {
                top_k: top_k.unwrap_or(config.top_k),
                score_threshold: threshold.or(config.score_threshold),
                ..RAGQuery::new(collection, query.as_str())
            };
            let result = engine.retrieve(&rag_query).await?;

            if cli.json {
                print_json(&result)?;
            } else {
                print!("{}", format_search_results(&query, &result.documents));
                if context && !result.context.is_empty() {
                    println!("{}", "Context:".bold());
                    println!("{}", result.context);
                }
            }
        }
        Commands::Collections => {
            let collections = store.list_collections().await?;
            if cli.json {
                print_json(&collections)?;
            } else {
                print!("{}", format_collections(&collections));
            }
        }
        Commands::Drop { collection } => {
            let dropped = store.delete_collection(&collection).await?;
            if cli.json {
                print_json(&json!({ "collection": collection, "dropped": dropped }))?;
            } else if dropped {
                println!("{} Dropped {}", "🗑️".green(), collection.bold());
            } else {
                println!("{} No collection named {}", "⚠️".yellow(), collection.bold());
            }
        }
        Commands::Check { collection } => {
            let collections = if collection.is_empty() {
                store
                    .list_collections()
                    .await?
                    .into_iter()
                    .map(|c| c.name)
                    .collect()
            } else {
                collection
            };

            let mut engine = LocalRAGEngine::new(store, open_embedder().await?);
            engine.initialize().await?;
            let report = engine.health(&collections).await?;

            if cli.json {
                print_json(&report)?;
            } else if report.is_empty() {
                println!("{} No collections to check", "📭".yellow());
            } else {
                print!("{}", format_health(&report));
            }
            if report.iter().any(|h| !h.searchable) {
                bail!("Some collections are not searchable");
            }
        }
        Commands::Shell {
            collection,
            top_k,
            threshold,
        } => {
            let mut engine = LocalRAGEngine::new(store, open_embedder().await?);
            engine.initialize().await?;
            run_shell(
                &engine,
                &collection,
                top_k.unwrap_or(config.top_k),
                threshold.or(config.score_threshold),
            )
            .await?;
        }
    }

    Ok(())
}
