use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use course_index::{
    config::Config,
    embedding::{EmbeddingClient, build_embedding_client},
    ingest::{IngestStatistics, VectorStoreCreator, print_statistics},
    logging,
    processing::DocumentProcessor,
    retrieval::{LoadedIndex, VectorStoreLoader},
    store::{MetadataFilter, MetadataValue, open_store},
};

const YOUTUBE_LINKS_FILE: &str = "youtube_links.json";

#[derive(Parser)]
#[command(
    name = "course-index",
    about = "Build and query the course content index"
)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index every supported document under a content root.
    Ingest {
        #[arg(long)]
        content_root: PathBuf,
        #[arg(long)]
        persist_dir: PathBuf,
        #[arg(long)]
        collection: Option<String>,
        /// Delete the collection before ingesting.
        #[arg(long)]
        reset: bool,
    },
    /// Run a similarity query against a built index.
    Search {
        #[arg(long)]
        persist_dir: PathBuf,
        #[arg(long)]
        query: String,
        #[arg(short, default_value_t = 5)]
        k: usize,
        #[arg(long)]
        session: Option<u32>,
        /// Exact-match metadata constraint, repeatable.
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, MetadataValue)>,
        #[arg(long)]
        collection: Option<String>,
    },
    /// Summarize what a built index contains.
    Stats {
        #[arg(long)]
        persist_dir: PathBuf,
        #[arg(long)]
        collection: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    if let Err(err) = run(cli.command).await {
        tracing::error!(error = %format!("{err:#}"), "Command failed");
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(command: Command) -> Result<()> {
    let config = Config::load().context("configuration")?;
    match command {
        Command::Ingest {
            content_root,
            persist_dir,
            collection,
            reset,
        } => ingest(&config, &content_root, &persist_dir, collection, reset).await,
        Command::Search {
            persist_dir,
            query,
            k,
            session,
            filters,
            collection,
        } => {
            let index = open_index(&config, &persist_dir, collection).await?;
            let mut filter: MetadataFilter = filters.into_iter().collect();
            if let Some(session) = session {
                filter.insert("session_number".to_string(), session.into());
            }
            let results = index
                .search(&query, k, &filter)
                .await
                .context("search")?;
            if results.is_empty() {
                println!("No results.");
            }
            for (rank, result) in results.iter().enumerate() {
                let source = result
                    .metadata
                    .get("source_file")
                    .and_then(MetadataValue::as_str)
                    .unwrap_or("unknown");
                println!("#{} score={:.4} source={source}", rank + 1, result.score);
                println!("{}\n", result.content);
            }
            Ok(())
        }
        Command::Stats {
            persist_dir,
            collection,
        } => {
            let index = open_index(&config, &persist_dir, collection).await?;
            let statistics = index.statistics().await.context("statistics")?;
            let sessions: Vec<String> = statistics.sessions.iter().map(i64::to_string).collect();
            let categories: Vec<&str> = statistics.categories.iter().map(String::as_str).collect();
            let facilitators: Vec<&str> =
                statistics.facilitators.iter().map(String::as_str).collect();
            let manifest = index.manifest();
            println!("Index '{}'", index.collection());
            println!(
                "  Model:         {} ({} dimensions)",
                manifest.embedding_model.as_deref().unwrap_or("unrecorded"),
                manifest.dimension
            );
            if let Some(created_at) = &manifest.created_at {
                println!("  Created:       {created_at}");
            }
            println!("  Total vectors: {}", statistics.total_vectors);
            println!("  Sessions:      {}", sessions.join(", "));
            println!("  Categories:    {}", categories.join(", "));
            println!("  Facilitators:  {}", facilitators.join(", "));
            Ok(())
        }
    }
}

async fn ingest(
    config: &Config,
    content_root: &Path,
    persist_dir: &Path,
    collection: Option<String>,
    reset: bool,
) -> Result<()> {
    if !content_root.is_dir() {
        return Err(anyhow!(
            "content root {} does not exist",
            content_root.display()
        ));
    }
    let collection = collection.unwrap_or_else(|| config.collection_name.clone());
    let embedder = embedder(config)?;
    let store = open_store(config, persist_dir).context("opening index store")?;
    let processor = DocumentProcessor::new(config.chunking, config.table_chunking);
    let creator = VectorStoreCreator::new(
        processor,
        embedder,
        store,
        collection.clone(),
        config.batching,
    );

    if reset {
        creator.reset().await.context("reset")?;
    }
    let report = creator.run(content_root).await.context("ingestion")?;

    print_statistics(&report.statistics);
    println!(
        "Indexed {} chunks into '{collection}' in {} batches ({} retries)",
        report.index.records, report.index.batches, report.index.retries
    );
    write_youtube_links(persist_dir, &report.statistics)?;
    Ok(())
}

async fn open_index(
    config: &Config,
    persist_dir: &Path,
    collection: Option<String>,
) -> Result<LoadedIndex> {
    let collection = collection.unwrap_or_else(|| config.collection_name.clone());
    let store = open_store(config, persist_dir).context("opening index store")?;
    VectorStoreLoader::new(store, embedder(config)?, collection)
        .load()
        .await
        .context("loading index")
}

fn embedder(config: &Config) -> Result<Arc<dyn EmbeddingClient>> {
    let client = build_embedding_client(config).context("embedding client")?;
    Ok(Arc::from(client))
}

fn write_youtube_links(persist_dir: &Path, statistics: &IngestStatistics) -> Result<()> {
    fs::create_dir_all(persist_dir)
        .with_context(|| format!("creating {}", persist_dir.display()))?;
    let path = persist_dir.join(YOUTUBE_LINKS_FILE);
    let body = serde_json::to_string_pretty(&statistics.youtube_links)?;
    fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        files = statistics.youtube_links.len(),
        "Wrote YouTube links"
    );
    Ok(())
}

/// Parse `key=value`, reading integers, booleans, and `null` as typed values.
fn parse_filter(raw: &str) -> Result<(String, MetadataValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty filter key in '{raw}'"));
    }
    let value = value.trim();
    let value = if value == "null" {
        MetadataValue::Null
    } else if let Ok(flag) = value.parse::<bool>() {
        MetadataValue::Bool(flag)
    } else if let Ok(number) = value.parse::<i64>() {
        MetadataValue::Int(number)
    } else {
        MetadataValue::Str(value.to_string())
    };
    Ok((key.to_string(), value))
}
