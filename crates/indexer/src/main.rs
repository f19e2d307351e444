//! SchemeBot Indexer
//!
//! Builds the scheme vector index ahead of serving:
//! 1. Runs database migrations
//! 2. Loads and flattens the scheme JSON file
//! 3. Embeds the documents in batches
//! 4. Writes them to the `schemes` table

use anyhow::Context;
use clap::Parser;
use schemebot_common::{
    config::AppConfig,
    db::{DbPool, Repository},
    embeddings::create_embedder,
    logging,
    schemes::SchemeIndexer,
    VERSION,
};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "indexer", version, about = "Index the government scheme corpus")]
struct Args {
    /// Rebuild the index even if it already has documents
    #[arg(long)]
    force: bool,

    /// Scheme JSON file, overrides `indexer.schemes_path`
    #[arg(long, env = "SCHEMES_JSON_PATH")]
    schemes: Option<String>,

    /// Configuration file instead of the layered `config/` lookup
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::load(),
    }
    .context("Failed to load configuration")?;

    if let Some(path) = args.schemes {
        config.indexer.schemes_path = path;
    }

    logging::init_tracing(&config.observability);

    info!("Starting SchemeBot Indexer v{}", VERSION);

    // Indexing needs the schema regardless of the gateway setting
    config.database.run_migrations = true;
    let db = DbPool::new(&config.database)
        .await
        .context("Failed to connect to database")?;

    let embedder = create_embedder(&config.embedding).context("Failed to create embedder")?;
    info!(
        model = embedder.model_name(),
        dimension = embedder.dimension(),
        "Embedder ready"
    );

    let store = Arc::new(Repository::new(db));
    let indexer = SchemeIndexer::new(store, embedder, config.indexer.clone());
    let report = indexer
        .ensure_indexed(args.force)
        .await
        .context("Indexing failed")?;

    info!(?report, "Indexer finished");
    Ok(())
}
