//! Lorehunt Ingestion
//!
//! Runs one ingestion pass:
//! 1. Recreates the corpus collection
//! 2. Reads and decodes every document in the bucket
//! 3. Chunks, embeds and inserts the chunks
//! 4. Prints the run report as JSON
//!
//! Exits non-zero when the run aborts.

use clap::Parser;
use lorehunt_common::config::{AppConfig, ObservabilityConfig};
use lorehunt_common::embeddings::create_backend;
use lorehunt_common::metrics::{self, EMBEDDING_BUCKETS};
use lorehunt_common::storage::create_document_source;
use lorehunt_common::vector::MilvusIndex;
use lorehunt_common::{Embedder, VectorIndexManager, VERSION};
use lorehunt_ingestion::{IngestionError, IngestionPipeline};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, Instrument};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ingest", version, about = "Chunk, embed and index the document corpus")]
struct Cli {
    /// Configuration file, layered over the defaults
    #[arg(long, value_name = "PATH")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            init_tracing(&ObservabilityConfig::default());
            tracing::error!(error = %e, "Failed to load configuration");
            return Err(e.into());
        }
    };

    init_tracing(&config.observability);

    let span = config.observability.service_span();
    run(config).instrument(span).await
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    info!("Starting Lorehunt Ingestion v{}", VERSION);

    if config.observability.metrics_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .set_buckets(EMBEDDING_BUCKETS)?
            .with_http_listener(addr)
            .install()?;
        metrics::register_metrics();
        info!(%addr, "Prometheus exporter listening");
    }

    let source = create_document_source(&config.storage).await?;
    let embedder = Embedder::new(create_backend(&config.embedding)?);
    let index = VectorIndexManager::new(
        Arc::new(MilvusIndex::new(&config.vector_store)?),
        config.vector_store.insert_batch_size,
        config.retry_policy(),
    );

    let pipeline = IngestionPipeline::from_config(&config, source, embedder, index);

    match pipeline.run().await {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            let IngestionError::Aborted { stage, progress, .. } = &e;
            let body = serde_json::json!({
                "error": e.to_string(),
                "code": e.code(),
                "stage": stage,
                "progress": progress,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
            std::process::exit(1);
        }
    }
}

/// Logs go to stderr so stdout carries only the JSON report
fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
