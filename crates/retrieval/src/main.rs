//! Lorehunt
//!
//! Command line front end for the RAG session:
//!
//! ```text
//! lorehunt [--config <path>] search <query>
//! lorehunt [--config <path>] scenario <question>
//! lorehunt [--config <path>] check <text>
//! lorehunt [--config <path>] admit [--force] <title> <text>
//! ```
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use clap::{Parser, Subcommand};
use lorehunt_common::config::{AppConfig, ObservabilityConfig};
use lorehunt_common::metrics::{self, LATENCY_BUCKETS};
use lorehunt_common::VERSION;
use lorehunt_retrieval::RagSession;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use std::net::SocketAddr;
use tracing::{info, Instrument};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lorehunt", version, about = "Search the lore corpus and generate treasure-hunt scenarios")]
struct Cli {
    /// Configuration file, layered over the defaults
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Multi-query search with citations
    Search {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Generate a scenario grounded in retrieved passages
    Scenario {
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
    /// Compare a scenario against the stored ones
    Check {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Store a scenario unless it duplicates an existing one
    Admit {
        /// Store even when the scenario is too close to a stored one
        #[arg(long)]
        force: bool,
        title: String,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
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
    run(cli.command, config).instrument(span).await
}

async fn run(command: Command, config: AppConfig) -> anyhow::Result<()> {
    info!("Starting Lorehunt v{}", VERSION);

    if config.observability.metrics_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .set_buckets(LATENCY_BUCKETS)?
            .with_http_listener(addr)
            .install()?;
        metrics::register_metrics();
        info!(%addr, "Prometheus exporter listening");
    }

    let session = RagSession::from_config(&config).await?;

    let outcome = match &command {
        Command::Search { query } => print_json(&session.search(&query.join(" ")).await),
        Command::Scenario { question } => match session.generate_scenario(&question.join(" ")).await {
            Ok(scenario) => print_json(&scenario),
            Err(e) => Err(e.into()),
        },
        Command::Check { text } => match session.check(&text.join(" ")).await {
            Ok(verdict) => print_json(&verdict),
            Err(e) => Err(e.into()),
        },
        Command::Admit { title, text, force } => match session.admit(&text.join(" "), Some(title.as_str()), *force).await {
            Ok(admission) => print_json(&admission),
            Err(e) => Err(e.into()),
        },
    };

    session.shutdown();
    outcome
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Logs go to stderr so stdout carries only JSON
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
