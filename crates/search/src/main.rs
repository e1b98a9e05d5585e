//! ShopSage search CLI
//!
//! Usage:
//!   search "<query>" [top_k] [--no-rerank]
//!   search evaluate <queries.json> [--no-rerank]
//!   search health
//!
//! Results and reports are printed to stdout as JSON; logs go to stderr.

use anyhow::{bail, Context};
use metrics_exporter_prometheus::PrometheusBuilder;
use shopsage_common::{config::AppConfig, metrics, VERSION};
use shopsage_search::evaluation::{self, LabeledQuery};
use shopsage_search::pipeline::{Collaborators, SearchPipeline};
use std::net::SocketAddr;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_TOP_K: usize = 3;

enum Command {
    Query { text: String, top_k: usize },
    Evaluate { path: String },
    Health,
}

struct Args {
    command: Command,
    use_reranker: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();

    let use_reranker = !args.iter().any(|a| a == "--no-rerank");
    args.retain(|a| a != "--no-rerank");

    let command = match args.first().map(String::as_str) {
        None => bail!("usage: search \"<query>\" [top_k] [--no-rerank] | search evaluate <queries.json> | search health"),
        Some("evaluate") => Command::Evaluate {
            path: args.get(1).context("evaluate needs a queries file")?.clone(),
        },
        Some("health") => Command::Health,
        Some(text) => Command::Query {
            text: text.to_string(),
            top_k: match args.get(1) {
                Some(k) => k.parse().with_context(|| format!("invalid top_k '{}'", k))?,
                None => DEFAULT_TOP_K,
            },
        },
    };

    Ok(Args {
        command,
        use_reranker,
    })
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn init_metrics(config: &AppConfig) -> anyhow::Result<()> {
    let port = config.observability.metrics_port;
    if port == 0 {
        return Ok(());
    }

    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets(metrics::LATENCY_BUCKETS)
        .context("Invalid latency buckets")?
        .install()
        .context("Failed to install Prometheus exporter")?;
    metrics::register_metrics();

    info!(port = port, "Prometheus exporter listening");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = parse_args()?;

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    init_tracing(&config);
    info!(service = %config.observability.service_name, "Starting ShopSage search v{}", VERSION);
    init_metrics(&config)?;

    let collaborators = Collaborators::from_config(&config).map_err(|e| {
        error!(error = %e, "Failed to initialize search engine");
        e
    })?;
    let pipeline = SearchPipeline::new(collaborators, config.engine.clone(), config.rerank.clone());

    match args.command {
        Command::Query { text, top_k } => {
            let response = match pipeline.search(&text, top_k, args.use_reranker).await {
                Ok(response) => response,
                Err(e) if e.is_degradable() => {
                    warn!(error = %e, "Reranker unavailable, serving fused results");
                    pipeline.search(&text, top_k, false).await?
                }
                Err(e) => return Err(e.into()),
            };
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Evaluate { path } => {
            let queries = LabeledQuery::load_all(&path)?;
            info!(queries = queries.len(), path = %path, "Evaluating labelled queries");

            let report = evaluation::evaluate(&pipeline, &queries, args.use_reranker).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Health => {
            let report = pipeline.health().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    let stats = pipeline.cache_stats().await;
    info!(stats = ?stats, "Search complete");
    Ok(())
}
