use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use wlan_ingestion_service::{
    config::{AppConfig, DbCredentials},
    metrics_server, observability,
    pipeline::{Crawler, SeriesSource, UtilizationStore},
    sinks::{MemoryStore, PgUtilizationStore},
    sources::GraphiteSource,
    topology::Topology,
};

#[derive(Parser)]
#[command(name = "wlan-crawl")]
#[command(about = "Crawl access point utilization into the relational store", long_about = None)]
struct Cli {
    /// Run a single crawl even if `crawl.interval_secs` is configured
    #[arg(long)]
    once: bool,

    /// Aggregate into memory instead of the database
    #[arg(long)]
    dry_run: bool,

    /// Relative window start, e.g. `-60min` or `-2weeks`
    #[arg(long, allow_hyphen_values = true)]
    from: Option<String>,

    /// Relative window end
    #[arg(long, allow_hyphen_values = true)]
    until: Option<String>,

    /// Topology document to crawl
    #[arg(long, value_name = "FILE")]
    topology: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    observability::init_tracing();

    let cli = Cli::parse();

    let mut cfg = AppConfig::load()?;
    if let Some(from) = cli.from {
        cfg.graphite.from = from;
    }
    if cli.until.is_some() {
        cfg.graphite.until = cli.until;
    }
    if let Some(path) = cli.topology {
        cfg.crawl.topology_path = path;
    }
    cfg.validate()?;

    let topology = Topology::load(&cfg.crawl.topology_path)?;
    tracing::info!(
        libraries = topology.len(),
        path = %cfg.crawl.topology_path.display(),
        "topology loaded"
    );

    let interval = if cli.once {
        None
    } else {
        cfg.crawl.interval_secs.map(Duration::from_secs)
    };

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let source = GraphiteSource::new(&cfg.graphite)?;

    if cli.dry_run {
        let crawler = Crawler::new(source, MemoryStore::default(), &cfg.graphite);
        run(&crawler, &topology, interval).await;

        let state = crawler.store().snapshot().await;
        tracing::info!(
            libraries = state.libraries().len(),
            access_points = state.access_points().len(),
            samples = state.utilization_rows().len(),
            "dry run finished, nothing persisted"
        );
        return Ok(());
    }

    let creds = DbCredentials::from_env()?;
    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect_with(creds.connect_options())
        .await
        .with_context(|| format!("failed to connect to database {} on {}:{}", creds.name, creds.host, creds.port))?;

    if cfg.database.apply_schema {
        wlan_client::db::create_schema(&pool).await?;
    }

    let store = PgUtilizationStore::new(pool, cfg.crawl.batch_size);
    let crawler = Crawler::new(source, store, &cfg.graphite);
    run(&crawler, &topology, interval).await;
    Ok(())
}

/// Crawl once, or every `interval` until Ctrl-C.
async fn run<S, K>(crawler: &Crawler<S, K>, topology: &Topology, interval: Option<Duration>)
where
    S: SeriesSource,
    K: UtilizationStore,
{
    match interval {
        Some(interval) => {
            crawler.run_every(topology, interval, shutdown_signal()).await;
        }
        None => {
            crawler.run(topology).await;
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal, running until killed");
        std::future::pending::<()>().await;
    }
}
