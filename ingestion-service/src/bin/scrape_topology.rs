use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use wlan_ingestion_service::{
    observability,
    topology::apstat::{parse_districts, select_libraries},
};

/// Build the library topology document from the apstat status page.
#[derive(Parser)]
#[command(name = "scrape_topology")]
struct Cli {
    /// Saved HTML page or `http(s)://` URL of the status page
    #[arg(value_name = "FILE_OR_URL", default_value = "https://wlan.lrz.de/apstat")]
    source: String,

    /// Where to write the topology JSON
    #[arg(short, long, default_value = "bibs.json")]
    output: PathBuf,

    /// Keep every district instead of only libraries
    #[arg(long)]
    all_districts: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cli = Cli::parse();

    let html = if cli.source.starts_with("http://") || cli.source.starts_with("https://") {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?
            .get(&cli.source)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?
    } else {
        std::fs::read_to_string(&cli.source).with_context(|| format!("failed to read {}", cli.source))?
    };

    let districts = parse_districts(&html)?;
    let district_count = districts.len();
    let topology = if cli.all_districts {
        districts
    } else {
        select_libraries(&districts)
    };

    std::fs::write(&cli.output, topology.to_json()?)
        .with_context(|| format!("failed to write {}", cli.output.display()))?;

    tracing::info!(
        districts = district_count,
        libraries = topology.len(),
        output = %cli.output.display(),
        "topology written"
    );
    Ok(())
}
