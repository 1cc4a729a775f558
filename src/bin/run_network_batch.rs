// Network batch runner
//
// Usage: run_network_batch <records.csv> <output_dir> [config.json]
//
// Writes items/network_metrics/species_metrics/dissimilarity/completeness/log
// CSV tables plus report.json into <output_dir>.

use anyhow::{bail, Context};
use hummingbird_network_rust::{load_records, BatchOrchestrator, LogLevel, NetworkConfig};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    // Initialize tracing (structured logging)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hummingbird_network_rust=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        bail!("usage: {} <records.csv> <output_dir> [config.json]", args[0]);
    }
    let records_path = PathBuf::from(&args[1]);
    let output_dir = PathBuf::from(&args[2]);

    let config = match args.get(3) {
        Some(path) => NetworkConfig::load(&PathBuf::from(path))?,
        None => NetworkConfig::default(),
    };
    tracing::info!("Configuration:");
    tracing::info!("  records: {:?}", records_path);
    tracing::info!("  output: {:?}", output_dir);
    tracing::info!("  parallel: {}", config.parallel);

    let records = load_records(&records_path)?;

    let start = Instant::now();
    let report = BatchOrchestrator::new(config).run(&records);
    tracing::info!(
        items = report.items.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Batch finished"
    );

    report.write_csv(&output_dir)?;
    let json_path = output_dir.join("report.json");
    std::fs::write(&json_path, report.to_json()?)
        .with_context(|| format!("Failed to write {:?}", json_path))?;

    let errors = report.log.count(LogLevel::Error);
    if errors > 0 {
        tracing::warn!("{} metric errors recorded; see log.csv", errors);
    }
    tracing::info!("Tables written to {:?}", output_dir);
    Ok(())
}
