// casewatch/src/commands/run.rs
//
// USE CASE: Run the ingestion pipeline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use casewatch_core::application::{RunReport, Sink, SinkOutcome, SourceFetcher, run_pipeline};
use casewatch_core::infrastructure::adapters::DuckDbStore;
use casewatch_core::infrastructure::config::load_pipeline_config;

pub async fn execute(project_dir: PathBuf) -> anyhow::Result<()> {
    let start = std::time::Instant::now();

    // A. Load the Config (Infra)
    println!("⚙️  Loading configuration...");
    let config = load_pipeline_config(&project_dir).with_context(|| {
        format!(
            "Failed to load pipeline configuration from {:?}",
            project_dir
        )
    })?;
    println!("   Dataset: {}", config.name);

    // B. Adapters
    let fetcher = SourceFetcher::from_config(&config.sources, &project_dir)
        .context("Failed to build source adapters")?;
    let store = DuckDbStore::open(&config.store.path, &config.store.table).with_context(|| {
        format!("Failed to initialize DuckDB at {:?}", config.store.path)
    })?;
    println!("   Store: DuckDB 🦆 ({})", config.store.path.display());

    let sink = Sink::new(
        &config.output,
        &config.name,
        Arc::new(store),
        Duration::from_secs(config.store.timeout_secs),
    );

    // C. Run the Pipeline (Application Layer)
    match run_pipeline(&config, &fetcher, &sink).await {
        Ok(report) => {
            print_summary(&report);
            if report.success {
                println!("\n✨ SUCCESS! Pipeline finished in {:.2?}", start.elapsed());
            } else {
                eprintln!("\n❌ FAILURE. At least one sink is stale, see above.");
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("\n💥 CRITICAL PIPELINE ERROR: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn print_summary(report: &RunReport) {
    match &report.primary_failure {
        None => println!("📥 Source: {}", report.source_tier),
        Some(failure) => {
            println!("📥 Source: {}", report.source_tier);
            println!("   ⚠️  Primary failed: {}", failure);
        }
    }

    let n = &report.normalization;
    println!(
        "🧮 Normalized: {} rows read, {} out of scope, {} rejected, {} duplicates dropped",
        n.rows_read,
        n.out_of_scope,
        n.rejected_count(),
        n.duplicates_dropped
    );

    let v = &report.validation;
    println!(
        "🩺 Validated: {} regions, {} dates filled, {} values corrected",
        v.regions_validated, v.filled_dates, v.corrected_values
    );
    for failed in &v.failed_regions {
        println!("   ⚠️  Region {} excluded: {}", failed.region_code, failed.reason);
    }

    match &report.persist.snapshot {
        SinkOutcome::Written(w) => println!("📄 Snapshot: {} rows -> {}", w.rows, w.path.display()),
        SinkOutcome::Failed { reason } => println!("📄 Snapshot: ❌ {}", reason),
    }
    match &report.persist.store {
        SinkOutcome::Written(c) => {
            println!("🦆 Store: {} inserted, {} updated", c.inserted, c.updated)
        }
        SinkOutcome::Failed { reason } => println!("🦆 Store: ❌ {}", reason),
    }

    match report.latest_date {
        Some(date) => println!("📅 Latest date: {}", date),
        None => println!("📅 Latest date: none (empty source)"),
    }
}
