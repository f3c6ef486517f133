// casewatch/src/commands/inspect.rs
//
// USE CASE: Show the most recent stored rows.

use std::path::PathBuf;

use anyhow::Context;
use casewatch_core::domain::record::{CaseRecord, QualityFlag};
use casewatch_core::infrastructure::adapters::DuckDbStore;
use casewatch_core::infrastructure::config::load_pipeline_config;
use casewatch_core::ports::CaseStore;
use comfy_table::Table;
use comfy_table::presets::UTF8_FULL;

pub async fn execute(project_dir: PathBuf, region: Option<String>, limit: usize) -> anyhow::Result<()> {
    let config = load_pipeline_config(&project_dir).with_context(|| {
        format!(
            "Failed to load pipeline configuration from {:?}",
            project_dir
        )
    })?;

    let db_path = &config.store.path;
    if db_path.as_os_str() != ":memory:" && !db_path.exists() {
        anyhow::bail!(
            "❌ Store not found at: {}\n👉 Have you run 'casewatch run'?",
            db_path.display()
        );
    }

    let store = DuckDbStore::open(db_path, &config.store.table)?;
    let total = store.count_rows().await?;
    let mut rows = store.load_records(region.as_deref()).await?;

    // Most recent first.
    rows.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.region_code.cmp(&b.region_code)));
    rows.truncate(limit);

    println!("\n🔍 Inspecting '{}' ({} rows stored)", store.table(), total);
    if rows.is_empty() {
        println!("   (no rows)");
        return Ok(());
    }

    println!("{}", render(&rows));
    Ok(())
}

fn render(rows: &[CaseRecord]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "region",
        "date",
        "confirmed",
        "deaths",
        "incidence/100k",
        "new cases",
        "avg 7d",
        "flags",
    ]);

    for r in rows {
        table.add_row(vec![
            r.region_code.clone(),
            r.date.to_string(),
            r.confirmed_cases.to_string(),
            r.deaths.to_string(),
            opt_f64(r.incidence_per_100k),
            r.new_cases.map(|v| v.to_string()).unwrap_or_default(),
            opt_f64(r.new_cases_avg_7d),
            QualityFlag::join(&r.quality_flags),
        ]);
    }
    table
}

fn opt_f64(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_default()
}
