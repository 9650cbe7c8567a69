//! Ingestion command

use std::path::Path;

use anyhow::{Context, Result};
use surge_core::{run_ingest, RunContext};

use super::{open_db, parse_end_day, settings_from_env};

pub async fn cmd_ingest(
    db_path: &Path,
    geo: Option<&str>,
    category: Option<u32>,
    days_back: Option<i64>,
    end: Option<&str>,
) -> Result<()> {
    let db = open_db(db_path)?;

    let mut settings = settings_from_env();
    if let Some(geo) = geo {
        settings.ingest.geo = geo.to_string();
    }
    if let Some(category) = category {
        settings.ingest.category = category;
    }
    if let Some(days_back) = days_back {
        settings.ingest.days_back = days_back.max(1);
    }
    let end_day = parse_end_day(end)?;

    println!(
        "🌐 Ingesting daily interest for geo={} category={} through {}...",
        settings.ingest.geo, settings.ingest.category, end_day
    );

    // Missing endpoint/credentials abort here, before any work.
    let ctx = RunContext::for_ingest(db, settings)
        .await
        .context("Failed to set up the ingestion run")?;

    let report = run_ingest(&ctx, end_day).await?;

    println!();
    println!("📊 Ingestion Report");
    println!("   ─────────────────────────────");
    println!("   Rows upserted: {}", report.rows_upserted);
    println!("   Mode: {}", report.mode);
    println!("   Fetch horizon: {} days", report.effective_days_back);
    if !report.touched_slugs.is_empty() {
        println!("   Touched slugs: {}", report.touched_slugs.join(", "));
    }
    if !report.windows_skipped.is_empty() {
        println!("   ⚠️  Skipped windows: {}", report.windows_skipped.len());
    }
    if let Some(note) = &report.note {
        println!("   Note: {}", note);
    }
    println!();
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
