//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` / `settings_from_env` / `parse_end_day` - shared helpers
//! - `cmd_init` - Initialize the database
//! - `cmd_status` - Per-slug ingestion/forecast bookkeeping

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use surge_core::{Database, Settings};

/// Open (and migrate) the database at the given path.
pub fn open_db(db_path: &Path) -> Result<Database> {
    let path_str = db_path.to_str().context("Database path is not valid UTF-8")?;
    Database::new(path_str).context("Failed to open database")
}

/// Settings from SURGE_* environment variables.
pub fn settings_from_env() -> Settings {
    Settings::from_env()
}

/// Parse an optional --end flag; defaults to today (UTC).
pub fn parse_end_day(end: Option<&str>) -> Result<NaiveDate> {
    match end {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .context("Invalid --end date format (use YYYY-MM-DD)"),
        None => Ok(Utc::now().date_naive()),
    }
}

pub fn cmd_init(db_path: &Path) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let _db = open_db(db_path)?;

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Seed keywords: surge keywords add \"sunscreen\" --group \"Sun Care\" --anchor");
    println!("  2. Set SURGE_SOURCE_URL and run: surge ingest");
    println!("  3. Once history accumulates: surge forecast");

    Ok(())
}

pub fn cmd_status(db_path: &Path, geo: Option<&str>) -> Result<()> {
    let db = open_db(db_path)?;
    let settings = settings_from_env();
    let geo = geo.unwrap_or(&settings.ingest.geo);

    let keywords = db.list_keywords(Some(geo))?;
    let active = keywords.iter().filter(|k| k.is_active).count();
    println!("📋 Registry ({}): {} keywords, {} active", geo, keywords.len(), active);

    let statuses = db.slug_status(geo)?;
    if statuses.is_empty() {
        println!("   No ingested data yet. Run 'surge ingest' first.");
        return Ok(());
    }

    println!();
    println!("📊 Slugs");
    println!("   ─────────────────────────────");
    for status in statuses {
        println!(
            "   {} - {} rows, data through {}, forecast through {}",
            status.slug,
            status.interest_rows,
            status
                .last_interest_day
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string()),
            status
                .last_forecast_day
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
    }

    Ok(())
}
