//! Forecasting command

use std::path::Path;

use anyhow::Result;
use surge_core::{run_forecast, RunContext};

use super::{open_db, parse_end_day, settings_from_env};

pub async fn cmd_forecast(
    db_path: &Path,
    geo: Option<&str>,
    horizon: Option<i64>,
    end: Option<&str>,
) -> Result<()> {
    let db = open_db(db_path)?;

    let mut settings = settings_from_env();
    if let Some(geo) = geo {
        settings.ingest.geo = geo.to_string();
    }
    if let Some(horizon) = horizon {
        settings.forecast.horizon_days = horizon.max(1);
    }
    let end_day = parse_end_day(end)?;

    println!(
        "🔮 Forecasting {} days ahead for geo={}...",
        settings.forecast.horizon_days, settings.ingest.geo
    );

    let ctx = RunContext::for_forecast(db, settings)?;
    let report = run_forecast(&ctx, end_day).await?;

    println!();
    println!("📊 Forecast Report");
    println!("   ─────────────────────────────");
    println!("   Slugs attempted: {}", report.slugs_attempted);
    println!("   Slugs trained: {}", report.slugs_trained);
    println!("   Rows upserted: {}", report.rows_upserted);
    if !report.skipped.is_empty() {
        println!("   ⚠️  Skipped slugs:");
        for skip in &report.skipped {
            match skip.rows {
                Some(rows) => println!("      {} - {} ({} rows)", skip.slug, skip.reason, rows),
                None => println!("      {} - {}", skip.slug, skip.reason),
            }
        }
    }
    println!();
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
