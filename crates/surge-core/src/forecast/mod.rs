//! Forecasting engine
//!
//! Runs the two-stage gated model independently per slug: load persisted
//! history, train, forecast the horizon, upsert. There is no cross-slug
//! sharing, and a slug that fails lands in the report's skip list instead
//! of aborting the batch.

use chrono::{Duration, NaiveDate};
use tracing::{info, warn};

pub mod features;
pub mod linalg;
pub mod model;

pub use model::{dynamic_threshold, forecast, train, TrainedModel};

use crate::context::RunContext;
use crate::error::Result;
use crate::models::{ForecastReport, SlugSkip};
use crate::notify::{notify_best_effort, TrendsUpdated, UpdateKind};
use crate::series::DailySeries;

/// One scheduled forecasting run over every active slug for the geo.
pub async fn run_forecast(ctx: &RunContext, end_day: NaiveDate) -> Result<ForecastReport> {
    let geo = ctx.settings.ingest.geo.clone();
    let cfg = &ctx.settings.forecast;

    let slugs = ctx.db.load_active_slugs(&geo)?;
    if slugs.is_empty() {
        info!("no active slugs for geo={}, nothing to forecast", geo);
    }

    let mut report = ForecastReport {
        geo: geo.clone(),
        slugs_attempted: slugs.len(),
        slugs_trained: 0,
        rows_upserted: 0,
        skipped: Vec::new(),
        history_days: cfg.history_days,
        horizon_days: cfg.horizon_days,
    };
    let mut touched: Vec<String> = Vec::new();

    for slug in slugs {
        let sparse = match ctx.db.load_daily_series(&geo, &slug, end_day, cfg.history_days) {
            Ok(s) => s,
            Err(e) => {
                warn!("slug {} failed to load history: {}", slug, e);
                report.skipped.push(SlugSkip {
                    slug,
                    reason: e.to_string(),
                    rows: None,
                });
                continue;
            }
        };

        // Densify: the model wants one value per consecutive day.
        let series = DailySeries::from_sparse(&sparse);
        let rows = series.as_ref().map(|s| s.len()).unwrap_or(0);
        if rows < cfg.min_train_days {
            report.skipped.push(SlugSkip {
                slug,
                reason: "insufficient_history".to_string(),
                rows: Some(rows),
            });
            continue;
        }
        let series = series.expect("checked above");

        let result = (|| -> Result<usize> {
            let trained = model::train(&series, cfg)?;
            let preds = model::forecast(&trained, &series, cfg.horizon_days as usize, cfg);
            ctx.db.upsert_forecasts(
                &geo,
                &slug,
                series.last_day() + Duration::days(1),
                &preds,
            )
        })();

        match result {
            Ok(upserted) => {
                report.slugs_trained += 1;
                report.rows_upserted += upserted;
                if upserted > 0 {
                    touched.push(slug);
                }
            }
            Err(e) => {
                warn!("slug {} failed: {}", slug, e);
                report.skipped.push(SlugSkip {
                    slug,
                    reason: e.to_string(),
                    rows: None,
                });
            }
        }
    }

    if !touched.is_empty() {
        let event = TrendsUpdated::new(&geo, UpdateKind::Forecast, touched, cfg.horizon_days);
        notify_best_effort(ctx.notifier.as_ref(), &event).await;
    }

    info!(
        "forecast run done: geo={} trained={} upserts={} skipped={}",
        report.geo,
        report.slugs_trained,
        report.rows_upserted,
        report.skipped.len()
    );
    Ok(report)
}
