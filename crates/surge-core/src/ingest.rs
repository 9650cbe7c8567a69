//! Ingestion run
//!
//! One scheduled pass: load the active keyword groups, plan the minimal
//! fetch horizon from what is already persisted, stitch the provider
//! windows into continuous per-term series, roll synonyms up into groups,
//! keep only genuinely new days, upsert, and announce the touched slugs.

use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::aggregate::aggregate_groups;
use crate::context::RunContext;
use crate::error::Result;
use crate::models::IngestReport;
use crate::notify::{notify_best_effort, TrendsUpdated, UpdateKind};
use crate::planner::{filter_new_rows, plan_fetch};
use crate::stitch::stitch_daily;

/// One scheduled ingestion run ending at `end_day` (normally today).
pub async fn run_ingest(ctx: &RunContext, end_day: NaiveDate) -> Result<IngestReport> {
    let geo = ctx.settings.ingest.geo.clone();
    let category = ctx.settings.ingest.category;

    // 1) Active groups from the registry; nothing active is a clean no-op.
    let groups = ctx.db.load_active_groups(&geo, category)?;
    if groups.is_empty() {
        info!("no active keywords for geo={} category={}", geo, category);
        return Ok(IngestReport::noop(&geo, "no_active_keywords"));
    }

    // 2) Flatten distinct terms, anchor-first order preserved.
    let mut seen = HashSet::new();
    let mut terms: Vec<String> = Vec::new();
    for group in &groups {
        for term in &group.terms {
            if seen.insert(term.to_lowercase()) {
                terms.push(term.clone());
            }
        }
    }

    // 3) Incremental plan from each slug's last persisted day.
    let slugs: Vec<String> = groups.iter().map(|g| g.slug.clone()).collect();
    let last_days = ctx.db.last_days(&geo, &slugs)?;
    let plan = plan_fetch(
        end_day,
        ctx.settings.ingest.days_back,
        ctx.settings.ingest.overlap_days,
        &slugs,
        &last_days,
    );
    info!(
        "ingest plan: {} terms, {} days back, mode={}",
        terms.len(),
        plan.effective_days_back,
        plan.mode()
    );

    // 4) Fetch and stitch.
    let outcome = stitch_daily(
        ctx.source()?,
        &ctx.settings,
        &terms,
        end_day,
        plan.effective_days_back,
        ctx.deadline,
    )
    .await;

    let mut report = IngestReport {
        geo: geo.clone(),
        rows_upserted: 0,
        touched_slugs: Vec::new(),
        existed_slugs: plan.existed_slugs.clone(),
        new_slugs: plan.new_slugs.clone(),
        start: None,
        end: None,
        mode: plan.mode().to_string(),
        effective_days_back: plan.effective_days_back,
        windows_skipped: outcome.skipped.clone(),
        note: None,
    };

    if outcome.is_empty() {
        warn!("stitching produced no data for geo={}", geo);
        report.note = Some("no_data".to_string());
        return Ok(report);
    }

    // 5) Synonyms -> group series, then drop days already persisted.
    let aggregated = aggregate_groups(&outcome.terms, &groups);
    let to_write = filter_new_rows(aggregated, &last_days);

    if to_write.is_empty() {
        info!("no new rows for geo={}", geo);
        report.note = Some("no_new_rows".to_string());
        return Ok(report);
    }

    report.start = to_write
        .values()
        .filter_map(|s| s.keys().next().copied())
        .min();
    report.end = to_write
        .values()
        .filter_map(|s| s.keys().next_back().copied())
        .max();

    // 6) Idempotent upsert by natural key.
    report.rows_upserted = ctx.db.upsert_interest_rows(&geo, &to_write, end_day)?;
    report.touched_slugs = to_write.keys().cloned().collect();

    // 7) Best-effort broadcast, only when something was written.
    if report.rows_upserted > 0 {
        let event = TrendsUpdated::new(
            &geo,
            UpdateKind::Interest,
            report.touched_slugs.clone(),
            plan.effective_days_back,
        );
        notify_best_effort(ctx.notifier.as_ref(), &event).await;
    }

    info!(
        "ingest done: geo={} rows={} slugs={} windows_skipped={}",
        report.geo,
        report.rows_upserted,
        report.touched_slugs.len(),
        report.windows_skipped.len()
    );
    Ok(report)
}
