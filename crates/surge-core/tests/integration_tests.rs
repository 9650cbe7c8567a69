//! Integration tests for surge-core
//!
//! These exercise the full ingest -> persist -> forecast workflow against
//! the scripted provider, including the failure-containment scenarios.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Datelike, Duration, NaiveDate};

use surge_core::{
    run_forecast, run_ingest, Database, MockInterestSource, NoopNotifier, RunContext, Settings,
    SparseSeries,
};

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// Settings with millisecond backoff so retries don't slow the suite down.
fn fast_settings() -> Settings {
    let mut s = Settings::default();
    s.ingest.backoff_base = StdDuration::from_millis(1);
    s.ingest.backoff_max = StdDuration::from_millis(5);
    s.ingest.max_attempts = 3;
    s.ingest.jitter = 0.0;
    s
}

fn constant_world(terms: &[&str], start: NaiveDate, end: NaiveDate, value: f64) -> MockInterestSource {
    MockInterestSource::constant(terms, start, end, value)
}

fn ingest_ctx(db: Database, settings: Settings, source: MockInterestSource) -> RunContext {
    RunContext::with_parts(db, settings, Arc::new(source), Arc::new(NoopNotifier))
}

fn interest_value(db: &Database, geo: &str, slug: &str, d: NaiveDate) -> Option<i64> {
    let conn = db.conn().unwrap();
    conn.query_row(
        "SELECT interest FROM daily_interest WHERE geo = ? AND keyword_slug = ? AND day = ?",
        (geo.to_string(), slug.to_string(), d.to_string()),
        |row| row.get(0),
    )
    .ok()
}

fn interest_count(db: &Database, geo: &str, slug: &str) -> i64 {
    let conn = db.conn().unwrap();
    conn.query_row(
        "SELECT COUNT(*) FROM daily_interest WHERE geo = ? AND keyword_slug = ?",
        (geo.to_string(), slug.to_string()),
        |row| row.get(0),
    )
    .unwrap()
}

// =============================================================================
// Ingestion
// =============================================================================

#[tokio::test]
async fn test_ingest_end_to_end_aggregates_synonyms() {
    let db = Database::in_memory().unwrap();
    db.upsert_keyword("sunscreen", "Sun Care", "SG", 0, true)
        .unwrap();
    db.upsert_keyword("sunblock", "Sun Care", "SG", 0, false)
        .unwrap();

    let end = day("2026-06-30");
    let mut settings = fast_settings();
    settings.ingest.days_back = 60;

    let mut world = BTreeMap::new();
    for (term, value) in [("sunscreen", 30.0), ("sunblock", 70.0)] {
        let mut col = SparseSeries::new();
        let mut d = end - Duration::days(60);
        while d <= end {
            col.insert(d, value);
            d += Duration::days(1);
        }
        world.insert(term.to_string(), col);
    }

    let ctx = ingest_ctx(db.clone(), settings, MockInterestSource::new(world));
    let report = run_ingest(&ctx, end).await.unwrap();

    assert_eq!(report.mode, "backfill");
    assert_eq!(report.touched_slugs, vec!["sun_care"]);
    assert!(report.rows_upserted > 0);
    assert!(report.windows_skipped.is_empty());

    // Pointwise max across synonyms.
    assert_eq!(interest_value(&db, "SG", "sun_care", end), Some(70));
    assert_eq!(interest_count(&db, "SG", "sun_care"), 61);
}

#[tokio::test]
async fn test_ingest_is_idempotent() {
    let db = Database::in_memory().unwrap();
    db.upsert_keyword("serum", "Serum", "SG", 0, true).unwrap();

    let end = day("2026-06-30");
    let mut settings = fast_settings();
    settings.ingest.days_back = 60;

    let start = end - Duration::days(60);
    let ctx = ingest_ctx(
        db.clone(),
        settings.clone(),
        constant_world(&["serum"], start, end, 42.0),
    );
    let first = run_ingest(&ctx, end).await.unwrap();
    assert!(first.rows_upserted > 0);

    let count_before = interest_count(&db, "SG", "serum");

    // Identical upstream data, identical end day: nothing new to write.
    let ctx = ingest_ctx(
        db.clone(),
        settings,
        constant_world(&["serum"], start, end, 42.0),
    );
    let second = run_ingest(&ctx, end).await.unwrap();

    assert_eq!(second.rows_upserted, 0);
    assert_eq!(second.note.as_deref(), Some("no_new_rows"));
    assert_eq!(interest_count(&db, "SG", "serum"), count_before);
    assert_eq!(interest_value(&db, "SG", "serum", end), Some(42));
}

#[tokio::test]
async fn test_ingest_incremental_never_rewrites_persisted_days() {
    let db = Database::in_memory().unwrap();
    db.upsert_keyword("serum", "Serum", "SG", 0, true).unwrap();

    let first_end = day("2026-06-20");
    let second_end = day("2026-06-30");
    let mut settings = fast_settings();
    settings.ingest.days_back = 90;

    let ctx = ingest_ctx(
        db.clone(),
        settings.clone(),
        constant_world(&["serum"], first_end - Duration::days(90), first_end, 40.0),
    );
    run_ingest(&ctx, first_end).await.unwrap();

    // The provider has "re-normalized": everything now comes back doubled.
    let ctx = ingest_ctx(
        db.clone(),
        settings,
        constant_world(&["serum"], second_end - Duration::days(200), second_end, 80.0),
    );
    let report = run_ingest(&ctx, second_end).await.unwrap();

    assert_eq!(report.mode, "incremental");
    assert_eq!(report.rows_upserted, 10);
    assert_eq!(report.start, Some(first_end + Duration::days(1)));

    // Days at or before the previous last day keep their original values.
    assert_eq!(interest_value(&db, "SG", "serum", first_end), Some(40));
    assert_eq!(
        interest_value(&db, "SG", "serum", first_end - Duration::days(30)),
        Some(40)
    );
    // Only strictly-newer days carry the new scale.
    assert_eq!(
        interest_value(&db, "SG", "serum", first_end + Duration::days(1)),
        Some(80)
    );
    assert_eq!(interest_value(&db, "SG", "serum", second_end), Some(80));
}

#[tokio::test]
async fn test_ingest_no_active_keywords_is_clean_noop() {
    let db = Database::in_memory().unwrap();
    let end = day("2026-06-30");

    let ctx = ingest_ctx(
        db.clone(),
        fast_settings(),
        constant_world(&["x"], end - Duration::days(10), end, 1.0),
    );
    let report = run_ingest(&ctx, end).await.unwrap();

    assert_eq!(report.rows_upserted, 0);
    assert_eq!(report.note.as_deref(), Some("no_active_keywords"));
}

#[tokio::test]
async fn test_ingest_total_fetch_failure_reports_no_data() {
    let db = Database::in_memory().unwrap();
    db.upsert_keyword("serum", "Serum", "SG", 0, true).unwrap();

    let end = day("2026-06-30");
    let mut settings = fast_settings();
    settings.ingest.days_back = 60;

    let source = constant_world(&["serum"], end - Duration::days(60), end, 42.0)
        .with_transient_failures(usize::MAX);
    let ctx = ingest_ctx(db.clone(), settings, source);

    // Non-fatal: the run completes with an empty result.
    let report = run_ingest(&ctx, end).await.unwrap();
    assert_eq!(report.rows_upserted, 0);
    assert_eq!(report.note.as_deref(), Some("no_data"));
    assert!(!report.windows_skipped.is_empty());
}

#[tokio::test]
async fn test_ingest_400_day_horizon_with_one_dead_window() {
    // Scenario: one mid-run window fails every retry. The stitched series
    // must still be gap-free (interpolation covers the hole) and exactly
    // one skipped-window event must be recorded.
    let db = Database::in_memory().unwrap();
    db.upsert_keyword("serum", "Serum", "SG", 0, true).unwrap();

    let end = day("2026-06-30");
    let mut settings = fast_settings();
    settings.ingest.days_back = 400;

    // Window starts follow the 60-day step from end - 400.
    let doomed_start = end - Duration::days(400) + Duration::days(180);
    let source = constant_world(&["serum"], end - Duration::days(400), end, 61.0)
        .with_failing_window(doomed_start);
    let ctx = ingest_ctx(db.clone(), settings, source);

    let report = run_ingest(&ctx, end).await.unwrap();

    assert_eq!(report.windows_skipped.len(), 1);
    assert_eq!(report.windows_skipped[0].start, doomed_start);

    // 401 consecutive days, no holes.
    assert_eq!(interest_count(&db, "SG", "serum"), 401);
    let conn = db.conn().unwrap();
    let (min_day, max_day): (String, String) = conn
        .query_row(
            "SELECT MIN(day), MAX(day) FROM daily_interest WHERE keyword_slug = 'serum'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(min_day, (end - Duration::days(400)).to_string());
    assert_eq!(max_day, end.to_string());
}

// =============================================================================
// Forecasting
// =============================================================================

fn seed_interest(db: &Database, slug_points: &[(&str, Vec<(NaiveDate, f64)>)], today: NaiveDate) {
    let mut groups: BTreeMap<String, SparseSeries> = BTreeMap::new();
    for (slug, points) in slug_points {
        groups.insert(slug.to_string(), points.iter().copied().collect());
    }
    db.upsert_interest_rows("SG", &groups, today).unwrap();
}

#[tokio::test]
async fn test_forecast_run_writes_horizon_rows() {
    let db = Database::in_memory().unwrap();
    db.upsert_keyword("sunscreen", "Sun Care", "SG", 0, true)
        .unwrap();

    let end = day("2026-06-28");
    let start = end - Duration::days(199);

    // Weekly sawtooth: 90 on Mondays, 5 otherwise.
    let points: Vec<(NaiveDate, f64)> = (0..200)
        .map(|i| {
            let d = start + Duration::days(i);
            let v = if d.weekday().num_days_from_monday() == 0 {
                90.0
            } else {
                5.0
            };
            (d, v)
        })
        .collect();
    seed_interest(&db, &[("sun_care", points)], end);

    let ctx = RunContext::for_forecast(db.clone(), fast_settings()).unwrap();
    let report = run_forecast(&ctx, end).await.unwrap();

    assert_eq!(report.slugs_attempted, 1);
    assert_eq!(report.slugs_trained, 1);
    assert_eq!(report.rows_upserted, 7);
    assert!(report.skipped.is_empty());

    let forecasts = db.load_forecasts("SG", "sun_care").unwrap();
    assert_eq!(forecasts.len(), 7);
    assert_eq!(forecasts[0].0, end + Duration::days(1));

    let mean = (90.0 + 6.0 * 5.0) / 7.0;
    for (d, value) in &forecasts {
        assert!((0..=100).contains(value));
        let weekday_value = if d.weekday().num_days_from_monday() == 0 {
            90.0
        } else {
            5.0
        };
        let v = *value as f64;
        assert!(
            (v - weekday_value).abs() < (v - mean).abs(),
            "day {} forecast {} should sit nearer {} than {}",
            d,
            value,
            weekday_value,
            mean
        );
    }
}

#[tokio::test]
async fn test_forecast_dormant_slug_stays_at_zero() {
    // Scenario: 150 days of constant zero interest yields a 7-day forecast
    // of all zeros.
    let db = Database::in_memory().unwrap();
    db.upsert_keyword("fidget spinner", "Fidget Spinner", "SG", 0, true)
        .unwrap();

    let end = day("2026-06-30");
    let points: Vec<(NaiveDate, f64)> = (0..150)
        .map(|i| (end - Duration::days(149 - i), 0.0))
        .collect();
    seed_interest(&db, &[("fidget_spinner", points)], end);

    let ctx = RunContext::for_forecast(db.clone(), fast_settings()).unwrap();
    let report = run_forecast(&ctx, end).await.unwrap();
    assert_eq!(report.slugs_trained, 1);

    let forecasts = db.load_forecasts("SG", "fidget_spinner").unwrap();
    assert_eq!(forecasts.len(), 7);
    assert!(
        forecasts.iter().all(|(_, v)| *v == 0),
        "expected all-zero forecast, got {:?}",
        forecasts
    );
}

#[tokio::test]
async fn test_forecast_skips_short_history_without_aborting_batch() {
    let db = Database::in_memory().unwrap();
    db.upsert_keyword("sunscreen", "Sun Care", "SG", 0, true)
        .unwrap();
    db.upsert_keyword("toner", "Toner", "SG", 0, false).unwrap();

    let end = day("2026-06-30");
    // Plenty of history for one slug, 30 days for the other.
    let long: Vec<(NaiveDate, f64)> = (0..200)
        .map(|i| (end - Duration::days(199 - i), 20.0 + (i % 10) as f64))
        .collect();
    let short: Vec<(NaiveDate, f64)> = (0..30)
        .map(|i| (end - Duration::days(29 - i), 15.0))
        .collect();
    seed_interest(&db, &[("sun_care", long), ("toner", short)], end);

    let ctx = RunContext::for_forecast(db.clone(), fast_settings()).unwrap();
    let report = run_forecast(&ctx, end).await.unwrap();

    assert_eq!(report.slugs_attempted, 2);
    assert_eq!(report.slugs_trained, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].slug, "toner");
    assert_eq!(report.skipped[0].reason, "insufficient_history");
    assert_eq!(report.skipped[0].rows, Some(30));

    assert_eq!(db.load_forecasts("SG", "sun_care").unwrap().len(), 7);
    assert!(db.load_forecasts("SG", "toner").unwrap().is_empty());
}

#[tokio::test]
async fn test_forecast_regeneration_overwrites_idempotently() {
    let db = Database::in_memory().unwrap();
    db.upsert_keyword("sunscreen", "Sun Care", "SG", 0, true)
        .unwrap();

    let end = day("2026-06-30");
    let points: Vec<(NaiveDate, f64)> = (0..200)
        .map(|i| (end - Duration::days(199 - i), 30.0))
        .collect();
    seed_interest(&db, &[("sun_care", points)], end);

    let ctx = RunContext::for_forecast(db.clone(), fast_settings()).unwrap();
    run_forecast(&ctx, end).await.unwrap();
    let first = db.load_forecasts("SG", "sun_care").unwrap();

    run_forecast(&ctx, end).await.unwrap();
    let second = db.load_forecasts("SG", "sun_care").unwrap();

    assert_eq!(first.len(), 7);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_forecast_no_slugs_is_clean_noop() {
    let db = Database::in_memory().unwrap();
    let ctx = RunContext::for_forecast(db, fast_settings()).unwrap();
    let report = run_forecast(&ctx, day("2026-06-30")).await.unwrap();

    assert_eq!(report.slugs_attempted, 0);
    assert_eq!(report.rows_upserted, 0);
    assert!(report.skipped.is_empty());
}
