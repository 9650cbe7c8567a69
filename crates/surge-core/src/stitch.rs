//! Window stitcher
//!
//! The provider normalizes interest values within a single query, so a long
//! horizon cannot be fetched in one piece: it is partitioned into
//! overlapping windows, each window is fetched with retry/backoff through
//! the run's sticky egress, and the windows are rescaled onto one another
//! using an anchor term's values on the overlap before being merged into
//! one continuous daily series per term.
//!
//! Failures are contained: an exhausted window is recorded and skipped, the
//! final interpolation pass covers the hole, and only a run with no data at
//! all reports an empty outcome.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{Duration, NaiveDate};
use tracing::{debug, info, warn};

use crate::backoff::{Backoff, BackoffPolicy};
use crate::config::Settings;
use crate::error::Error;
use crate::models::SkippedWindow;
use crate::series::{DailySeries, SparseSeries};
use crate::source::{InterestSource, TermFrame};

const MIN_OVERLAP_POINTS: usize = 3;
const RATIO_EPS: f64 = 1e-6;

/// Result of stitching one horizon. Window failures are data, not errors.
#[derive(Debug, Default)]
pub struct StitchOutcome {
    /// Continuous, scale-corrected daily series per term.
    pub terms: BTreeMap<String, DailySeries>,
    pub skipped: Vec<SkippedWindow>,
}

impl StitchOutcome {
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Partition `days_back` days ending at `end` into overlapping windows.
///
/// Span is clamped to [30, 90] by the total horizon; with the default
/// 60-day step consecutive windows share at least 30 days, enough for a
/// stable overlap rescale.
pub fn make_windows(
    end: NaiveDate,
    days_back: i64,
    span_days: i64,
    step_days: i64,
) -> Vec<(NaiveDate, NaiveDate)> {
    // Effective window length is min(span, horizon): short horizons come
    // back in a single clipped window.
    let span = span_days.clamp(30, 90);
    let start_total = end - Duration::days(days_back);

    let mut windows = Vec::new();
    let mut cur_start = start_total;
    while cur_start < end {
        let w_end = (cur_start + Duration::days(span - 1)).min(end);
        windows.push((cur_start, w_end));
        if w_end >= end {
            break;
        }
        cur_start += Duration::days(step_days);
    }
    windows
}

/// Scale factor mapping `current` onto `reference` over their shared days.
///
/// Median ratio over days where both sides are strictly positive (at least
/// 3 required). With fewer, fall back to an epsilon-stabilized ratio over
/// the whole overlap; anything non-finite or non-positive degrades to 1.0.
pub fn overlap_scale_factor(reference: &SparseSeries, current: &SparseSeries) -> f64 {
    let shared: Vec<(f64, f64)> = reference
        .iter()
        .filter_map(|(day, &a)| current.get(day).map(|&b| (a, b)))
        .collect();

    if shared.len() < MIN_OVERLAP_POINTS {
        return 1.0;
    }

    let positive: Vec<f64> = shared
        .iter()
        .filter(|(a, b)| *a > 0.0 && *b > 0.0)
        .map(|(a, b)| a / b)
        .filter(|r| r.is_finite())
        .collect();

    let ratios = if positive.len() >= MIN_OVERLAP_POINTS {
        positive
    } else {
        shared
            .iter()
            .map(|(a, b)| (a + RATIO_EPS) / (b + RATIO_EPS))
            .filter(|r| r.is_finite())
            .collect()
    };

    match median(&ratios) {
        Some(r) if r.is_finite() && r > 0.0 => r,
        _ => 1.0,
    }
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

fn time_exhausted(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

/// Fetch one window, batching terms above the provider's per-call ceiling.
///
/// Every batch after the first shares the anchor term so its values can be
/// rescaled onto the first batch before the columns are unioned.
async fn fetch_window_batched(
    source: &dyn InterestSource,
    terms: &[String],
    geo: &str,
    category: u32,
    start: NaiveDate,
    end: NaiveDate,
    max_terms: usize,
) -> crate::error::Result<TermFrame> {
    let max_terms = max_terms.max(1);
    if terms.len() <= max_terms {
        return source.fetch_interest(terms, geo, category, start, end).await;
    }

    let anchor = &terms[0];
    let mut combined = source
        .fetch_interest(&terms[..max_terms], geo, category, start, end)
        .await?;

    let mut idx = max_terms;
    while idx < terms.len() {
        // A per-call ceiling of one leaves no room to share the anchor;
        // such batches go out alone and unreconciled.
        let (batch, take) = if max_terms == 1 {
            (vec![terms[idx].clone()], 1)
        } else {
            let take = (max_terms - 1).min(terms.len() - idx);
            let mut batch = Vec::with_capacity(take + 1);
            batch.push(anchor.clone());
            batch.extend_from_slice(&terms[idx..idx + take]);
            (batch, take)
        };

        let mut frame = source
            .fetch_interest(&batch, geo, category, start, end)
            .await?;

        let factor = match (combined.columns.get(anchor), frame.columns.get(anchor)) {
            (Some(reference), Some(current)) => Some(overlap_scale_factor(reference, current)),
            _ => None,
        };
        if let Some(factor) = factor {
            debug!("batch rescale factor {:.4} for {}..{}", factor, start, end);
            frame.scale(factor);
        }

        // The anchor column already lives in the first batch.
        frame.columns.remove(anchor);
        for (term, col) in frame.columns {
            combined.columns.entry(term).or_insert(col);
        }
        idx += take;
    }

    Ok(combined)
}

/// Fetch one window through the retry state machine.
///
/// Backs off with jitter on every failure, rotates egress after two
/// consecutive transport failures, and gives up early when the run's time
/// budget is exhausted. Returns the failure reason once retries run out.
async fn fetch_window_with_retry(
    source: &dyn InterestSource,
    settings: &Settings,
    terms: &[String],
    start: NaiveDate,
    end: NaiveDate,
    deadline: Option<Instant>,
) -> std::result::Result<TermFrame, String> {
    let mut backoff = Backoff::new(BackoffPolicy::from_settings(&settings.ingest));
    let mut transport_failures = 0u32;

    loop {
        if time_exhausted(deadline) {
            return Err("time budget exhausted".to_string());
        }

        match fetch_window_batched(
            source,
            terms,
            &settings.ingest.geo,
            settings.ingest.category,
            start,
            end,
            settings.source.max_terms_per_call,
        )
        .await
        {
            Ok(frame) => return Ok(frame),
            Err(e) => {
                warn!(
                    "window {}..{} attempt {} failed: {}",
                    start,
                    end,
                    backoff.attempt() + 1,
                    e
                );

                if matches!(e, Error::Http(_)) {
                    transport_failures += 1;
                    if transport_failures >= 2 {
                        source.rotate_egress().await;
                        transport_failures = 0;
                    }
                } else {
                    transport_failures = 0;
                }

                let Some(delay) = backoff.next_delay() else {
                    return Err(format!("retries exhausted: {}", e));
                };
                if deadline.is_some_and(|d| Instant::now() + delay >= d) {
                    return Err("time budget exhausted".to_string());
                }
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Fetch and stitch `days_back` days of interest for `terms`.
///
/// Windows are fetched strictly one at a time to respect the provider's
/// rate limits, merged chronologically with anchor-based rescaling, then
/// clipped, reindexed to daily frequency, and gap-interpolated per term.
pub async fn stitch_daily(
    source: &dyn InterestSource,
    settings: &Settings,
    terms: &[String],
    end_day: NaiveDate,
    days_back: i64,
    deadline: Option<Instant>,
) -> StitchOutcome {
    let windows = make_windows(
        end_day,
        days_back,
        settings.ingest.window_span_days,
        settings.ingest.window_step_days,
    );
    info!(
        "stitching {} days over {} windows for {} terms",
        days_back,
        windows.len(),
        terms.len()
    );

    let mut skipped = Vec::new();
    let mut frames: Vec<TermFrame> = Vec::new();

    for (i, &(start, end)) in windows.iter().enumerate() {
        if time_exhausted(deadline) {
            for &(s, e) in &windows[i..] {
                skipped.push(SkippedWindow {
                    start: s,
                    end: e,
                    reason: "time budget exhausted".to_string(),
                });
            }
            warn!("time budget exhausted with {} windows left", windows.len() - i);
            break;
        }

        match fetch_window_with_retry(source, settings, terms, start, end, deadline).await {
            Ok(frame) => frames.push(frame),
            Err(reason) => {
                warn!("skipping window {}..{}: {}", start, end, reason);
                skipped.push(SkippedWindow { start, end, reason });
            }
        }

        // Pace consecutive windows; the provider throttles bursts.
        if i + 1 < windows.len() && !time_exhausted(deadline) {
            tokio::time::sleep(settings.ingest.backoff_base).await;
        }
    }

    let anchor = terms.first();
    let mut merged: Option<TermFrame> = None;

    for mut frame in frames {
        if frame.is_empty() {
            continue;
        }
        let Some(existing) = merged.as_mut() else {
            merged = Some(frame);
            continue;
        };

        // Prefer the anchor for rescaling; fall back to any shared term.
        let scale_col = anchor
            .filter(|t| existing.columns.contains_key(*t) && frame.columns.contains_key(*t))
            .or_else(|| {
                terms
                    .iter()
                    .find(|t| existing.columns.contains_key(*t) && frame.columns.contains_key(*t))
            });

        if let Some(col) = scale_col {
            let factor = overlap_scale_factor(&existing.columns[col], &frame.columns[col]);
            debug!("window rescale factor {:.4} via '{}'", factor, col);
            frame.scale(factor);
        }

        for (term, col) in frame.columns {
            let target = existing.columns.entry(term).or_default();
            for (day, value) in col {
                target
                    .entry(day)
                    .and_modify(|v| *v = (*v + value) / 2.0)
                    .or_insert(value);
            }
        }
    }

    let mut outcome = StitchOutcome {
        terms: BTreeMap::new(),
        skipped,
    };

    if let Some(merged) = merged {
        for (term, mut col) in merged.columns {
            for value in col.values_mut() {
                *value = value.clamp(0.0, 100.0);
            }
            if let Some(mut series) = DailySeries::from_sparse(&col) {
                series.clip(0.0, 100.0);
                outcome.terms.insert(term, series);
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockInterestSource;
    use std::time::Duration as StdDuration;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn fast_settings() -> Settings {
        let mut s = Settings::default();
        s.ingest.backoff_base = StdDuration::from_millis(1);
        s.ingest.backoff_max = StdDuration::from_millis(5);
        s.ingest.max_attempts = 3;
        s.ingest.jitter = 0.0;
        s
    }

    fn sparse(points: &[(&str, f64)]) -> SparseSeries {
        points.iter().map(|(d, v)| (day(d), *v)).collect()
    }

    #[test]
    fn test_make_windows_covers_horizon_with_overlap() {
        let end = day("2026-06-30");
        let windows = make_windows(end, 400, 90, 60);

        assert_eq!(windows.first().unwrap().0, end - Duration::days(400));
        assert_eq!(windows.last().unwrap().1, end);

        // Consecutive windows must overlap by at least 30 days.
        for pair in windows.windows(2) {
            let overlap = (pair[0].1 - pair[1].0).num_days() + 1;
            assert!(overlap >= 30, "overlap was {} days", overlap);
        }
    }

    #[test]
    fn test_make_windows_short_horizon_single_window() {
        let end = day("2026-06-30");
        let windows = make_windows(end, 45, 90, 60);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0], (end - Duration::days(45), end));
    }

    #[test]
    fn test_scale_factor_median_ratio() {
        let reference = sparse(&[("2026-01-01", 10.0), ("2026-01-02", 20.0), ("2026-01-03", 30.0)]);
        let current = sparse(&[("2026-01-01", 5.0), ("2026-01-02", 10.0), ("2026-01-03", 15.0)]);
        assert!((overlap_scale_factor(&reference, &current) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_scale_factor_too_few_shared_days() {
        let reference = sparse(&[("2026-01-01", 10.0), ("2026-01-02", 20.0)]);
        let current = sparse(&[("2026-01-01", 5.0), ("2026-01-02", 10.0)]);
        assert_eq!(overlap_scale_factor(&reference, &current), 1.0);
    }

    #[test]
    fn test_scale_factor_epsilon_fallback() {
        // Enough shared days but fewer than 3 strictly-positive pairs.
        let reference = sparse(&[("2026-01-01", 0.0), ("2026-01-02", 0.0), ("2026-01-03", 8.0)]);
        let current = sparse(&[("2026-01-01", 0.0), ("2026-01-02", 0.0), ("2026-01-03", 4.0)]);
        let factor = overlap_scale_factor(&reference, &current);
        // Median of {1, 1, ~2} with epsilon stabilization.
        assert!((factor - 1.0).abs() < 1e-3, "factor was {}", factor);
    }

    #[tokio::test]
    async fn test_stitch_rescales_misnormalized_window() {
        // The second window comes back at 3x scale; stitched values on its
        // range must match the first window's scale.
        let end = day("2026-06-30");
        let source = MockInterestSource::constant(&["spf"], end - Duration::days(150), end, 40.0)
            .with_window_scale(move |start, _| {
                if start > end - Duration::days(150) {
                    3.0
                } else {
                    1.0
                }
            });

        let outcome = stitch_daily(
            &source,
            &fast_settings(),
            &["spf".to_string()],
            end,
            150,
            None,
        )
        .await;

        assert!(outcome.skipped.is_empty());
        let series = &outcome.terms["spf"];
        for (d, v) in series.iter_days() {
            assert!((v - 40.0).abs() < 0.5, "day {} stitched to {}", d, v);
        }
    }

    #[tokio::test]
    async fn test_stitch_skips_exhausted_window_and_interpolates() {
        let end = day("2026-06-30");
        let windows = make_windows(end, 400, 90, 60);
        let doomed = windows[3].0;

        let source = MockInterestSource::constant(&["spf"], end - Duration::days(400), end, 55.0)
            .with_failing_window(doomed);

        let outcome = stitch_daily(
            &source,
            &fast_settings(),
            &["spf".to_string()],
            end,
            400,
            None,
        )
        .await;

        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].start, doomed);

        // The hole left by the dead window is interpolated over: the series
        // is dense over the whole horizon.
        let series = &outcome.terms["spf"];
        assert_eq!(series.start(), end - Duration::days(400));
        assert_eq!(series.last_day(), end);
        assert!(series.values().iter().all(|v| v.is_finite()));
    }

    #[tokio::test]
    async fn test_stitch_all_windows_failed_is_empty_not_fatal() {
        let end = day("2026-06-30");
        let source = MockInterestSource::constant(&["spf"], end - Duration::days(60), end, 10.0)
            .with_transient_failures(usize::MAX);

        let outcome = stitch_daily(
            &source,
            &fast_settings(),
            &["spf".to_string()],
            end,
            60,
            None,
        )
        .await;

        assert!(outcome.is_empty());
        assert!(!outcome.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_stitch_respects_exhausted_time_budget() {
        let end = day("2026-06-30");
        let source = MockInterestSource::constant(&["spf"], end - Duration::days(200), end, 10.0);

        let deadline = Some(Instant::now() - StdDuration::from_millis(1));
        let outcome = stitch_daily(
            &source,
            &fast_settings(),
            &["spf".to_string()],
            end,
            200,
            deadline,
        )
        .await;

        assert!(outcome.is_empty());
        assert!(!outcome.skipped.is_empty());
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_batching_shares_anchor_across_calls() {
        let end = day("2026-03-31");
        let terms: Vec<String> = (0..7).map(|i| format!("term{}", i)).collect();
        let term_refs: Vec<&str> = terms.iter().map(String::as_str).collect();
        let source =
            MockInterestSource::constant(&term_refs, end - Duration::days(40), end, 25.0);

        let outcome = stitch_daily(&source, &fast_settings(), &terms, end, 40, None).await;
        assert_eq!(outcome.terms.len(), 7);

        let calls = source.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].terms.len(), 5);
        // The follow-up batch carries the anchor for scale reconciliation.
        assert_eq!(calls[1].terms[0], "term0");
        assert!(calls[1].terms.len() <= 5);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_throttle() {
        let end = day("2026-03-31");
        let source = MockInterestSource::constant(&["spf"], end - Duration::days(40), end, 25.0)
            .with_transient_failures(2);

        let outcome = stitch_daily(
            &source,
            &fast_settings(),
            &["spf".to_string()],
            end,
            40,
            None,
        )
        .await;

        assert!(outcome.skipped.is_empty());
        assert_eq!(source.calls().len(), 3);
        assert!(outcome.terms.contains_key("spf"));
    }
}
