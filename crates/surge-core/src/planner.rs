//! Incremental fetch planner
//!
//! Ingestion re-fetches a fixed overlap window past a known slug's last
//! persisted day so new windows can be rescaled against data we already
//! trust, while brand-new slugs get the full backfill horizon. After
//! stitching and aggregation, only days strictly after a slug's previous
//! last day are written: persisted history is never rewritten.

use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, NaiveDate};

use crate::series::SparseSeries;

/// The fetch horizon for one run.
#[derive(Debug, Clone)]
pub struct FetchPlan {
    pub start: NaiveDate,
    /// Days between `start` and the run's end day, at least 1, capped at
    /// the configured backfill horizon.
    pub effective_days_back: i64,
    pub new_slugs: Vec<String>,
    pub existed_slugs: Vec<String>,
}

impl FetchPlan {
    pub fn mode(&self) -> &'static str {
        if self.new_slugs.is_empty() {
            "incremental"
        } else {
            "backfill"
        }
    }
}

/// Compute the minimal horizon covering every slug's needs.
pub fn plan_fetch(
    end_day: NaiveDate,
    days_back: i64,
    overlap_days: i64,
    slugs: &[String],
    last_days: &HashMap<String, NaiveDate>,
) -> FetchPlan {
    let backfill_start = end_day - Duration::days(days_back);

    let mut new_slugs = Vec::new();
    let mut existed_slugs = Vec::new();
    let mut start = end_day;

    for slug in slugs {
        let slug_start = match last_days.get(slug) {
            Some(&last) => {
                existed_slugs.push(slug.clone());
                // Overlap window past the last day, never earlier than the
                // full backfill horizon.
                backfill_start.max(last - Duration::days(overlap_days))
            }
            None => {
                new_slugs.push(slug.clone());
                backfill_start
            }
        };
        start = start.min(slug_start);
    }

    if slugs.is_empty() {
        start = backfill_start;
    }

    new_slugs.sort();
    existed_slugs.sort();

    FetchPlan {
        start,
        effective_days_back: (end_day - start).num_days().max(1),
        new_slugs,
        existed_slugs,
    }
}

/// Drop every day at or before a slug's previously persisted last day.
///
/// Slugs left with no rows fall out entirely; for a brand-new slug every
/// computed day survives.
pub fn filter_new_rows(
    groups: BTreeMap<String, SparseSeries>,
    last_days: &HashMap<String, NaiveDate>,
) -> BTreeMap<String, SparseSeries> {
    groups
        .into_iter()
        .filter_map(|(slug, series)| {
            let filtered: SparseSeries = match last_days.get(&slug) {
                Some(&last) => series.into_iter().filter(|(day, _)| *day > last).collect(),
                None => series,
            };
            (!filtered.is_empty()).then_some((slug, filtered))
        })
        .collect()
}
