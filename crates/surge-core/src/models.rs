//! Domain types shared across the pipeline
//!
//! Keyword registry rows, synonym groups, and the run reports returned by
//! the two scheduled entry points. Interest and forecast rows live only in
//! the database; they are written through upserts keyed by their natural
//! keys and never round-tripped as structs.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// A row of the keyword registry.
///
/// The registry is the source of truth for which terms are tracked; this
/// core consumes only active rows matching the run's geo/category.
#[derive(Debug, Clone, Serialize)]
pub struct Keyword {
    pub id: i64,
    pub keyword: String,
    pub group_name: String,
    pub geo: String,
    pub category: u32,
    pub is_active: bool,
    pub is_anchor: bool,
    pub created_at: DateTime<Utc>,
}

/// A named group of synonym terms, identified by its slug.
///
/// Terms are ordered anchor-first; the first term of the first group doubles
/// as the shared anchor used for cross-batch and cross-window rescaling.
#[derive(Debug, Clone)]
pub struct KeywordGroup {
    pub slug: String,
    pub name: String,
    pub geo: String,
    pub category: u32,
    pub terms: Vec<String>,
}

/// Derive a group slug from its human-readable name.
///
/// Lowercase, trimmed, non-alphanumeric characters collapsed to underscores,
/// truncated to 64 chars, leading/trailing underscores stripped.
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    let mapped: String = lowered
        .trim()
        .chars()
        .map(|ch| if ch.is_alphanumeric() { ch } else { '_' })
        .take(64)
        .collect();
    mapped.trim_matches('_').to_string()
}

/// One skipped fetch window, recorded by the stitcher.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub reason: String,
}

/// One skipped slug, recorded by the forecasting run.
#[derive(Debug, Clone, Serialize)]
pub struct SlugSkip {
    pub slug: String,
    pub reason: String,
    /// Number of history rows available, when the skip was about history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
}

/// Result of one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub geo: String,
    pub rows_upserted: usize,
    /// Slugs that received at least one new row.
    pub touched_slugs: Vec<String>,
    pub existed_slugs: Vec<String>,
    pub new_slugs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
    /// "backfill" when any brand-new slug was fetched, else "incremental".
    pub mode: String,
    pub effective_days_back: i64,
    pub windows_skipped: Vec<SkippedWindow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl IngestReport {
    /// An empty report for runs that had nothing to do.
    pub fn noop(geo: &str, note: &str) -> Self {
        Self {
            geo: geo.to_string(),
            rows_upserted: 0,
            touched_slugs: Vec::new(),
            existed_slugs: Vec::new(),
            new_slugs: Vec::new(),
            start: None,
            end: None,
            mode: "incremental".to_string(),
            effective_days_back: 0,
            windows_skipped: Vec::new(),
            note: Some(note.to_string()),
        }
    }
}

/// Result of one forecasting run.
///
/// Callers treat partial success as success: per-slug failures land in
/// `skipped` and never abort the batch.
#[derive(Debug, Clone, Serialize)]
pub struct ForecastReport {
    pub geo: String,
    pub slugs_attempted: usize,
    pub slugs_trained: usize,
    pub rows_upserted: usize,
    pub skipped: Vec<SlugSkip>,
    pub history_days: i64,
    pub horizon_days: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Sunscreen SPF"), "sunscreen_spf");
        assert_eq!(slugify("  Vitamin C  "), "vitamin_c");
    }

    #[test]
    fn test_slugify_strips_edge_underscores() {
        assert_eq!(slugify("!Retinol!"), "retinol");
        assert_eq!(slugify("__already__"), "already");
    }

    #[test]
    fn test_slugify_collapses_symbols() {
        // Each non-alphanumeric char maps to an underscore; no collapsing of
        // runs, matching the registry's historical slugs.
        assert_eq!(slugify("K-Beauty & Co"), "k_beauty___co");
    }

    #[test]
    fn test_slugify_truncates() {
        let long = "a".repeat(100);
        assert_eq!(slugify(&long).len(), 64);
    }

    #[test]
    fn test_slugify_empty() {
        assert_eq!(slugify("   "), "");
        assert_eq!(slugify("!!!"), "");
    }
}
