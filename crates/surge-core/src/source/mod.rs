//! Interest-index source clients
//!
//! The provider is an external, rate-limited service that returns a daily
//! relative-interest value per term for a requested window. Everything
//! upstream of the stitcher goes through the [`InterestSource`] trait so
//! tests can script the provider.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::series::SparseSeries;

mod http;
mod mock;

pub use http::HttpInterestSource;
pub use mock::MockInterestSource;

/// One fetch window's worth of per-term daily values.
#[derive(Debug, Clone, Default)]
pub struct TermFrame {
    pub columns: BTreeMap<String, SparseSeries>,
}

impl TermFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.values().all(|col| col.is_empty())
    }

    pub fn insert(&mut self, term: &str, day: NaiveDate, value: f64) {
        self.columns.entry(term.to_string()).or_default().insert(day, value);
    }

    /// Multiply every value by `factor` (overlap scale correction).
    pub fn scale(&mut self, factor: f64) {
        for col in self.columns.values_mut() {
            for value in col.values_mut() {
                *value *= factor;
            }
        }
    }
}

/// A client for the rate-limited interest index.
///
/// Implementations must respect the provider's per-call term ceiling; the
/// stitcher handles batching above it. Calls are serialized by the caller:
/// at most one outstanding request per run.
#[async_trait]
pub trait InterestSource: Send + Sync {
    /// Fetch daily interest for up to `max_terms_per_call` terms over the
    /// inclusive date window. Values are normalized within the query.
    async fn fetch_interest(
        &self,
        terms: &[String],
        geo: &str,
        category: u32,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<TermFrame>;

    /// Switch to the next healthy egress, if the implementation has more
    /// than one. Called by the retry machinery after repeated transport
    /// failures; the default is a no-op.
    async fn rotate_egress(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_frame_scale() {
        let mut frame = TermFrame::new();
        frame.insert("sunscreen", day("2026-01-01"), 40.0);
        frame.insert("sunscreen", day("2026-01-02"), 60.0);

        frame.scale(0.5);
        let col = &frame.columns["sunscreen"];
        assert_eq!(col[&day("2026-01-01")], 20.0);
        assert_eq!(col[&day("2026-01-02")], 30.0);
    }

    #[test]
    fn test_frame_empty() {
        let mut frame = TermFrame::new();
        assert!(frame.is_empty());
        frame.insert("spf", day("2026-01-01"), 1.0);
        assert!(!frame.is_empty());
    }
}
