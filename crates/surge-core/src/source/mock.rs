//! Scripted interest source for tests
//!
//! Holds a ground-truth "world" of per-term daily values and serves window
//! slices from it, optionally rescaled per window (the real provider
//! normalizes within each query) and with scheduled failures for retry and
//! skip testing.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::{Error, Result};
use crate::series::SparseSeries;

use super::{InterestSource, TermFrame};

type WindowScale = Box<dyn Fn(NaiveDate, NaiveDate) -> f64 + Send + Sync>;

/// One recorded fetch call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub terms: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Default)]
pub struct MockInterestSource {
    world: BTreeMap<String, SparseSeries>,
    window_scale: Option<WindowScale>,
    /// Window starts that fail on every attempt.
    failing_starts: HashSet<NaiveDate>,
    /// Number of leading calls that fail before the source recovers.
    transient_failures: AtomicUsize,
    calls: Mutex<Vec<RecordedCall>>,
    rotations: AtomicUsize,
}

impl MockInterestSource {
    pub fn new(world: BTreeMap<String, SparseSeries>) -> Self {
        Self {
            world,
            ..Default::default()
        }
    }

    /// A world where every term holds `value` on every day of the range.
    pub fn constant(terms: &[&str], start: NaiveDate, end: NaiveDate, value: f64) -> Self {
        let mut world = BTreeMap::new();
        for term in terms {
            let mut col = SparseSeries::new();
            let mut day = start;
            while day <= end {
                col.insert(day, value);
                day = day.succ_opt().unwrap();
            }
            world.insert(term.to_string(), col);
        }
        Self::new(world)
    }

    /// Rescale each served window by `f(start, end)`, emulating per-query
    /// normalization.
    pub fn with_window_scale(
        mut self,
        f: impl Fn(NaiveDate, NaiveDate) -> f64 + Send + Sync + 'static,
    ) -> Self {
        self.window_scale = Some(Box::new(f));
        self
    }

    /// Make the window starting at `start` fail on every attempt.
    pub fn with_failing_window(mut self, start: NaiveDate) -> Self {
        self.failing_starts.insert(start);
        self
    }

    /// Fail the first `n` calls (throttle), then recover.
    pub fn with_transient_failures(self, n: usize) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn rotations(&self) -> usize {
        self.rotations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InterestSource for MockInterestSource {
    async fn fetch_interest(
        &self,
        terms: &[String],
        _geo: &str,
        _category: u32,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<TermFrame> {
        self.calls.lock().unwrap().push(RecordedCall {
            terms: terms.to_vec(),
            start,
            end,
        });

        if self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::Source("throttled (429)".to_string()));
        }

        if self.failing_starts.contains(&start) {
            return Err(Error::Source("throttled (429)".to_string()));
        }

        let scale = self
            .window_scale
            .as_ref()
            .map(|f| f(start, end))
            .unwrap_or(1.0);

        let mut frame = TermFrame::new();
        for term in terms {
            if let Some(col) = self.world.get(term) {
                for (&day, &value) in col.range(start..=end) {
                    frame.insert(term, day, value * scale);
                }
            }
        }
        Ok(frame)
    }

    async fn rotate_egress(&self) {
        self.rotations.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[tokio::test]
    async fn test_serves_window_slice() {
        let source =
            MockInterestSource::constant(&["spf"], day("2026-01-01"), day("2026-01-31"), 50.0);

        let frame = source
            .fetch_interest(
                &["spf".to_string()],
                "SG",
                0,
                day("2026-01-10"),
                day("2026-01-12"),
            )
            .await
            .unwrap();

        assert_eq!(frame.columns["spf"].len(), 3);
        assert_eq!(frame.columns["spf"][&day("2026-01-10")], 50.0);
    }

    #[tokio::test]
    async fn test_transient_failures_then_recovery() {
        let source =
            MockInterestSource::constant(&["spf"], day("2026-01-01"), day("2026-01-31"), 50.0)
                .with_transient_failures(2);

        let terms = vec!["spf".to_string()];
        assert!(source
            .fetch_interest(&terms, "SG", 0, day("2026-01-01"), day("2026-01-02"))
            .await
            .is_err());
        assert!(source
            .fetch_interest(&terms, "SG", 0, day("2026-01-01"), day("2026-01-02"))
            .await
            .is_err());
        assert!(source
            .fetch_interest(&terms, "SG", 0, day("2026-01-01"), day("2026-01-02"))
            .await
            .is_ok());
        assert_eq!(source.calls().len(), 3);
    }
}
