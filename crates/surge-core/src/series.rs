//! Daily time-series primitives
//!
//! The provider, the stitcher, and the forecaster all speak in per-day
//! values. Two shapes cover every need:
//! - [`SparseSeries`]: whatever days we happen to have, ordered by date
//! - [`DailySeries`]: a dense run of consecutive days, gap-free
//!
//! `DailySeries::from_sparse` is the single densification point: it
//! reindexes to daily frequency, linearly interpolates internal gaps, and
//! fills edges from the nearest observation.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};

/// Observed values keyed by day; days may be missing.
pub type SparseSeries = BTreeMap<NaiveDate, f64>;

/// A dense daily series: one value per consecutive day from `start`.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySeries {
    start: NaiveDate,
    values: Vec<f64>,
}

impl DailySeries {
    pub fn new(start: NaiveDate, values: Vec<f64>) -> Self {
        Self { start, values }
    }

    /// Densify a sparse series over its own min..=max day range.
    ///
    /// Internal gaps are linearly interpolated by day distance. The first
    /// and last days are observations by construction, so edge filling only
    /// matters for NaN observations, which are replaced by the nearest
    /// finite neighbor.
    pub fn from_sparse(sparse: &SparseSeries) -> Option<Self> {
        let (&first, _) = sparse.iter().next()?;
        let (&last, _) = sparse.iter().next_back()?;
        let len = (last - first).num_days() as usize + 1;

        let mut values = vec![f64::NAN; len];
        for (&day, &value) in sparse {
            let idx = (day - first).num_days() as usize;
            if value.is_finite() {
                values[idx] = value;
            }
        }

        interpolate_in_place(&mut values);

        // A series of only NaNs has nothing to offer.
        if values.iter().all(|v| v.is_nan()) {
            return None;
        }

        Some(Self {
            start: first,
            values,
        })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn last_day(&self) -> NaiveDate {
        self.start + Duration::days(self.values.len() as i64 - 1)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, day: NaiveDate) -> Option<f64> {
        if day < self.start {
            return None;
        }
        let idx = (day - self.start).num_days() as usize;
        self.values.get(idx).copied()
    }

    /// Iterate (day, value) pairs in order.
    pub fn iter_days(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(move |(i, &v)| (self.start + Duration::days(i as i64), v))
    }

    /// Clamp every value into [lo, hi].
    pub fn clip(&mut self, lo: f64, hi: f64) {
        for v in &mut self.values {
            *v = v.clamp(lo, hi);
        }
    }
}

/// Linearly interpolate NaN runs between finite values; edges take the
/// nearest finite neighbor.
fn interpolate_in_place(values: &mut [f64]) {
    let n = values.len();
    let mut prev_known: Option<usize> = None;
    let mut i = 0;

    while i < n {
        if values[i].is_finite() {
            prev_known = Some(i);
            i += 1;
            continue;
        }

        // Find the end of this NaN run.
        let run_start = i;
        while i < n && !values[i].is_finite() {
            i += 1;
        }
        let next_known = if i < n { Some(i) } else { None };

        match (prev_known, next_known) {
            (Some(p), Some(q)) => {
                let span = (q - p) as f64;
                let (vp, vq) = (values[p], values[q]);
                for j in run_start..q {
                    let t = (j - p) as f64 / span;
                    values[j] = vp + (vq - vp) * t;
                }
            }
            // Leading gap: back-fill from the first observation.
            (None, Some(q)) => {
                let vq = values[q];
                for j in run_start..q {
                    values[j] = vq;
                }
            }
            // Trailing gap: forward-fill from the last observation.
            (Some(p), None) => {
                let vp = values[p];
                for j in run_start..n {
                    values[j] = vp;
                }
            }
            (None, None) => {}
        }
    }
}
