//! Group aggregation
//!
//! A keyword group tracks several synonym spellings of the same concept;
//! its daily series is the pointwise maximum across the matched term
//! columns. Groups whose terms all failed to stitch are silently dropped.

use std::collections::BTreeMap;

use tracing::debug;

use crate::models::KeywordGroup;
use crate::series::{DailySeries, SparseSeries};

/// Roll stitched per-term series up into per-group series.
pub fn aggregate_groups(
    term_series: &BTreeMap<String, DailySeries>,
    groups: &[KeywordGroup],
) -> BTreeMap<String, SparseSeries> {
    let mut out = BTreeMap::new();

    for group in groups {
        let matched: Vec<&DailySeries> = group
            .terms
            .iter()
            .filter_map(|term| term_series.get(term))
            .collect();

        if matched.is_empty() {
            debug!("group '{}' has no stitched terms, dropping", group.slug);
            continue;
        }

        let mut series = SparseSeries::new();
        for term in matched {
            for (day, value) in term.iter_days() {
                series
                    .entry(day)
                    .and_modify(|v: &mut f64| *v = v.max(value))
                    .or_insert(value);
            }
        }
        out.insert(group.slug.clone(), series);
    }

    out
}
