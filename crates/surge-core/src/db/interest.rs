//! Daily interest operations

use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, NaiveDate, Utc};
use rusqlite::params;

use super::Database;
use crate::error::Result;
use crate::series::SparseSeries;

/// Per-slug ingestion/forecast bookkeeping for the status command.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SlugStatus {
    pub slug: String,
    pub interest_rows: usize,
    pub last_interest_day: Option<NaiveDate>,
    pub last_forecast_day: Option<NaiveDate>,
}

impl Database {
    /// Upsert one run's worth of per-group daily values.
    ///
    /// Values are rounded to integers and clamped into [0, 100]; NaNs are
    /// skipped. A day is partial when it is yesterday or younger relative
    /// to `today`; older days settle permanently on first write.
    pub fn upsert_interest_rows(
        &self,
        geo: &str,
        groups: &BTreeMap<String, SparseSeries>,
        today: NaiveDate,
    ) -> Result<usize> {
        let conn = self.conn()?;
        let ingested_at = Utc::now().to_rfc3339();
        let partial_threshold = today - Duration::days(1);

        let mut stmt = conn.prepare(
            r#"
            INSERT INTO daily_interest
                (day, geo, keyword_slug, keyword_raw, interest, is_partial, ingested_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(day, geo, keyword_slug) DO UPDATE SET
                interest = excluded.interest,
                keyword_raw = excluded.keyword_raw,
                is_partial = excluded.is_partial,
                ingested_at = excluded.ingested_at
            "#,
        )?;

        let mut rows = 0;
        for (slug, series) in groups {
            let keyword_raw = slug.replace('_', " ");
            for (&day, &value) in series {
                if value.is_nan() {
                    continue;
                }
                let interest = (value.round() as i64).clamp(0, 100);
                let is_partial = day >= partial_threshold;
                stmt.execute(params![
                    day.to_string(),
                    geo,
                    slug,
                    keyword_raw,
                    interest,
                    is_partial,
                    ingested_at,
                ])?;
                rows += 1;
            }
        }

        Ok(rows)
    }

    /// Last persisted day per slug, for incremental planning.
    ///
    /// Slugs with no rows are absent from the result.
    pub fn last_days(&self, geo: &str, slugs: &[String]) -> Result<HashMap<String, NaiveDate>> {
        if slugs.is_empty() {
            return Ok(HashMap::new());
        }

        let conn = self.conn()?;
        let placeholders = vec!["?"; slugs.len()].join(",");
        let query = format!(
            r#"
            SELECT keyword_slug, MAX(day) AS last_day
            FROM daily_interest
            WHERE geo = ? AND keyword_slug IN ({})
            GROUP BY keyword_slug
            "#,
            placeholders
        );

        let mut stmt = conn.prepare(&query)?;
        let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&geo];
        for slug in slugs {
            params_vec.push(slug);
        }

        let mut out = HashMap::new();
        let rows = stmt.query_map(params_vec.as_slice(), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (slug, day_str) = row?;
            if let Ok(day) = NaiveDate::parse_from_str(&day_str, "%Y-%m-%d") {
                out.insert(slug, day);
            }
        }

        Ok(out)
    }

    /// Load up to `history_days` of one slug's series ending at `end_day`.
    pub fn load_daily_series(
        &self,
        geo: &str,
        slug: &str,
        end_day: NaiveDate,
        history_days: i64,
    ) -> Result<SparseSeries> {
        let conn = self.conn()?;
        let start_day = end_day - Duration::days(history_days);

        let mut stmt = conn.prepare(
            r#"
            SELECT day, interest
            FROM daily_interest
            WHERE geo = ? AND keyword_slug = ? AND day BETWEEN ? AND ?
            ORDER BY day ASC
            "#,
        )?;

        let mut series = SparseSeries::new();
        let rows = stmt.query_map(
            params![geo, slug, start_day.to_string(), end_day.to_string()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        )?;
        for row in rows {
            let (day_str, interest) = row?;
            if let Ok(day) = NaiveDate::parse_from_str(&day_str, "%Y-%m-%d") {
                series.insert(day, interest as f64);
            }
        }

        Ok(series)
    }

    /// Per-slug row counts and last days, for the status command.
    pub fn slug_status(&self, geo: &str) -> Result<Vec<SlugStatus>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT di.keyword_slug,
                   COUNT(*) AS rows,
                   MAX(di.day) AS last_day,
                   (SELECT MAX(f.day) FROM forecast f
                    WHERE f.geo = di.geo AND f.keyword_slug = di.keyword_slug) AS last_forecast
            FROM daily_interest di
            WHERE di.geo = ?
            GROUP BY di.keyword_slug
            ORDER BY di.keyword_slug ASC
            "#,
        )?;

        let statuses = stmt
            .query_map(params![geo], |row| {
                Ok(SlugStatus {
                    slug: row.get(0)?,
                    interest_rows: row.get::<_, i64>(1)? as usize,
                    last_interest_day: row
                        .get::<_, Option<String>>(2)?
                        .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
                    last_forecast_day: row
                        .get::<_, Option<String>>(3)?
                        .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(statuses)
    }
}
