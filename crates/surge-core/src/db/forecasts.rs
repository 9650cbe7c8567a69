//! Forecast row operations

use chrono::{Duration, NaiveDate, Utc};
use rusqlite::params;

use super::Database;
use crate::error::Result;

impl Database {
    /// Upsert one forecast row per day, starting at `start_next`.
    ///
    /// Values are rounded and clamped into [0, 100]; regeneration for the
    /// same days overwrites in place.
    pub fn upsert_forecasts(
        &self,
        geo: &str,
        slug: &str,
        start_next: NaiveDate,
        preds: &[f64],
    ) -> Result<usize> {
        if preds.is_empty() {
            return Ok(0);
        }

        let conn = self.conn()?;
        let generated_at = Utc::now().to_rfc3339();

        let mut stmt = conn.prepare(
            r#"
            INSERT INTO forecast (geo, keyword_slug, day, forecast, generated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(geo, keyword_slug, day) DO UPDATE SET
                forecast = excluded.forecast,
                generated_at = excluded.generated_at
            "#,
        )?;

        let mut rows = 0;
        for (i, pred) in preds.iter().enumerate() {
            let day = start_next + Duration::days(i as i64);
            let value = (pred.round() as i64).clamp(0, 100);
            stmt.execute(params![geo, slug, day.to_string(), value, generated_at])?;
            rows += 1;
        }

        Ok(rows)
    }

    /// Forecast rows for one slug, ordered by day.
    pub fn load_forecasts(&self, geo: &str, slug: &str) -> Result<Vec<(NaiveDate, i64)>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT day, forecast
            FROM forecast
            WHERE geo = ? AND keyword_slug = ?
            ORDER BY day ASC
            "#,
        )?;

        let mut out = Vec::new();
        let rows = stmt.query_map(params![geo, slug], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (day_str, value) = row?;
            if let Ok(day) = NaiveDate::parse_from_str(&day_str, "%Y-%m-%d") {
                out.push((day, value));
            }
        }

        Ok(out)
    }
}
