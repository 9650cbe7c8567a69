//! Keyword registry operations

use rusqlite::params;
use serde::Deserialize;

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{slugify, Keyword, KeywordGroup};

/// One row of a registry seed file.
#[derive(Debug, Deserialize)]
struct KeywordCsvRow {
    keyword: String,
    group_name: String,
    geo: String,
    #[serde(default)]
    category: u32,
    #[serde(default)]
    is_anchor: bool,
}

impl Database {
    /// Upsert a keyword by its natural key (keyword, geo, category).
    ///
    /// Re-adding a deactivated keyword reactivates it.
    pub fn upsert_keyword(
        &self,
        keyword: &str,
        group_name: &str,
        geo: &str,
        category: u32,
        is_anchor: bool,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO trend_keywords (keyword, group_name, geo, category, is_active, is_anchor)
            VALUES (?, ?, ?, ?, 1, ?)
            ON CONFLICT(keyword, geo, category) DO UPDATE SET
                group_name = excluded.group_name,
                is_anchor = excluded.is_anchor,
                is_active = 1
            "#,
            params![keyword, group_name, geo, category, is_anchor],
        )?;

        let id = conn.query_row(
            "SELECT id FROM trend_keywords WHERE keyword = ? AND geo = ? AND category = ?",
            params![keyword, geo, category],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Deactivate a keyword; returns false when no such row exists.
    pub fn deactivate_keyword(&self, keyword: &str, geo: &str, category: u32) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE trend_keywords SET is_active = 0 WHERE keyword = ? AND geo = ? AND category = ?",
            params![keyword, geo, category],
        )?;
        Ok(changed > 0)
    }

    /// List registry rows, optionally restricted to one geo.
    pub fn list_keywords(&self, geo: Option<&str>) -> Result<Vec<Keyword>> {
        let conn = self.conn()?;

        let (query, params_vec): (String, Vec<Box<dyn rusqlite::ToSql>>) = match geo {
            Some(g) => (
                r#"
                SELECT id, keyword, group_name, geo, category, is_active, is_anchor, created_at
                FROM trend_keywords
                WHERE geo = ?
                ORDER BY group_name ASC, is_anchor DESC, keyword ASC
                "#
                .to_string(),
                vec![Box::new(g.to_string())],
            ),
            None => (
                r#"
                SELECT id, keyword, group_name, geo, category, is_active, is_anchor, created_at
                FROM trend_keywords
                ORDER BY geo ASC, group_name ASC, is_anchor DESC, keyword ASC
                "#
                .to_string(),
                vec![],
            ),
        };

        let mut stmt = conn.prepare(&query)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let keywords = stmt
            .query_map(params_refs.as_slice(), |row| {
                let created_at_str: String = row.get(7)?;
                Ok(Keyword {
                    id: row.get(0)?,
                    keyword: row.get(1)?,
                    group_name: row.get(2)?,
                    geo: row.get(3)?,
                    category: row.get(4)?,
                    is_active: row.get(5)?,
                    is_anchor: row.get(6)?,
                    created_at: parse_datetime(&created_at_str),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(keywords)
    }

    /// Load the active synonym groups for one geo/category, anchor-first.
    ///
    /// Group order follows the first appearance of each slug, so the first
    /// group's anchor term doubles as the run-wide anchor.
    pub fn load_active_groups(&self, geo: &str, category: u32) -> Result<Vec<KeywordGroup>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT keyword, group_name
            FROM trend_keywords
            WHERE is_active = 1 AND geo = ? AND category = ?
            ORDER BY is_anchor DESC, keyword ASC
            "#,
        )?;

        let rows = stmt
            .query_map(params![geo, category], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut groups: Vec<KeywordGroup> = Vec::new();
        for (keyword, group_name) in rows {
            let slug = slugify(&group_name);
            if slug.is_empty() {
                continue;
            }
            match groups.iter_mut().find(|g| g.slug == slug) {
                Some(group) => group.terms.push(keyword),
                None => groups.push(KeywordGroup {
                    slug,
                    name: group_name,
                    geo: geo.to_string(),
                    category,
                    terms: vec![keyword],
                }),
            }
        }

        Ok(groups)
    }

    /// The distinct active slugs for one geo, across categories.
    pub fn load_active_slugs(&self, geo: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT DISTINCT group_name FROM trend_keywords WHERE is_active = 1 AND geo = ?",
        )?;
        let names = stmt
            .query_map(params![geo], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut slugs: Vec<String> = names
            .iter()
            .map(|n| slugify(n))
            .filter(|s| !s.is_empty())
            .collect();
        slugs.sort();
        slugs.dedup();
        Ok(slugs)
    }

    /// Seed the registry from CSV with columns
    /// `keyword,group_name,geo,category,is_anchor`. Returns rows upserted.
    pub fn import_keywords_csv<R: std::io::Read>(&self, reader: R) -> Result<usize> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut imported = 0;

        for record in csv_reader.deserialize() {
            let row: KeywordCsvRow = record?;
            self.upsert_keyword(
                &row.keyword,
                &row.group_name,
                &row.geo,
                row.category,
                row.is_anchor,
            )?;
            imported += 1;
        }

        Ok(imported)
    }
}
