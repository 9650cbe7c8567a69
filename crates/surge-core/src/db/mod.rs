//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `keywords` - Keyword registry (terms, groups, anchors)
//! - `interest` - Daily interest series, incremental bookkeeping
//! - `forecasts` - Forecast rows written by the forecasting run
//!
//! All writes are idempotent upserts keyed by the rows' natural keys, so a
//! run interrupted mid-loop leaves the store valid and the next scheduled
//! run resumes from the last persisted day.

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::error::Result;

mod forecasts;
mod interest;
mod keywords;

pub use interest::SlugStatus;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores CURRENT_TIMESTAMP as "YYYY-MM-DD HH:MM:SS"
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)))
        .unwrap_or_else(|_| Utc::now())
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Create a new database connection pool and run migrations
    pub fn new(path: &str) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throwaway database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because every
    /// pooled connection would otherwise see its own empty database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = format!(
            "{}/surge_test_{}_{}.db",
            std::env::temp_dir().display(),
            std::process::id(),
            id
        );

        // Remove any existing file
        let _ = std::fs::remove_file(&path);

        Self::new(&path)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- WAL mode: better concurrency, readers don't block writers
            PRAGMA journal_mode = WAL;

            -- Cache size: ~8MB (2000 pages * 4KB default page size)
            PRAGMA cache_size = 2000;

            -- Synchronous NORMAL: good balance of safety and performance
            PRAGMA synchronous = NORMAL;

            -- Store temp tables in memory (faster for complex queries)
            PRAGMA temp_store = MEMORY;

            -- Keyword registry (source of truth for tracked terms).
            -- The scheduled runs read only active rows for their geo/category;
            -- writes come from the operational CLI.
            CREATE TABLE IF NOT EXISTS trend_keywords (
                id INTEGER PRIMARY KEY,
                keyword TEXT NOT NULL,
                group_name TEXT NOT NULL,
                geo TEXT NOT NULL,
                category INTEGER NOT NULL DEFAULT 0,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                is_anchor BOOLEAN NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(keyword, geo, category)
            );

            CREATE INDEX IF NOT EXISTS idx_trend_keywords_active
                ON trend_keywords(geo, category, is_active);

            -- Daily interest per keyword group, natural key (day, geo, slug).
            -- is_partial marks days young enough that the provider may still
            -- revise them; a day older than yesterday is never partial.
            CREATE TABLE IF NOT EXISTS daily_interest (
                day DATE NOT NULL,
                geo TEXT NOT NULL,
                keyword_slug TEXT NOT NULL,
                keyword_raw TEXT NOT NULL,
                interest INTEGER NOT NULL CHECK (interest BETWEEN 0 AND 100),
                is_partial BOOLEAN NOT NULL DEFAULT 0,
                ingested_at DATETIME NOT NULL,
                PRIMARY KEY (day, geo, keyword_slug)
            );

            CREATE INDEX IF NOT EXISTS idx_daily_interest_slug
                ON daily_interest(geo, keyword_slug, day);

            -- Forecast rows, natural key (geo, slug, day). Regeneration
            -- overwrites via upsert.
            CREATE TABLE IF NOT EXISTS forecast (
                geo TEXT NOT NULL,
                keyword_slug TEXT NOT NULL,
                day DATE NOT NULL,
                forecast INTEGER NOT NULL CHECK (forecast BETWEEN 0 AND 100),
                generated_at DATETIME NOT NULL,
                PRIMARY KEY (geo, keyword_slug, day)
            );

            CREATE INDEX IF NOT EXISTS idx_forecast_slug
                ON forecast(geo, keyword_slug, day);
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}
