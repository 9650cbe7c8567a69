//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI
//! arguments. The actual command implementations are in the `commands`
//! module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Surge - keyword interest ingestion and forecasting
#[derive(Parser)]
#[command(name = "surge")]
#[command(about = "Scheduled keyword-interest ingestion and forecasting jobs", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "surge.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Run the scheduled ingestion job: fetch, stitch, and upsert daily
    /// interest for every active keyword group
    Ingest {
        /// Geo code (overrides SURGE_GEO)
        #[arg(long)]
        geo: Option<String>,

        /// Provider category code (overrides SURGE_CATEGORY)
        #[arg(long)]
        category: Option<u32>,

        /// Backfill horizon in days for new slugs (overrides SURGE_DAYS_BACK)
        #[arg(long)]
        days_back: Option<i64>,

        /// Run end date YYYY-MM-DD (defaults to today)
        #[arg(long)]
        end: Option<String>,
    },

    /// Run the scheduled forecasting job: train the gated model per slug
    /// and upsert the horizon
    Forecast {
        /// Geo code (overrides SURGE_GEO)
        #[arg(long)]
        geo: Option<String>,

        /// Forecast horizon in days (overrides SURGE_FORECAST_DAYS)
        #[arg(long)]
        horizon: Option<i64>,

        /// Run end date YYYY-MM-DD (defaults to today)
        #[arg(long)]
        end: Option<String>,
    },

    /// Show per-slug ingestion and forecast status
    Status {
        /// Geo code (overrides SURGE_GEO)
        #[arg(long)]
        geo: Option<String>,
    },

    /// Manage the keyword registry
    Keywords {
        #[command(subcommand)]
        action: Option<KeywordsAction>,
    },
}

#[derive(Subcommand)]
pub enum KeywordsAction {
    /// List registry rows
    List {
        /// Restrict to one geo
        #[arg(long)]
        geo: Option<String>,
    },

    /// Add or reactivate a keyword
    Add {
        /// Raw search term
        keyword: String,

        /// Human-readable group name (slug is derived from it)
        #[arg(long)]
        group: String,

        /// Geo code
        #[arg(long, default_value = "SG")]
        geo: String,

        /// Provider category code
        #[arg(long, default_value = "0")]
        category: u32,

        /// Mark as the group's anchor term
        #[arg(long)]
        anchor: bool,
    },

    /// Deactivate a keyword (kept for history, excluded from runs)
    Deactivate {
        /// Raw search term
        keyword: String,

        /// Geo code
        #[arg(long, default_value = "SG")]
        geo: String,

        /// Provider category code
        #[arg(long, default_value = "0")]
        category: u32,
    },

    /// Import keywords from CSV (keyword,group_name,geo,category,is_anchor)
    Import {
        /// CSV file to import
        #[arg(short, long)]
        file: PathBuf,
    },
}
