//! Surge CLI - keyword interest ingestion and forecasting
//!
//! Usage:
//!   surge init                     Initialize database
//!   surge keywords add "sunscreen" --group "Sun Care" --anchor
//!   surge ingest                   Fetch + stitch + upsert daily interest
//!   surge forecast                 Train per-slug models, upsert forecasts
//!   surge status                   Per-slug ingestion/forecast bookkeeping

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db),
        Commands::Ingest {
            geo,
            category,
            days_back,
            end,
        } => {
            commands::cmd_ingest(
                &cli.db,
                geo.as_deref(),
                category,
                days_back,
                end.as_deref(),
            )
            .await
        }
        Commands::Forecast { geo, horizon, end } => {
            commands::cmd_forecast(&cli.db, geo.as_deref(), horizon, end.as_deref()).await
        }
        Commands::Status { geo } => commands::cmd_status(&cli.db, geo.as_deref()),
        Commands::Keywords { action } => {
            let db = commands::open_db(&cli.db)?;
            match action {
                None | Some(KeywordsAction::List { geo: None }) => {
                    commands::cmd_keywords_list(&db, None)
                }
                Some(KeywordsAction::List { geo }) => {
                    commands::cmd_keywords_list(&db, geo.as_deref())
                }
                Some(KeywordsAction::Add {
                    keyword,
                    group,
                    geo,
                    category,
                    anchor,
                }) => commands::cmd_keywords_add(&db, &keyword, &group, &geo, category, anchor),
                Some(KeywordsAction::Deactivate {
                    keyword,
                    geo,
                    category,
                }) => commands::cmd_keywords_deactivate(&db, &keyword, &geo, category),
                Some(KeywordsAction::Import { file }) => commands::cmd_keywords_import(&db, &file),
            }
        }
    }
}
