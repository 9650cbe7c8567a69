//! Surge Core Library
//!
//! Shared functionality for the Surge keyword-interest pipeline:
//! - Keyword registry, daily interest, and forecast persistence
//! - Rate-limited interest-index client with retry, backoff, and a
//!   health-probed sticky egress proxy
//! - Window stitching: overlapping fetches rescaled onto one continuous
//!   per-term daily series
//! - Incremental fetch planning from previously persisted days
//! - Synonym-group aggregation (pointwise maximum)
//! - Two-stage gated forecaster (zero gate + Huber ridge on logit scale)
//!   with hyperparameter search and recursive multi-step prediction
//! - Best-effort trends.updated notifications

pub mod aggregate;
pub mod backoff;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod forecast;
pub mod ingest;
pub mod models;
pub mod notify;
pub mod planner;
pub mod proxy;
pub mod series;
pub mod source;
pub mod stitch;

pub use config::{ForecastSettings, IngestSettings, NotifySettings, Settings, SourceSettings};
pub use context::RunContext;
pub use db::Database;
pub use error::{Error, Result};
pub use forecast::{run_forecast, TrainedModel};
pub use ingest::run_ingest;
pub use models::{
    slugify, ForecastReport, IngestReport, Keyword, KeywordGroup, SkippedWindow, SlugSkip,
};
pub use notify::{NoopNotifier, NotificationGateway, TrendsUpdated, UpdateKind, WebhookNotifier};
pub use series::{DailySeries, SparseSeries};
pub use source::{HttpInterestSource, InterestSource, MockInterestSource, TermFrame};
pub use stitch::StitchOutcome;
