//! Run configuration
//!
//! A flat set of named options supplied externally: defaults below, each
//! overridable through `SURGE_*` environment variables, and a handful again
//! through CLI flags. The two scheduled entry points share one [`Settings`]
//! value constructed once per invocation.

use std::time::Duration;

use crate::error::{Error, Result};

/// Interest-index provider access.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// Provider endpoint. Required for ingestion; absent means the run
    /// aborts before any work.
    pub endpoint: Option<String>,
    /// Optional bearer credential for the provider.
    pub token: Option<String>,
    /// Candidate egress proxies, probed once per run.
    pub proxies: Vec<String>,
    /// Bounded connect timeout for provider and probe calls.
    pub connect_timeout: Duration,
    /// Bounded read timeout for provider calls.
    pub request_timeout: Duration,
    /// Provider-imposed ceiling on terms per call.
    pub max_terms_per_call: usize,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            token: None,
            proxies: Vec::new(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_terms_per_call: 5,
        }
    }
}

/// Ingestion run shape: horizons, windowing, and retry behavior.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub geo: String,
    pub category: u32,
    /// Full backfill horizon for brand-new slugs.
    pub days_back: i64,
    /// Re-fetch window past a known slug's last day, for scale correction.
    pub overlap_days: i64,
    /// Fetch window span in days; clamped to the total horizon.
    pub window_span_days: i64,
    /// Step between window starts; span - step is the stitching overlap.
    pub window_step_days: i64,
    /// First retry delay.
    pub backoff_base: Duration,
    /// Multiplier applied per attempt.
    pub backoff_factor: f64,
    pub backoff_max: Duration,
    pub max_attempts: u32,
    /// Jitter fraction applied to each delay, in [0, 1].
    pub jitter: f64,
    /// Remaining-time budget for the whole run; None means unbounded.
    pub max_runtime: Option<Duration>,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            geo: "SG".to_string(),
            category: 0,
            days_back: 365,
            overlap_days: 120,
            window_span_days: 90,
            window_step_days: 60, // 30-day overlap between windows
            backoff_base: Duration::from_millis(1200),
            backoff_factor: 2.0,
            backoff_max: Duration::from_secs(60),
            max_attempts: 7,
            jitter: 0.25,
            max_runtime: None,
        }
    }
}

/// Forecasting model shape.
#[derive(Debug, Clone)]
pub struct ForecastSettings {
    /// Lookback for training.
    pub history_days: i64,
    /// Forecast horizon.
    pub horizon_days: i64,
    /// Minimal usable history; shorter slugs are skipped.
    pub min_train_days: usize,
    /// Held-out tail for the hyperparameter search.
    pub val_days: usize,
    /// Ridge penalty candidates for the regression stage.
    pub ridge_alphas: Vec<f64>,
    /// Fixed ridge penalty for the zero-vs-nonzero gate.
    pub gate_alpha: f64,
    /// Lower bound on the gate decision threshold.
    pub tau_floor: f64,
    /// Neighborhood multipliers swept around the selected threshold.
    pub tau_neighbor_factors: Vec<f64>,
    /// Gain of the zero-run adjustment on the dynamic threshold.
    pub dyn_tau_gain: f64,
    /// Damp near-threshold predictions instead of switching binarily.
    pub soft_gate: bool,
    pub huber_delta: f64,
    pub huber_iters: usize,
    /// Cap on the trailing zero-run feature.
    pub zero_run_cap: f64,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            history_days: 420,
            horizon_days: 7,
            min_train_days: 120,
            val_days: 14, // validation scores at most 7 of them
            ridge_alphas: vec![0.01, 0.05, 0.1, 0.3, 1.0, 3.0, 10.0, 30.0, 100.0],
            gate_alpha: 0.5,
            tau_floor: 0.25,
            tau_neighbor_factors: vec![0.7, 0.85, 1.0, 1.15, 1.3],
            dyn_tau_gain: 0.30,
            soft_gate: true,
            huber_delta: 5.0,
            huber_iters: 6,
            zero_run_cap: 30.0,
        }
    }
}

/// Notification gateway access.
#[derive(Debug, Clone, Default)]
pub struct NotifySettings {
    /// Webhook URL for trends.updated events; None disables notification.
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub source: SourceSettings,
    pub ingest: IngestSettings,
    pub forecast: ForecastSettings,
    pub notify: NotifySettings,
}

impl Settings {
    /// Defaults overridden by `SURGE_*` environment variables.
    pub fn from_env() -> Self {
        let mut s = Self::default();

        s.source.endpoint = env_string("SURGE_SOURCE_URL");
        s.source.token = env_string("SURGE_SOURCE_TOKEN");
        if let Some(proxies) = env_string("SURGE_PROXIES") {
            s.source.proxies = proxies
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(n) = env_parse::<usize>("SURGE_MAX_TERMS_PER_CALL") {
            s.source.max_terms_per_call = n.max(1);
        }

        if let Some(geo) = env_string("SURGE_GEO") {
            s.ingest.geo = geo;
        }
        if let Some(cat) = env_parse::<u32>("SURGE_CATEGORY") {
            s.ingest.category = cat;
        }
        if let Some(days) = env_parse::<i64>("SURGE_DAYS_BACK") {
            s.ingest.days_back = days.max(1);
        }
        if let Some(days) = env_parse::<i64>("SURGE_OVERLAP_DAYS") {
            s.ingest.overlap_days = days.max(0);
        }
        if let Some(ms) = env_parse::<u64>("SURGE_BACKOFF_BASE_MS") {
            s.ingest.backoff_base = Duration::from_millis(ms);
        }
        if let Some(attempts) = env_parse::<u32>("SURGE_MAX_ATTEMPTS") {
            s.ingest.max_attempts = attempts.max(1);
        }
        if let Some(secs) = env_parse::<u64>("SURGE_MAX_RUNTIME_SECS") {
            s.ingest.max_runtime = Some(Duration::from_secs(secs));
        }

        if let Some(days) = env_parse::<i64>("SURGE_HISTORY_DAYS") {
            s.forecast.history_days = days.max(1);
        }
        if let Some(days) = env_parse::<i64>("SURGE_FORECAST_DAYS") {
            s.forecast.horizon_days = days.max(1);
        }
        if let Some(days) = env_parse::<usize>("SURGE_MIN_TRAIN_DAYS") {
            s.forecast.min_train_days = days;
        }
        if let Some(alphas) = env_string("SURGE_RIDGE_ALPHAS") {
            // Zeros are clamped to a tiny epsilon so the sweep never runs an
            // unregularized solve.
            let parsed: Vec<f64> = alphas
                .split(',')
                .filter_map(|a| a.trim().parse::<f64>().ok())
                .map(|a| a.max(1e-6))
                .collect();
            if !parsed.is_empty() {
                s.forecast.ridge_alphas = parsed;
            }
        }

        s.notify.webhook_url = env_string("SURGE_NOTIFY_URL");

        s
    }

    /// The provider endpoint, or the fatal configuration error.
    pub fn require_source_endpoint(&self) -> Result<&str> {
        self.source.endpoint.as_deref().ok_or_else(|| {
            Error::Config(
                "interest source endpoint missing: set SURGE_SOURCE_URL".to_string(),
            )
        })
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
