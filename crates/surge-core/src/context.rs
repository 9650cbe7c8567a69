//! Run-scoped context
//!
//! Everything a scheduled run needs (settings, database handle, provider
//! client with its sticky egress, notification gateway, and the optional
//! remaining-time budget) is constructed once per invocation and carried
//! explicitly. No hidden singletons: when the run ends, the context and its
//! probed proxy selection are discarded with it.

use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::notify::{self, NotificationGateway};
use crate::source::{HttpInterestSource, InterestSource};

pub struct RunContext {
    pub settings: Settings,
    pub db: Database,
    /// Present for ingestion runs; forecasting reads only the database.
    source: Option<Arc<dyn InterestSource>>,
    pub notifier: Arc<dyn NotificationGateway>,
    /// Hard stop for network work, derived from `max_runtime`.
    pub deadline: Option<Instant>,
}

impl RunContext {
    /// Context for an ingestion run: requires the provider endpoint, probes
    /// the proxy pool, and builds the sticky client.
    pub async fn for_ingest(db: Database, settings: Settings) -> Result<Self> {
        settings.require_source_endpoint()?;
        let source = HttpInterestSource::connect(&settings.source).await?;
        let notifier = notify::from_settings(&settings.notify)?;
        let deadline = settings.ingest.max_runtime.map(|budget| Instant::now() + budget);

        Ok(Self {
            settings,
            db,
            source: Some(Arc::new(source)),
            notifier,
            deadline,
        })
    }

    /// Context for a forecasting run: no provider access needed.
    pub fn for_forecast(db: Database, settings: Settings) -> Result<Self> {
        let notifier = notify::from_settings(&settings.notify)?;
        Ok(Self {
            settings,
            db,
            source: None,
            notifier,
            deadline: None,
        })
    }

    /// Context with an explicit source and notifier (tests).
    pub fn with_parts(
        db: Database,
        settings: Settings,
        source: Arc<dyn InterestSource>,
        notifier: Arc<dyn NotificationGateway>,
    ) -> Self {
        let deadline = settings.ingest.max_runtime.map(|budget| Instant::now() + budget);
        Self {
            settings,
            db,
            source: Some(source),
            notifier,
            deadline,
        }
    }

    /// The provider client, or the configuration error for a run that needs
    /// one but was built without it.
    pub fn source(&self) -> Result<&dyn InterestSource> {
        self.source
            .as_deref()
            .ok_or_else(|| Error::Config("this run was built without an interest source".to_string()))
    }
}
