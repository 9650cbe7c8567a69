//! Notification gateway
//!
//! After a run writes new rows it announces the touched slugs so downstream
//! consumers can re-fetch. Delivery is strictly best-effort: a dead webhook
//! must never fail a run that already persisted good data.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::NotifySettings;
use crate::error::{Error, Result};

/// Which scheduled run produced the update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    Interest,
    Forecast,
}

/// The trends.updated event payload. Kept small: consumers re-fetch the
/// series themselves.
#[derive(Debug, Clone, Serialize)]
pub struct TrendsUpdated {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub geo: String,
    pub kind: UpdateKind,
    pub slugs: Vec<String>,
    pub horizon: i64,
    pub ts: DateTime<Utc>,
}

impl TrendsUpdated {
    pub fn new(geo: &str, kind: UpdateKind, mut slugs: Vec<String>, horizon: i64) -> Self {
        slugs.sort();
        slugs.dedup();
        Self {
            event_type: "trends.updated",
            geo: geo.to_string(),
            kind,
            slugs,
            horizon,
            ts: Utc::now(),
        }
    }
}

#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn publish(&self, event: &TrendsUpdated) -> Result<()>;
}

/// POSTs events to a configured webhook.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl NotificationGateway for WebhookNotifier {
    async fn publish(&self, event: &TrendsUpdated) -> Result<()> {
        let response = self.client.post(&self.url).json(event).send().await?;
        if !response.status().is_success() {
            return Err(Error::InvalidData(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        debug!(
            "published trends.updated kind={:?} slugs={}",
            event.kind,
            event.slugs.len()
        );
        Ok(())
    }
}

/// Used when no webhook is configured.
pub struct NoopNotifier;

#[async_trait]
impl NotificationGateway for NoopNotifier {
    async fn publish(&self, _event: &TrendsUpdated) -> Result<()> {
        Ok(())
    }
}

/// Build the gateway the settings call for.
pub fn from_settings(settings: &NotifySettings) -> Result<Arc<dyn NotificationGateway>> {
    match &settings.webhook_url {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(url)?)),
        None => Ok(Arc::new(NoopNotifier)),
    }
}

/// Publish and swallow: failures are logged, never propagated.
pub async fn notify_best_effort(gateway: &dyn NotificationGateway, event: &TrendsUpdated) {
    if event.slugs.is_empty() {
        return;
    }
    if let Err(e) = gateway.publish(event).await {
        warn!("trends.updated push failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingNotifier;

    #[async_trait]
    impl NotificationGateway for FailingNotifier {
        async fn publish(&self, _event: &TrendsUpdated) -> Result<()> {
            Err(Error::InvalidData("gateway down".to_string()))
        }
    }

    #[test]
    fn test_event_shape() {
        let event = TrendsUpdated::new(
            "SG",
            UpdateKind::Interest,
            vec!["b".to_string(), "a".to_string(), "b".to_string()],
            365,
        );

        // Slugs come out sorted and deduped.
        assert_eq!(event.slugs, vec!["a", "b"]);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "trends.updated");
        assert_eq!(json["kind"], "interest");
        assert_eq!(json["geo"], "SG");
        assert_eq!(json["horizon"], 365);
    }

    #[tokio::test]
    async fn test_best_effort_swallows_failures() {
        let event = TrendsUpdated::new("SG", UpdateKind::Forecast, vec!["a".to_string()], 7);
        // Must not panic or propagate.
        notify_best_effort(&FailingNotifier, &event).await;
    }

    #[tokio::test]
    async fn test_best_effort_skips_empty_events() {
        let event = TrendsUpdated::new("SG", UpdateKind::Forecast, vec![], 7);
        // FailingNotifier would error if called; empty events short-circuit.
        notify_best_effort(&FailingNotifier, &event).await;
    }

    #[test]
    fn test_from_settings() {
        let none = from_settings(&NotifySettings { webhook_url: None });
        assert!(none.is_ok());

        let some = from_settings(&NotifySettings {
            webhook_url: Some("http://hub.test/events".to_string()),
        });
        assert!(some.is_ok());
    }
}
