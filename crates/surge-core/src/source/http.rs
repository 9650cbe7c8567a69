//! HTTP client for the interest-index provider
//!
//! Speaks a small JSON protocol: one POST per window with the term batch,
//! geo, category, and date range; the response carries a day axis and one
//! value column per term. Throttling surfaces as `Error::Source` so the
//! stitcher's retry machinery can back off.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SourceSettings;
use crate::error::{Error, Result};
use crate::proxy;

use super::{InterestSource, TermFrame};

/// Provider client with a sticky, health-probed egress.
///
/// The proxy pool is probed once at construction; the first healthy exit is
/// reused for the whole run. `rotate_egress` advances to the next healthy
/// exit and rebuilds the client behind the lock.
pub struct HttpInterestSource {
    endpoint: String,
    token: Option<String>,
    connect_timeout: Duration,
    request_timeout: Duration,
    /// Healthy proxies in probe order; empty means direct egress.
    proxies: Vec<String>,
    state: RwLock<EgressState>,
}

struct EgressState {
    client: Client,
    proxy_idx: usize,
}

/// Request to the interest index
#[derive(Debug, Serialize)]
struct InterestRequest<'a> {
    terms: &'a [String],
    geo: &'a str,
    category: u32,
    start: NaiveDate,
    end: NaiveDate,
}

/// Response from the interest index
#[derive(Debug, Deserialize)]
struct InterestResponse {
    days: Vec<NaiveDate>,
    series: HashMap<String, Vec<f64>>,
}

impl HttpInterestSource {
    /// Build the client: resolve the endpoint, probe the proxy pool, and
    /// pick the sticky exit.
    pub async fn connect(settings: &SourceSettings) -> Result<Self> {
        let endpoint = settings
            .endpoint
            .clone()
            .ok_or_else(|| Error::Config("interest source endpoint missing".to_string()))?;

        let proxies = if settings.proxies.is_empty() {
            Vec::new()
        } else {
            let healthy =
                proxy::probe_proxies(&settings.proxies, &endpoint, settings.connect_timeout).await;
            if healthy.is_empty() {
                warn!(
                    "no healthy proxy out of {} candidates, using direct egress",
                    settings.proxies.len()
                );
            } else {
                info!("proxy pool: {}/{} healthy", healthy.len(), settings.proxies.len());
            }
            healthy
        };

        let client = proxy::build_client(
            proxies.first().map(String::as_str),
            settings.connect_timeout,
            settings.request_timeout,
        )?;

        Ok(Self {
            endpoint,
            token: settings.token.clone(),
            connect_timeout: settings.connect_timeout,
            request_timeout: settings.request_timeout,
            proxies,
            state: RwLock::new(EgressState {
                client,
                proxy_idx: 0,
            }),
        })
    }

    fn client(&self) -> Client {
        self.state
            .read()
            .map(|s| s.client.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().client.clone())
    }
}

#[async_trait]
impl InterestSource for HttpInterestSource {
    async fn fetch_interest(
        &self,
        terms: &[String],
        geo: &str,
        category: u32,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<TermFrame> {
        let request = InterestRequest {
            terms,
            geo,
            category,
            start,
            end,
        };

        let mut builder = self.client().post(&self.endpoint).json(&request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::Source("throttled (429)".to_string()));
        }
        if !status.is_success() {
            return Err(Error::Source(format!("provider returned {}", status)));
        }

        let body: InterestResponse = response.json().await?;
        debug!(
            "fetched {} days x {} terms for {}..{}",
            body.days.len(),
            body.series.len(),
            start,
            end
        );

        let mut frame = TermFrame::new();
        for (term, values) in body.series {
            for (day, value) in body.days.iter().zip(values) {
                // The provider occasionally pads the axis past the window;
                // keep only what was asked for.
                if *day < start || *day > end || !value.is_finite() {
                    continue;
                }
                frame.insert(&term, *day, value);
            }
        }
        Ok(frame)
    }

    async fn rotate_egress(&self) {
        if self.proxies.len() < 2 {
            return;
        }

        let mut state = match self.state.write() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        let next = (state.proxy_idx + 1) % self.proxies.len();

        match proxy::build_client(
            Some(&self.proxies[next]),
            self.connect_timeout,
            self.request_timeout,
        ) {
            Ok(client) => {
                info!("rotating egress to proxy #{}", next);
                state.client = client;
                state.proxy_idx = next;
            }
            Err(e) => warn!("failed to rotate egress: {}", e),
        }
    }
}
