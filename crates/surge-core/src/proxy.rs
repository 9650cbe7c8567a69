//! Egress proxy pool
//!
//! The interest provider rate-limits by source address, so runs can be
//! pointed at a small pool of egress proxies. The pool is probed once per
//! invocation; the chosen exit stays sticky for the run to minimize
//! fingerprint churn, and rotation only happens when the transport itself
//! keeps failing.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use crate::error::Result;

/// Build a client, optionally routed through one proxy.
///
/// Timeouts are bounded: a retry attempt may block for seconds, never
/// indefinitely.
pub fn build_client(
    proxy: Option<&str>,
    connect_timeout: Duration,
    request_timeout: Duration,
) -> Result<Client> {
    let mut builder = Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(request_timeout);

    if let Some(url) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(url)?);
    }

    Ok(builder.build()?)
}

/// Probe candidate proxies against `probe_url` and return the healthy
/// subset, in the original order.
///
/// A proxy is healthy when the transport round-trips; the HTTP status does
/// not matter (a 405 from the provider still proves the exit works).
pub async fn probe_proxies(
    candidates: &[String],
    probe_url: &str,
    connect_timeout: Duration,
) -> Vec<String> {
    let mut healthy = Vec::new();

    for url in candidates {
        let client = match build_client(Some(url), connect_timeout, connect_timeout) {
            Ok(c) => c,
            Err(e) => {
                warn!("proxy {} rejected at build time: {}", url, e);
                continue;
            }
        };

        match client.get(probe_url).send().await {
            Ok(_) => {
                debug!("proxy {} healthy", url);
                healthy.push(url.clone());
            }
            Err(e) => {
                warn!("proxy {} failed health probe: {}", url, e);
            }
        }
    }

    healthy
}
