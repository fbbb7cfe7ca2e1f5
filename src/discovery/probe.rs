//! Direct HTTP probing of candidate hosts.
//!
//! Each candidate gets two probes in flight at once: the JSON config at
//! `/api/0/config` and the UPnP description at `/description.xml`. Either
//! body validating is sufficient. One probe's transport error (timeout,
//! refused, unreachable) only costs that probe; the candidate and the
//! containing sweep carry on.

use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::types::{BridgeRecord, DEFAULT_BRIDGE_PORT};
use super::validator::{self, DescriptorKind};

/// Configuration for direct host probes.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Per-request timeout. Candidates that are not bridges usually just
    /// drop the SYN, so this bounds how long a dead address costs.
    pub request_timeout: Duration,
    /// Maximum candidates probed concurrently during a sweep.
    pub max_concurrent: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(3),
            max_concurrent: 8,
        }
    }
}

/// Probe URLs for one candidate address.
fn probe_urls(ip: &str) -> (String, String) {
    (
        format!("http://{}/api/0/config", ip),
        format!("http://{}/description.xml", ip),
    )
}

/// Fetches one probe body, degrading any failure to `None`.
async fn fetch_body(client: &Client, url: &str, request_timeout: Duration) -> Option<String> {
    let response = match client.get(url).timeout(request_timeout).send().await {
        Ok(r) => r,
        Err(e) => {
            log::trace!("[Probe] {} unreachable: {}", url, e);
            return None;
        }
    };
    if !response.status().is_success() {
        log::trace!("[Probe] {} returned HTTP {}", url, response.status());
        return None;
    }
    response.text().await.ok()
}

/// Probes one candidate, returning a record if it validates as a bridge.
///
/// Issues both probes concurrently; the JSON config wins when both
/// validate (it carries the authoritative `bridgeid`). Aborts early when
/// `cancel` fires.
pub(crate) async fn probe_host(
    client: &Client,
    config: &ProbeConfig,
    ip: &str,
    cancel: &CancellationToken,
) -> Option<BridgeRecord> {
    if cancel.is_cancelled() {
        return None;
    }

    let (config_url, description_url) = probe_urls(ip);

    let probe = async {
        let (json_body, xml_body) = tokio::join!(
            fetch_body(client, &config_url, config.request_timeout),
            fetch_body(client, &description_url, config.request_timeout),
        );

        json_body
            .as_deref()
            .and_then(|body| validator::validate(body, DescriptorKind::Json))
            .or_else(|| {
                xml_body
                    .as_deref()
                    .and_then(|body| validator::validate(body, DescriptorKind::Xml))
            })
    };

    let identity = tokio::select! {
        _ = cancel.cancelled() => return None,
        identity = probe => identity?,
    };

    log::debug!("[Probe] {} validated as bridge id={}", ip, identity.id);
    Some(BridgeRecord::new(
        identity.id,
        ip,
        DEFAULT_BRIDGE_PORT,
        identity.name,
    ))
}

/// Probes a whole candidate list with bounded concurrency.
///
/// Cancellation is checked before each probe is issued, so an external
/// abort stops the sweep after at most the in-flight requests.
pub(crate) async fn sweep(
    client: &Client,
    config: &ProbeConfig,
    candidates: Vec<String>,
    cancel: &CancellationToken,
) -> Vec<BridgeRecord> {
    stream::iter(candidates)
        .map(|ip| async move { probe_host(client, config, &ip, cancel).await })
        .buffer_unordered(config.max_concurrent.max(1))
        .filter_map(|found| async move { found })
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_urls() {
        let (config_url, description_url) = probe_urls("192.168.1.4");
        assert_eq!(config_url, "http://192.168.1.4/api/0/config");
        assert_eq!(description_url, "http://192.168.1.4/description.xml");
    }

    #[tokio::test]
    async fn test_probe_host_skips_when_cancelled() {
        let client = Client::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let found = probe_host(&client, &ProbeConfig::default(), "192.0.2.1", &cancel).await;
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_sweep_of_nothing_is_empty() {
        let client = Client::new();
        let cancel = CancellationToken::new();
        let found = sweep(&client, &ProbeConfig::default(), Vec::new(), &cancel).await;
        assert!(found.is_empty());
    }
}
