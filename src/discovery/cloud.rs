//! Cloud-registry bridge discovery.
//!
//! Bridges phone home to the vendor portal, which exposes the bridges seen
//! from the caller's public IP at a well-known endpoint. The response comes
//! from the vendor's own registry, so records are trusted as-is with no
//! local HTTP validation.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::traits::DiscoveryStrategy;
use super::types::{
    BridgeRecord, DiscoveryError, DiscoveryMethod, DiscoveryResult, DEFAULT_BRIDGE_PORT,
};

/// Well-known vendor discovery endpoint.
pub const CLOUD_DISCOVERY_URL: &str = "https://discovery.meethue.com";

/// Configuration for cloud discovery.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// Discovery endpoint URL.
    pub endpoint: String,
    /// Timeout for the single outbound request.
    pub request_timeout: Duration,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            endpoint: CLOUD_DISCOVERY_URL.to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// One entry in the registry response.
#[derive(Debug, Deserialize)]
struct CloudBridgeEntry {
    id: String,
    internalipaddress: String,
    port: Option<u16>,
}

/// Decodes the registry response body into bridge records.
fn parse_cloud_response(body: &str) -> DiscoveryResult<Vec<BridgeRecord>> {
    let entries: Vec<CloudBridgeEntry> = serde_json::from_str(body)?;
    Ok(entries
        .into_iter()
        .filter(|entry| !entry.id.trim().is_empty() && !entry.internalipaddress.trim().is_empty())
        .map(|entry| {
            BridgeRecord::new(
                entry.id.trim(),
                entry.internalipaddress.trim(),
                entry.port.unwrap_or(DEFAULT_BRIDGE_PORT),
                None,
            )
        })
        .collect())
}

/// Discovers bridges through the vendor cloud registry.
pub struct CloudDiscovery {
    client: Client,
    config: CloudConfig,
}

impl CloudDiscovery {
    /// Creates a cloud discovery strategy sharing the coordinator's client.
    pub fn new(client: Client, config: CloudConfig) -> Self {
        Self { client, config }
    }

    async fn try_discover(&self) -> DiscoveryResult<Vec<BridgeRecord>> {
        let response = self
            .client
            .get(&self.config.endpoint)
            .timeout(self.config.request_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DiscoveryError::CloudStatus(response.status().as_u16()));
        }

        let body = response.text().await?;
        parse_cloud_response(&body)
    }
}

#[async_trait]
impl DiscoveryStrategy for CloudDiscovery {
    fn method(&self) -> DiscoveryMethod {
        DiscoveryMethod::Cloud
    }

    async fn discover(&self, cancel: &CancellationToken) -> Vec<BridgeRecord> {
        if cancel.is_cancelled() {
            return Vec::new();
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return Vec::new(),
            result = self.try_discover() => result,
        };

        match result {
            Ok(bridges) => {
                log::debug!("[Cloud] Registry listed {} bridge(s)", bridges.len());
                bridges
            }
            Err(e) => {
                log::warn!("[Cloud] Discovery degraded to empty: {}", e);
                Vec::new()
            }
        }
    }
}
