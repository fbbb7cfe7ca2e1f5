//! Blind IP-scan bridge discovery.
//!
//! Probes a fixed list of router-adjacent addresses where consumer bridges
//! usually land (DHCP hands out the low addresses first on home subnets).
//! Slowest and least targeted strategy; it exists for networks where
//! multicast is blocked and the cloud registry has no record.

use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use super::probe::{self, ProbeConfig};
use super::traits::DiscoveryStrategy;
use super::types::{BridgeRecord, DiscoveryMethod};

/// Common router-adjacent ranges, as `(prefix, first_host, last_host)`.
const SCAN_RANGES: &[(&str, u8, u8)] = &[
    ("192.168.1.", 2, 5),
    ("192.168.0.", 2, 5),
    ("192.168.2.", 2, 5),
    ("10.0.0.", 2, 3),
    ("10.0.1.", 2, 3),
];

/// Configuration for blind IP scanning.
#[derive(Debug, Clone)]
pub struct IpScanConfig {
    /// Candidate addresses to probe.
    pub candidates: Vec<String>,
    /// Probe behavior (per-request timeout, concurrency).
    pub probe: ProbeConfig,
}

impl Default for IpScanConfig {
    fn default() -> Self {
        Self {
            candidates: default_candidates(),
            probe: ProbeConfig::default(),
        }
    }
}

/// Builds the default candidate list from [`SCAN_RANGES`].
pub fn default_candidates() -> Vec<String> {
    SCAN_RANGES
        .iter()
        .flat_map(|(prefix, first, last)| {
            (*first..=*last).map(move |host| format!("{}{}", prefix, host))
        })
        .collect()
}

/// Discovers bridges by probing a fixed candidate address list.
pub struct IpScanDiscovery {
    client: Client,
    config: IpScanConfig,
}

impl IpScanDiscovery {
    /// Creates an IP-scan strategy sharing the coordinator's client.
    pub fn new(client: Client, config: IpScanConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl DiscoveryStrategy for IpScanDiscovery {
    fn method(&self) -> DiscoveryMethod {
        DiscoveryMethod::IpScan
    }

    async fn discover(&self, cancel: &CancellationToken) -> Vec<BridgeRecord> {
        log::debug!(
            "[Scan] Probing {} fixed candidate(s)",
            self.config.candidates.len()
        );
        let found = probe::sweep(
            &self.client,
            &self.config.probe,
            self.config.candidates.clone(),
            cancel,
        )
        .await;
        log::debug!("[Scan] Sweep complete: {} bridge(s)", found.len());
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_candidates_cover_common_ranges() {
        let candidates = default_candidates();
        assert!(candidates.contains(&"192.168.1.2".to_string()));
        assert!(candidates.contains(&"192.168.1.5".to_string()));
        assert!(candidates.contains(&"192.168.0.2".to_string()));
        assert!(candidates.contains(&"10.0.0.2".to_string()));
        assert!(candidates.contains(&"10.0.0.3".to_string()));
        assert!(!candidates.contains(&"192.168.1.6".to_string()));
    }

    #[test]
    fn test_default_candidates_bounded() {
        // The blind scan stays small; the smart scan covers the rest.
        assert!(default_candidates().len() <= 32);
    }
}
