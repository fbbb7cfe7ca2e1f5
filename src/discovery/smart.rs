//! Subnet-derived ("smart") bridge discovery.
//!
//! Instead of a fixed address list, candidates come from the machine's own
//! network configuration: for each usable interface the gateway-adjacent
//! span of its /24 is probed. Faster and better targeted than the blind
//! scan on networks that don't use the common home subnets.

use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

use super::probe::{self, ProbeConfig};
use super::traits::DiscoveryStrategy;
use super::types::{BridgeRecord, DiscoveryMethod};
use crate::net::{get_interfaces, InterfaceInfo};

/// Configuration for subnet-derived scanning.
#[derive(Debug, Clone)]
pub struct SmartConfig {
    /// How many host addresses to probe per interface subnet, starting
    /// just past the assumed gateway (`.1`).
    pub hosts_per_subnet: u8,
    /// Probe behavior (per-request timeout, concurrency).
    pub probe: ProbeConfig,
}

impl Default for SmartConfig {
    fn default() -> Self {
        Self {
            hosts_per_subnet: 16,
            probe: ProbeConfig::default(),
        }
    }
}

/// Derives candidate addresses from the interface list.
///
/// Assumes a /24 per interface (the actual netmask is not portably
/// available), skips the gateway (`.1`) and the interface's own address,
/// and dedups subnets shared by several interfaces.
fn derive_candidates(interfaces: &[InterfaceInfo], hosts_per_subnet: u8) -> Vec<String> {
    let mut seen_subnets: HashSet<[u8; 3]> = HashSet::new();
    let own_ips: HashSet<String> = interfaces.iter().map(|i| i.ip.to_string()).collect();
    let mut candidates = Vec::new();

    for iface in interfaces {
        let octets = iface.ip.octets();
        let subnet = [octets[0], octets[1], octets[2]];
        if !seen_subnets.insert(subnet) {
            continue;
        }

        let last = 1u8.saturating_add(hosts_per_subnet);
        for host in 2..=last {
            let candidate = format!("{}.{}.{}.{}", subnet[0], subnet[1], subnet[2], host);
            if !own_ips.contains(&candidate) {
                candidates.push(candidate);
            }
        }
    }

    candidates
}

/// Discovers bridges by probing addresses derived from local subnets.
pub struct SmartDiscovery {
    client: Client,
    config: SmartConfig,
}

impl SmartDiscovery {
    /// Creates a smart-scan strategy sharing the coordinator's client.
    pub fn new(client: Client, config: SmartConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl DiscoveryStrategy for SmartDiscovery {
    fn method(&self) -> DiscoveryMethod {
        DiscoveryMethod::Smart
    }

    async fn discover(&self, cancel: &CancellationToken) -> Vec<BridgeRecord> {
        let interfaces = get_interfaces();
        if interfaces.is_empty() {
            log::warn!("[Smart] No usable interfaces; nothing to scan");
            return Vec::new();
        }

        let candidates = derive_candidates(&interfaces, self.config.hosts_per_subnet);
        log::debug!(
            "[Smart] Probing {} candidate(s) across {} interface(s)",
            candidates.len(),
            interfaces.len()
        );

        let found = probe::sweep(&self.client, &self.config.probe, candidates, cancel).await;
        log::debug!("[Smart] Sweep complete: {} bridge(s)", found.len());
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn iface(name: &str, ip: [u8; 4]) -> InterfaceInfo {
        InterfaceInfo {
            name: name.to_string(),
            ip: Ipv4Addr::new(ip[0], ip[1], ip[2], ip[3]),
        }
    }

    #[test]
    fn test_derive_candidates_spans_subnet() {
        let candidates = derive_candidates(&[iface("eth0", [192, 168, 50, 30])], 4);
        assert_eq!(
            candidates,
            vec![
                "192.168.50.2",
                "192.168.50.3",
                "192.168.50.4",
                "192.168.50.5",
            ]
        );
    }

    #[test]
    fn test_derive_candidates_skips_own_address() {
        let candidates = derive_candidates(&[iface("eth0", [10, 1, 1, 3])], 4);
        assert!(!candidates.contains(&"10.1.1.3".to_string()));
        assert!(candidates.contains(&"10.1.1.2".to_string()));
    }

    #[test]
    fn test_derive_candidates_dedups_shared_subnet() {
        let interfaces = [
            iface("eth0", [192, 168, 1, 10]),
            iface("wlan0", [192, 168, 1, 11]),
        ];
        let candidates = derive_candidates(&interfaces, 8);
        assert_eq!(candidates.len(), 8);
    }

    #[test]
    fn test_derive_candidates_bounded() {
        let candidates = derive_candidates(&[iface("eth0", [172, 16, 0, 40])], 16);
        assert_eq!(candidates.len(), 16);
        assert_eq!(candidates.last().unwrap(), "172.16.0.17");
    }
}
