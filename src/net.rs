//! Local network interface enumeration for discovery.
//!
//! Shared by SSDP (one multicast socket per interface) and smart scanning
//! (candidate IPs derived from each interface's subnet).

use local_ip_address::list_afinet_netifas;
use std::net::{IpAddr, Ipv4Addr};

/// Virtual interface prefixes to filter out during discovery.
pub const VIRTUAL_INTERFACE_PREFIXES: &[&str] = &[
    "lo", "docker", "veth", "br-", "virbr", "vmnet", "vbox", "tun", "tap",
];

/// Checks if an interface name belongs to a virtual/container interface.
pub fn is_virtual_interface(name: &str) -> bool {
    let name_lower = name.to_lowercase();
    VIRTUAL_INTERFACE_PREFIXES
        .iter()
        .any(|prefix| name_lower.starts_with(prefix))
}

/// Network interface information for discovery.
#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    /// Interface name (e.g., "en0", "eth0").
    pub name: String,
    /// IPv4 address bound to this interface.
    pub ip: Ipv4Addr,
}

/// Gets all usable network interfaces for discovery.
///
/// Filters out virtual/container interfaces and loopback.
pub fn get_interfaces() -> Vec<InterfaceInfo> {
    list_afinet_netifas()
        .unwrap_or_else(|e| {
            log::warn!("Failed to list network interfaces: {}", e);
            Vec::new()
        })
        .into_iter()
        .filter_map(|(name, addr)| {
            if is_virtual_interface(&name) {
                log::debug!("Skipping virtual interface: {}", name);
                return None;
            }
            match addr {
                IpAddr::V4(ipv4) if !ipv4.is_loopback() => {
                    log::debug!("Using interface {} ({})", name, ipv4);
                    Some(InterfaceInfo { name, ip: ipv4 })
                }
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_virtual_interface() {
        assert!(is_virtual_interface("lo"));
        assert!(is_virtual_interface("docker0"));
        assert!(is_virtual_interface("veth1234"));
        assert!(is_virtual_interface("br-abc"));
        assert!(!is_virtual_interface("eth0"));
        assert!(!is_virtual_interface("en0"));
        assert!(!is_virtual_interface("wlan0"));
    }
}
