//! mDNS/Bonjour-based bridge discovery.
//!
//! Browses for `_hue._tcp.local.` service advertisements. The service type
//! itself is the proof of bridge-ness, so resolved answers become records
//! without a follow-up HTTP probe. The browse short-circuits on the first
//! resolved bridge; the fast path only needs to know one exists.
//!
//! The daemon is created lazily and reused across discovery calls; it
//! spawns a background thread for mDNS operations.

use async_trait::async_trait;
use mdns_sd::{ResolvedService, ScopedIp, ServiceDaemon, ServiceEvent};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::traits::DiscoveryStrategy;
use super::types::{BridgeRecord, DiscoveryError, DiscoveryMethod, DEFAULT_BRIDGE_PORT};

/// Hue bridge mDNS service type (trailing dot is required by mdns-sd).
const HUE_SERVICE_TYPE: &str = "_hue._tcp.local.";

/// Configuration for mDNS discovery.
#[derive(Debug, Clone)]
pub struct MdnsConfig {
    /// How long to browse before giving up.
    pub browse_timeout: Duration,
}

impl Default for MdnsConfig {
    fn default() -> Self {
        Self {
            browse_timeout: Duration::from_millis(3000),
        }
    }
}

/// Discovers bridges by browsing for their mDNS service advertisement.
pub struct MdnsDiscovery {
    config: MdnsConfig,
    /// Lazily initialized daemon, reused across discovery calls.
    daemon: OnceLock<Arc<ServiceDaemon>>,
}

impl MdnsDiscovery {
    /// Creates an mDNS discovery strategy.
    pub fn new(config: MdnsConfig) -> Self {
        Self {
            config,
            daemon: OnceLock::new(),
        }
    }

    /// Gets or creates the mDNS daemon.
    fn get_daemon(&self) -> Result<&Arc<ServiceDaemon>, DiscoveryError> {
        if let Some(daemon) = self.daemon.get() {
            return Ok(daemon);
        }

        let daemon =
            ServiceDaemon::new().map_err(|e| DiscoveryError::MdnsDaemon(e.to_string()))?;

        // Another caller may have won the race; use whatever is in the cell.
        let _ = self.daemon.set(Arc::new(daemon));
        self.daemon.get().ok_or_else(|| {
            DiscoveryError::MdnsDaemon("failed to initialize mDNS daemon".to_string())
        })
    }

    async fn browse(&self, cancel: &CancellationToken) -> Result<Vec<BridgeRecord>, DiscoveryError> {
        let daemon = self.get_daemon()?;
        let receiver = daemon
            .browse(HUE_SERVICE_TYPE)
            .map_err(|e| DiscoveryError::MdnsDaemon(e.to_string()))?;

        let mut found: Vec<BridgeRecord> = Vec::new();
        let start = std::time::Instant::now();

        while start.elapsed() < self.config.browse_timeout {
            let remaining = self.config.browse_timeout.saturating_sub(start.elapsed());

            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = timeout(remaining, receiver.recv_async()) => event,
            };

            match event {
                Ok(Ok(ServiceEvent::ServiceResolved(info))) => {
                    log::trace!("[mDNS] Service resolved: {:?}", info.fullname);
                    if let Some(record) = parse_mdns_service(&info) {
                        log::debug!(
                            "[mDNS] Discovered bridge id={} ip={}",
                            record.normalized_id,
                            record.ip_address
                        );
                        found.push(record);
                        // First resolved bridge is enough for the fast path.
                        break;
                    }
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    log::debug!("[mDNS] Receiver channel closed: {:?}", e);
                    break;
                }
                Err(_) => break, // Browse window elapsed
            }
        }

        if let Err(e) = daemon.stop_browse(HUE_SERVICE_TYPE) {
            log::warn!("[mDNS] Failed to stop browse: {:?}", e);
        }

        Ok(found)
    }
}

#[async_trait]
impl DiscoveryStrategy for MdnsDiscovery {
    fn method(&self) -> DiscoveryMethod {
        DiscoveryMethod::Mdns
    }

    async fn discover(&self, cancel: &CancellationToken) -> Vec<BridgeRecord> {
        if cancel.is_cancelled() {
            return Vec::new();
        }
        match self.browse(cancel).await {
            Ok(found) => {
                log::debug!("[mDNS] Browse complete: {} bridge(s)", found.len());
                found
            }
            Err(e) => {
                log::warn!("[mDNS] Discovery degraded to empty: {}", e);
                Vec::new()
            }
        }
    }
}

/// Parses a resolved mDNS service into a bridge record.
///
/// The bridge id comes from the `bridgeid` TXT property when present, with
/// the advertised hostname as fallback (bridges publish their serial as the
/// host label). No id means no usable identity; skip the answer.
fn parse_mdns_service(info: &ResolvedService) -> Option<BridgeRecord> {
    // Prefer IPv4 from resolved records; the local HTTP API lives there.
    let ip = info.addresses.iter().find_map(|addr| match addr {
        ScopedIp::V4(v4) => Some(v4.addr().to_string()),
        _ => None,
    })?;

    let id = txt_bridge_id(info).or_else(|| extract_id_from_host(&info.host))?;

    let port = if info.port > 0 {
        info.port
    } else {
        DEFAULT_BRIDGE_PORT
    };

    let name = instance_label(&info.fullname);

    Some(BridgeRecord::new(id, ip, port, name))
}

/// Reads the `bridgeid` TXT property, if advertised.
fn txt_bridge_id(info: &ResolvedService) -> Option<String> {
    info.txt_properties
        .get_property_val_str("bridgeid")
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
}

/// Extracts a bridge id from an advertised hostname.
///
/// Bridges publish hosts like `001788fffe23ab.local.` or
/// `ecb5fafffe102201-1.local.`; the leading label must be a plausible
/// hex serial.
fn extract_id_from_host(host: &str) -> Option<String> {
    let label = host.split('.').next()?;
    let label = label.split('-').next()?;
    if label.len() >= 12 && label.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(label.to_string())
    } else {
        None
    }
}

/// Human-readable label from the service instance name, e.g.
/// `Philips Hue - 23AB._hue._tcp.local.` -> `Philips Hue - 23AB`.
fn instance_label(fullname: &str) -> Option<String> {
    let label = fullname.strip_suffix(HUE_SERVICE_TYPE)?.trim_end_matches('.');
    if label.is_empty() {
        None
    } else {
        Some(label.to_string())
    }
}
