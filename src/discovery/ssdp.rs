//! SSDP-based bridge discovery.
//!
//! Sends an M-SEARCH multicast to 239.255.255.250:1900 on every usable
//! interface and collects unicast replies within a short window. Replies
//! carrying Hue markers (`hue-bridgeid` header or the `IpBridge` server
//! token) contribute a LOCATION URL; each unique LOCATION is then fetched
//! and run through the validator before a record is reported.
//!
//! The same socket is used for send AND receive since devices reply
//! unicast back to the sending socket/port.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::traits::DiscoveryStrategy;
use super::types::{BridgeRecord, DiscoveryError, DiscoveryMethod, DEFAULT_BRIDGE_PORT};
use super::validator::{
    self, contains_ignore_ascii_case, starts_with_ignore_ascii_case, DescriptorKind,
};
use crate::net::{get_interfaces, InterfaceInfo};

/// Standard SSDP multicast address and port (protocol specification).
const MULTICAST_ADDR: &str = "239.255.255.250:1900";

/// Search target; bridges answer root-device searches.
const SEARCH_TARGET: &str = "upnp:rootdevice";

/// Consecutive recv failures tolerated per socket before abandoning it.
/// An interface going down mid-window fails every recv immediately;
/// retrying without a cap would spin for the rest of the window.
const MAX_CONSECUTIVE_RECV_ERRORS: u32 = 3;

/// Pause before retrying after a recv failure.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Build the M-SEARCH message.
fn build_msearch_message(mx: u64) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: 239.255.255.250:1900\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {}\r\n\
         ST: {}\r\n\r\n",
        mx, SEARCH_TARGET
    )
}

/// Configuration for SSDP discovery.
#[derive(Debug, Clone)]
pub struct SsdpConfig {
    /// Number of M-SEARCH packets to send per interface.
    pub send_count: u64,
    /// Delay between M-SEARCH retries.
    pub retry_delay: Duration,
    /// Reply collection window.
    pub discovery_timeout: Duration,
    /// MX value (max response delay in seconds).
    pub mx_value: u64,
    /// Timeout for fetching each LOCATION descriptor.
    pub fetch_timeout: Duration,
    /// Maximum concurrent descriptor fetches.
    pub max_concurrent_fetches: usize,
}

impl Default for SsdpConfig {
    fn default() -> Self {
        Self {
            send_count: 3,
            retry_delay: Duration::from_millis(800),
            discovery_timeout: Duration::from_secs(4),
            mx_value: 1,
            fetch_timeout: Duration::from_secs(3),
            max_concurrent_fetches: 4,
        }
    }
}

/// Creates a UDP socket bound to a specific interface.
///
/// SO_REUSEADDR (and SO_REUSEPORT on Unix) allow rapid restarts; the
/// multicast TTL of 4 follows the UPnP 1.0 recommendation.
fn create_socket(iface_ip: Ipv4Addr) -> Result<UdpSocket, DiscoveryError> {
    let bind_addr = SocketAddr::new(IpAddr::V4(iface_ip), 0);

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(DiscoveryError::SocketBind)?;

    if let Err(e) = socket.set_reuse_address(true) {
        log::warn!("Failed to set SO_REUSEADDR on {}: {}", iface_ip, e);
    }

    #[cfg(unix)]
    if let Err(e) = socket.set_reuse_port(true) {
        log::warn!("Failed to set SO_REUSEPORT on {}: {}", iface_ip, e);
    }

    if let Err(e) = socket.set_multicast_ttl_v4(4) {
        log::warn!("Failed to set multicast TTL on {}: {}", iface_ip, e);
    }

    socket
        .set_nonblocking(true)
        .map_err(DiscoveryError::SocketBind)?;

    socket
        .bind(&bind_addr.into())
        .map_err(DiscoveryError::SocketBind)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).map_err(DiscoveryError::SocketBind)
}

/// Parses an SSDP reply, returning its LOCATION URL when the reply looks
/// like a Hue Bridge.
///
/// Bridges mark their replies with a `hue-bridgeid` header and an
/// `IpBridge` token in the SERVER header; anything without either marker
/// is some other UPnP device and is not worth a descriptor fetch.
fn parse_ssdp_reply(response: &str) -> Option<String> {
    if !contains_ignore_ascii_case(response, "hue-bridgeid")
        && !contains_ignore_ascii_case(response, "ipbridge")
    {
        return None;
    }

    // Find colon index to preserve the URL's own colons.
    response
        .lines()
        .find(|l| starts_with_ignore_ascii_case(l, "location:"))
        .and_then(|l| l.find(':').map(|idx| l[idx + 1..].trim().to_string()))
        .filter(|loc| !loc.is_empty())
}

/// Discovers bridges through SSDP multicast search.
pub struct SsdpDiscovery {
    client: Client,
    config: SsdpConfig,
}

impl SsdpDiscovery {
    /// Creates an SSDP discovery strategy sharing the coordinator's client.
    pub fn new(client: Client, config: SsdpConfig) -> Self {
        Self { client, config }
    }

    /// Runs the multicast search and collects unique LOCATION URLs.
    async fn collect_locations(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, DiscoveryError> {
        let interfaces = get_interfaces();
        if interfaces.is_empty() {
            return Err(DiscoveryError::NoInterfaces);
        }

        let msg = build_msearch_message(self.config.mx_value);

        let mut sockets: Vec<(InterfaceInfo, Arc<UdpSocket>)> = Vec::new();
        for iface in &interfaces {
            match create_socket(iface.ip) {
                Ok(socket) => sockets.push((iface.clone(), Arc::new(socket))),
                Err(e) => {
                    log::warn!(
                        "[SSDP] Failed to create socket for {} ({}): {}",
                        iface.name,
                        iface.ip,
                        e
                    );
                }
            }
        }
        if sockets.is_empty() {
            return Err(DiscoveryError::NoInterfaces);
        }

        log::debug!(
            "[SSDP] Searching on {} interface(s), {} sends with {}ms spacing",
            sockets.len(),
            self.config.send_count,
            self.config.retry_delay.as_millis()
        );

        let locations: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));

        let send_futures: Vec<_> = sockets
            .iter()
            .map(|(iface, socket)| {
                let socket = Arc::clone(socket);
                let iface = iface.clone();
                let msg = msg.as_bytes().to_vec();
                let send_count = self.config.send_count;
                let retry_delay = self.config.retry_delay;

                async move {
                    for i in 0..send_count {
                        if i > 0 {
                            tokio::time::sleep(retry_delay).await;
                        }
                        if let Err(e) = socket.send_to(&msg, MULTICAST_ADDR).await {
                            log::warn!(
                                "[SSDP] Failed to send M-SEARCH on {} (attempt {}): {}",
                                iface.name,
                                i + 1,
                                e
                            );
                        }
                    }
                }
            })
            .collect();

        let recv_futures: Vec<_> = sockets
            .iter()
            .map(|(iface, socket)| {
                let socket = Arc::clone(socket);
                let iface_name = iface.name.clone();
                let locations = Arc::clone(&locations);
                let window = self.config.discovery_timeout;

                async move {
                    let mut buf = [0u8; 2048];
                    let mut consecutive_errors = 0u32;
                    let start = std::time::Instant::now();

                    while start.elapsed() < window {
                        let remaining = window.saturating_sub(start.elapsed());
                        match timeout(remaining, socket.recv_from(&mut buf)).await {
                            Ok(Ok((amt, src))) => {
                                consecutive_errors = 0;
                                let response = String::from_utf8_lossy(&buf[..amt]);
                                if let Some(location) = parse_ssdp_reply(&response) {
                                    log::debug!(
                                        "[SSDP] Bridge reply from {} via {}: {}",
                                        src.ip(),
                                        iface_name,
                                        location
                                    );
                                    locations.lock().await.insert(location);
                                }
                            }
                            Ok(Err(e)) => {
                                consecutive_errors += 1;
                                log::warn!("[SSDP] Socket recv error on {}: {}", iface_name, e);
                                if consecutive_errors >= MAX_CONSECUTIVE_RECV_ERRORS {
                                    log::warn!(
                                        "[SSDP] Abandoning {} after {} consecutive recv errors",
                                        iface_name,
                                        consecutive_errors
                                    );
                                    break;
                                }
                                tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                            }
                            Err(_) => break, // Window elapsed
                        }
                    }
                }
            })
            .collect();

        let collect = async {
            let (_, _) = tokio::join!(
                futures::future::join_all(send_futures),
                futures::future::join_all(recv_futures)
            );
        };
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = collect => {}
        }

        let locations = std::mem::take(&mut *locations.lock().await);
        Ok(locations.into_iter().collect())
    }

    /// Fetches one LOCATION descriptor and validates it.
    async fn validate_location(&self, location: &str) -> Option<BridgeRecord> {
        let url = reqwest::Url::parse(location).ok()?;
        let ip = url.host_str()?.to_string();
        let port = url.port_or_known_default().unwrap_or(DEFAULT_BRIDGE_PORT);

        let response = self
            .client
            .get(url)
            .timeout(self.config.fetch_timeout)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body = response.text().await.ok()?;

        let identity = validator::validate(&body, DescriptorKind::Xml)?;
        Some(BridgeRecord::new(identity.id, ip, port, identity.name))
    }
}

#[async_trait]
impl DiscoveryStrategy for SsdpDiscovery {
    fn method(&self) -> DiscoveryMethod {
        DiscoveryMethod::Ssdp
    }

    async fn discover(&self, cancel: &CancellationToken) -> Vec<BridgeRecord> {
        if cancel.is_cancelled() {
            return Vec::new();
        }

        let locations = match self.collect_locations(cancel).await {
            Ok(locations) => locations,
            Err(e) => {
                log::warn!("[SSDP] Discovery degraded to empty: {}", e);
                return Vec::new();
            }
        };

        if locations.is_empty() {
            log::debug!("[SSDP] No bridge replies within window");
            return Vec::new();
        }

        let found: Vec<BridgeRecord> = stream::iter(locations)
            .map(|location| async move {
                if cancel.is_cancelled() {
                    return None;
                }
                self.validate_location(&location).await
            })
            .buffer_unordered(self.config.max_concurrent_fetches.max(1))
            .filter_map(|record| async move { record })
            .collect()
            .await;

        log::debug!("[SSDP] Search complete: {} validated bridge(s)", found.len());
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_msearch_message() {
        let msg = build_msearch_message(1);
        assert!(msg.contains("M-SEARCH * HTTP/1.1"));
        assert!(msg.contains("HOST: 239.255.255.250:1900"));
        assert!(msg.contains("MX: 1"));
        assert!(msg.contains("ST: upnp:rootdevice"));
    }

    #[test]
    fn test_parse_ssdp_reply_valid() {
        let response = "HTTP/1.1 200 OK\r\n\
                        CACHE-CONTROL: max-age=100\r\n\
                        LOCATION: http://192.168.1.7:80/description.xml\r\n\
                        SERVER: Linux/3.14.0 UPnP/1.0 IpBridge/1.26.0\r\n\
                        hue-bridgeid: 001788FFFE23AB\r\n\
                        ST: upnp:rootdevice\r\n\r\n";
        assert_eq!(
            parse_ssdp_reply(response),
            Some("http://192.168.1.7:80/description.xml".to_string())
        );
    }

    #[test]
    fn test_parse_ssdp_reply_case_insensitive_headers() {
        let response = "HTTP/1.1 200 OK\r\n\
                        location: http://192.168.1.7/description.xml\r\n\
                        server: Linux UPnP/1.0 IPBRIDGE/1.26.0\r\n\r\n";
        assert_eq!(
            parse_ssdp_reply(response),
            Some("http://192.168.1.7/description.xml".to_string())
        );
    }

    #[test]
    fn test_parse_ssdp_reply_non_hue_filtered() {
        let response = "HTTP/1.1 200 OK\r\n\
                        LOCATION: http://192.168.1.20:49153/setup.xml\r\n\
                        SERVER: Unspecified, UPnP/1.0, Unspecified\r\n\
                        USN: uuid:Socket-1_0-221234K01::upnp:rootdevice\r\n\r\n";
        assert_eq!(parse_ssdp_reply(response), None);
    }

    #[test]
    fn test_recv_error_budget_fits_reply_window() {
        // A dead socket must give up well before the window would end it.
        let worst_case = RECV_ERROR_BACKOFF * (MAX_CONSECUTIVE_RECV_ERRORS - 1);
        assert!(worst_case < SsdpConfig::default().discovery_timeout);
    }

    #[test]
    fn test_parse_ssdp_reply_requires_location() {
        let response = "HTTP/1.1 200 OK\r\n\
                        SERVER: Linux UPnP/1.0 IpBridge/1.26.0\r\n\r\n";
        assert_eq!(parse_ssdp_reply(response), None);
    }
}
