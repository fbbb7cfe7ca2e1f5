//! Shared types for Hue Bridge discovery.
//!
//! This module contains types used across all discovery strategies (cloud,
//! mDNS, SSDP, IP scanning) and the coordinator that merges their results.

use serde::Serialize;
use thiserror::Error;

/// Default port for the bridge's local HTTP API.
pub const DEFAULT_BRIDGE_PORT: u16 = 80;

/// Display name used when a bridge does not report one.
pub const DEFAULT_BRIDGE_NAME: &str = "Philips Hue Bridge";

/// Discovery strategy identifier for tracking which strategy found each bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscoveryMethod {
    /// Vendor cloud registry (discovery.meethue.com).
    Cloud,
    /// mDNS/Bonjour via `_hue._tcp.local.`
    Mdns,
    /// SSDP multicast to 239.255.255.250:1900.
    Ssdp,
    /// Direct probing of a fixed candidate IP list.
    IpScan,
    /// Direct probing of candidates derived from local interface subnets.
    Smart,
}

impl std::fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cloud => write!(f, "cloud"),
            Self::Mdns => write!(f, "mDNS"),
            Self::Ssdp => write!(f, "SSDP"),
            Self::IpScan => write!(f, "IP scan"),
            Self::Smart => write!(f, "smart scan"),
        }
    }
}

/// Errors that can occur inside a discovery strategy.
///
/// These never cross the strategy -> coordinator boundary: every strategy's
/// public entry point is total and maps any of these to an empty result set
/// after logging. They exist so the degradation reason is precise in logs.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Failed to bind a UDP socket for SSDP.
    #[error("failed to bind UDP socket: {0}")]
    SocketBind(#[source] std::io::Error),

    /// No usable network interfaces found.
    #[error("no usable network interfaces found")]
    NoInterfaces,

    /// mDNS daemon error.
    #[error("mDNS daemon error: {0}")]
    MdnsDaemon(String),

    /// Cloud registry request failed.
    #[error("cloud discovery request failed: {0}")]
    CloudRequest(#[from] reqwest::Error),

    /// Cloud registry returned a non-success HTTP status.
    #[error("cloud discovery returned HTTP {0}")]
    CloudStatus(u16),

    /// Cloud registry response did not decode.
    #[error("cloud discovery response did not decode: {0}")]
    CloudDecode(#[from] serde_json::Error),
}

/// Convenient Result alias for discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Normalizes a bridge identifier to its canonical dedup form.
///
/// Bridge ids show up with inconsistent casing and `:` separators depending
/// on where they were read (mDNS TXT records, SSDP headers, config JSON,
/// UPnP serial numbers). The canonical form is uppercase with separators
/// stripped, and normalizing is idempotent:
///
/// ```
/// use hue_discovery::normalize_bridge_id;
///
/// assert_eq!(normalize_bridge_id("aa:bb:cc:11:22:33"), "AABBCC112233");
/// assert_eq!(normalize_bridge_id("AABBCC112233"), "AABBCC112233");
/// ```
pub fn normalize_bridge_id(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != ':')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// One discovered Hue Bridge.
///
/// Constructed by a strategy after successful validation and never mutated
/// afterwards, except that the coordinator overwrites `id` with
/// `normalized_id` when finalizing a session's results.
#[derive(Debug, Serialize, Clone)]
pub struct BridgeRecord {
    /// Identifier as extracted from the device (serial number or UUID tail).
    pub id: String,
    /// Canonical identifier: uppercase, `:` separators stripped. Dedup key.
    #[serde(rename = "normalizedId")]
    pub normalized_id: String,
    /// IPv4 address in dotted form. May change between scans (DHCP).
    #[serde(rename = "ipAddress")]
    pub ip_address: String,
    /// Local HTTP API port.
    pub port: u16,
    /// Human-readable label.
    pub name: String,
}

impl BridgeRecord {
    /// Creates a record from a raw identifier, deriving the canonical id.
    ///
    /// A missing name falls back to [`DEFAULT_BRIDGE_NAME`].
    pub fn new(id: impl Into<String>, ip_address: impl Into<String>, port: u16, name: Option<String>) -> Self {
        let id = id.into();
        let normalized_id = normalize_bridge_id(&id);
        Self {
            id,
            normalized_id,
            ip_address: ip_address.into(),
            port,
            name: name.unwrap_or_else(|| DEFAULT_BRIDGE_NAME.to_string()),
        }
    }
}

/// Accumulator that merges records under the session's dedup policy.
///
/// Two records naming the same bridge can disagree on casing and separators
/// (different strategies read the id from different places), and a bridge
/// that answered two probes shows up once per probe. A new record is
/// discarded when its normalized id OR its IP address matches an already
/// accepted record; first seen wins.
#[derive(Debug, Default)]
pub struct ResultSet {
    records: Vec<BridgeRecord>,
}

impl ResultSet {
    /// Creates an empty result set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no records have been accepted yet.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of accepted records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Offers one record; returns true if it was accepted as new.
    pub fn insert(&mut self, record: BridgeRecord) -> bool {
        let duplicate = self.records.iter().any(|existing| {
            existing.normalized_id == record.normalized_id
                || existing.ip_address == record.ip_address
        });
        if duplicate {
            log::trace!(
                "[Discovery] Dropping duplicate record id={} ip={}",
                record.normalized_id,
                record.ip_address
            );
            return false;
        }
        self.records.push(record);
        true
    }

    /// Merges a whole batch, applying the dedup policy per record.
    pub fn merge(&mut self, batch: Vec<BridgeRecord>) {
        for record in batch {
            self.insert(record);
        }
    }

    /// Consumes the set, overwriting each raw id with its canonical form
    /// and sorting by canonical id for stable output.
    pub fn finalize(mut self) -> Vec<BridgeRecord> {
        for record in &mut self.records {
            record.id = record.normalized_id.clone();
        }
        self.records.sort_by(|a, b| a.normalized_id.cmp(&b.normalized_id));
        self.records
    }
}
