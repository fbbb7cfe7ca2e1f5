//! Hue Discovery - multi-strategy Philips Hue Bridge discovery engine.
//!
//! This crate locates Hue Bridges on the local network by racing several
//! independent strategies: the vendor cloud registry, mDNS service
//! browsing, SSDP multicast search, and direct IP probing (both a fixed
//! candidate list and candidates derived from the local subnet). A
//! coordinator sequences the cheap strategies first, falls back to the
//! concurrent scanning stage, deduplicates results by normalized bridge
//! id, and resolves to exactly one completion under a session deadline.
//!
//! # Modules
//!
//! - [`discovery`]: the coordinator, strategies, and validator
//! - [`net`]: local interface enumeration shared by SSDP and smart scan
//!
//! # Example
//!
//! ```no_run
//! use hue_discovery::{DiscoveryConfig, DiscoveryCoordinator};
//!
//! # async fn run() {
//! let coordinator = DiscoveryCoordinator::new(DiscoveryConfig::default());
//! let bridges = coordinator.discover_bridges().await;
//! for bridge in bridges {
//!     println!("{} at {}:{}", bridge.name, bridge.ip_address, bridge.port);
//! }
//! # }
//! ```
//!
//! Callers own the coordinator's lifetime; share it via `Arc` to call
//! `stop_discovery` from another task. An empty result always means
//! "no bridge found - check network", never a typed error.

#![warn(clippy::all)]

pub mod discovery;
pub mod net;

// Re-export commonly used types at the crate root
pub use discovery::{
    normalize_bridge_id, BridgeIdentity, BridgeRecord, CloudConfig, DescriptorKind,
    DiscoveryConfig, DiscoveryCoordinator, DiscoveryError, DiscoveryMethod, DiscoveryResult,
    DiscoveryStrategy, IpScanConfig, MdnsConfig, ProbeConfig, SmartConfig, SsdpConfig,
    DEFAULT_BRIDGE_NAME, DEFAULT_BRIDGE_PORT,
};
