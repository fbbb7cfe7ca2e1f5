//! Trait abstraction over discovery strategies.
//!
//! The coordinator sequences and races strategies through this seam, which
//! also lets the coordinator's state machine be tested with scripted
//! strategies instead of live sockets.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::types::{BridgeRecord, DiscoveryMethod};

/// One discovery strategy (cloud, mDNS, SSDP, IP scan, smart scan).
///
/// The contract is total: `discover` always completes within the strategy's
/// own bounded window and always yields a (possibly empty) batch. Transport
/// and validation failures degrade to missing records with a logged reason;
/// they never surface to the coordinator.
///
/// Strategies must honor `cancel` promptly: check it before issuing each
/// new network operation and abandon in-flight work once it fires.
#[async_trait]
pub trait DiscoveryStrategy: Send + Sync {
    /// Which discovery method this strategy implements.
    fn method(&self) -> DiscoveryMethod;

    /// Runs the strategy to completion, returning every validated bridge.
    async fn discover(&self, cancel: &CancellationToken) -> Vec<BridgeRecord>;
}
