//! Multi-strategy Hue Bridge discovery.
//!
//! Combines cloud, mDNS, SSDP, and direct IP probing strategies for
//! reliable bridge detection across different network configurations.
//!
//! # Architecture
//!
//! ```text
//! DiscoveryCoordinator
//! ├── fast path (sequential, first non-empty wins)
//! │   ├── mDNS (_hue._tcp.local.)           [capability-gated]
//! │   └── cloud (discovery.meethue.com)
//! └── parallel fallback (raced, first non-empty wins)
//!     ├── smart scan (interface-derived candidates)
//!     ├── IP scan (fixed candidate list)
//!     └── SSDP (239.255.255.250:1900)       [config-gated]
//! ```
//!
//! # Session pipeline
//!
//! 1. Try fast-path strategies in strict priority order; the first
//!    non-empty batch completes the session.
//! 2. Otherwise launch the fallback strategies concurrently. The first
//!    non-empty batch completes the session and cancels the rest; if all
//!    report empty the session completes empty once the last one reports.
//! 3. A session deadline races stage 2; on expiry the session completes
//!    with whatever accumulated.
//! 4. Records are normalized and deduplicated (normalized id OR ip) at
//!    every accumulation point; completion is delivered exactly once.

pub mod cloud;
pub mod ip_scan;
pub mod mdns;
pub mod probe;
pub mod smart;
pub mod ssdp;
pub mod traits;
pub mod types;
pub mod validator;

pub use cloud::{CloudConfig, CloudDiscovery};
pub use ip_scan::{IpScanConfig, IpScanDiscovery};
pub use mdns::{MdnsConfig, MdnsDiscovery};
pub use probe::ProbeConfig;
pub use smart::{SmartConfig, SmartDiscovery};
pub use ssdp::{SsdpConfig, SsdpDiscovery};
pub use traits::DiscoveryStrategy;
pub use types::{
    normalize_bridge_id, BridgeRecord, DiscoveryError, DiscoveryMethod, DiscoveryResult,
    DEFAULT_BRIDGE_NAME, DEFAULT_BRIDGE_PORT,
};
pub use validator::{extract_identity, is_hue_descriptor, validate, BridgeIdentity, DescriptorKind};

use parking_lot::Mutex;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use types::ResultSet;

/// Configuration for the discovery coordinator.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Whether the platform supports mDNS browsing. Resolved once at
    /// startup; selects the fast-path strategy set.
    pub mdns_enabled: bool,
    /// Whether SSDP search joins the parallel fallback stage.
    pub ssdp_enabled: bool,
    /// Cloud registry configuration.
    pub cloud: CloudConfig,
    /// mDNS configuration.
    pub mdns: MdnsConfig,
    /// SSDP configuration.
    pub ssdp: SsdpConfig,
    /// Fixed-list IP scan configuration.
    pub ip_scan: IpScanConfig,
    /// Subnet-derived scan configuration.
    pub smart: SmartConfig,
    /// Session-wide deadline for the fallback stage.
    pub session_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            mdns_enabled: true,
            ssdp_enabled: true,
            cloud: CloudConfig::default(),
            mdns: MdnsConfig::default(),
            ssdp: SsdpConfig::default(),
            ip_scan: IpScanConfig::default(),
            smart: SmartConfig::default(),
            session_timeout: Duration::from_secs(40),
        }
    }
}

/// Coordinates the discovery strategies for one owner.
///
/// Construct one per application and share it via [`Arc`]; there is no
/// process-global instance. At most one session runs at a time:
/// [`discover_bridges`](Self::discover_bridges) rejects overlapping calls
/// with an immediate empty result, and
/// [`stop_discovery`](Self::stop_discovery) aborts the running session
/// from any task.
///
/// An empty result means "no bridge found", never an error; strategies
/// degrade all failures internally and log the reason.
pub struct DiscoveryCoordinator {
    config: DiscoveryConfig,
    fast_path: Vec<Arc<dyn DiscoveryStrategy>>,
    fallback: Vec<Arc<dyn DiscoveryStrategy>>,
    /// Cancellation handle of the running session, if any.
    session: Mutex<Option<CancellationToken>>,
}

impl DiscoveryCoordinator {
    /// Creates a coordinator with the given configuration.
    pub fn new(config: DiscoveryConfig) -> Self {
        let client = Client::builder().build().unwrap_or_else(|e| {
            log::warn!(
                "[Discovery] Failed to build HTTP client: {}. Using default.",
                e
            );
            Client::default()
        });

        let mut fast_path: Vec<Arc<dyn DiscoveryStrategy>> = Vec::new();
        if config.mdns_enabled {
            fast_path.push(Arc::new(MdnsDiscovery::new(config.mdns.clone())));
        }
        fast_path.push(Arc::new(CloudDiscovery::new(
            client.clone(),
            config.cloud.clone(),
        )));

        let mut fallback: Vec<Arc<dyn DiscoveryStrategy>> = vec![
            Arc::new(SmartDiscovery::new(client.clone(), config.smart.clone())),
            Arc::new(IpScanDiscovery::new(client.clone(), config.ip_scan.clone())),
        ];
        if config.ssdp_enabled {
            fallback.push(Arc::new(SsdpDiscovery::new(client, config.ssdp.clone())));
        }

        Self::with_strategies(config, fast_path, fallback)
    }

    /// Creates a coordinator with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(DiscoveryConfig::default())
    }

    /// Creates a coordinator over explicit strategy sets.
    ///
    /// Extension point for custom strategies; `new` is the usual entry.
    pub fn with_strategies(
        config: DiscoveryConfig,
        fast_path: Vec<Arc<dyn DiscoveryStrategy>>,
        fallback: Vec<Arc<dyn DiscoveryStrategy>>,
    ) -> Self {
        Self {
            config,
            fast_path,
            fallback,
            session: Mutex::new(None),
        }
    }

    /// Runs one discovery session and returns the deduplicated bridges.
    ///
    /// Completes exactly once per session: with the winning strategy's
    /// records, with whatever accumulated at the session deadline, or with
    /// an empty list after [`stop_discovery`](Self::stop_discovery).
    ///
    /// If a session is already running this returns an empty list
    /// immediately without disturbing it.
    pub async fn discover_bridges(&self) -> Vec<BridgeRecord> {
        let guard = {
            let mut session = self.session.lock();
            if session.is_some() {
                log::warn!("[Discovery] Session already running; rejecting call");
                return Vec::new();
            }
            let token = CancellationToken::new();
            *session = Some(token.clone());
            SessionGuard {
                coordinator: self,
                token,
            }
        };

        log::info!(
            "[Discovery] Session started ({} fast-path, {} fallback strategies)",
            self.fast_path.len(),
            self.fallback.len()
        );

        let results = tokio::select! {
            _ = guard.token.cancelled() => {
                log::info!("[Discovery] Session stopped");
                Vec::new()
            }
            results = self.run_session(&guard.token) => results,
        };

        log::info!("[Discovery] Session complete: {} bridge(s)", results.len());
        results
    }

    /// Callback-style variant of [`discover_bridges`](Self::discover_bridges).
    ///
    /// Returns immediately; `on_complete` fires exactly once on the
    /// runtime, with an empty list on rejection, stop, or nothing found.
    pub fn discover_bridges_with<F>(self: &Arc<Self>, on_complete: F)
    where
        F: FnOnce(Vec<BridgeRecord>) + Send + 'static,
    {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let results = coordinator.discover_bridges().await;
            on_complete(results);
        });
    }

    /// Cancels the running session, if any.
    ///
    /// The pending completion fires with an empty list and all in-flight
    /// network operations are aborted. No-op when idle; safe to call
    /// repeatedly.
    pub fn stop_discovery(&self) {
        if let Some(token) = self.session.lock().as_ref() {
            log::info!("[Discovery] Stop requested");
            token.cancel();
        } else {
            log::debug!("[Discovery] Stop requested while idle; ignoring");
        }
    }

    /// Fast path, then parallel fallback.
    async fn run_session(&self, cancel: &CancellationToken) -> Vec<BridgeRecord> {
        let deadline = tokio::time::Instant::now() + self.config.session_timeout;

        for strategy in &self.fast_path {
            if cancel.is_cancelled() {
                return Vec::new();
            }
            log::debug!("[Discovery] Fast path: trying {}", strategy.method());
            let found = strategy.discover(cancel).await;
            if !found.is_empty() {
                log::info!(
                    "[Discovery] Fast path: {} found {} bridge(s)",
                    strategy.method(),
                    found.len()
                );
                let mut set = ResultSet::new();
                set.merge(found);
                return set.finalize();
            }
        }

        if self.fallback.is_empty() {
            return Vec::new();
        }

        log::info!(
            "[Discovery] Fast path exhausted; launching {} fallback strategies",
            self.fallback.len()
        );
        self.run_parallel_fallback(cancel, deadline).await
    }

    /// Races the fallback strategies under the session deadline.
    ///
    /// Each strategy reports its batch through one channel; draining that
    /// channel here is the single mutual-exclusion point for accumulation
    /// and completion, so concurrent strategies cannot race the session
    /// state.
    async fn run_parallel_fallback(
        &self,
        cancel: &CancellationToken,
        deadline: tokio::time::Instant,
    ) -> Vec<BridgeRecord> {
        let child = cancel.child_token();
        let (tx, mut rx) =
            mpsc::channel::<(DiscoveryMethod, Vec<BridgeRecord>)>(self.fallback.len().max(1));

        for strategy in &self.fallback {
            let strategy = Arc::clone(strategy);
            let token = child.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let found = tokio::select! {
                    _ = token.cancelled() => Vec::new(),
                    found = strategy.discover(&token) => found,
                };
                let _ = tx.send((strategy.method(), found)).await;
            });
        }
        drop(tx);

        let expected = self.fallback.len();
        let mut completed = 0usize;
        let mut accumulated = ResultSet::new();

        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some((method, found))) => {
                    completed += 1;
                    let winner = !found.is_empty();
                    accumulated.merge(found);
                    if winner {
                        log::info!(
                            "[Discovery] Fallback: {} won the race with {} bridge(s)",
                            method,
                            accumulated.len()
                        );
                        break;
                    }
                    log::debug!(
                        "[Discovery] Fallback: {} reported empty ({}/{})",
                        method,
                        completed,
                        expected
                    );
                    if completed == expected {
                        log::info!("[Discovery] Fallback: all strategies reported empty");
                        break;
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    log::info!(
                        "[Discovery] Session deadline reached; completing with {} bridge(s)",
                        accumulated.len()
                    );
                    break;
                }
            }
        }

        child.cancel();
        accumulated.finalize()
    }
}

/// Releases the coordinator's session slot when the session ends.
///
/// Dropping sweeps in-flight strategy work and frees the slot, which also
/// covers the session future being dropped mid-poll (a caller racing
/// `discover_bridges` against its own timeout, for instance). Without this
/// an abandoned session would occupy the slot forever and every later call
/// would be rejected.
struct SessionGuard<'a> {
    coordinator: &'a DiscoveryCoordinator,
    token: CancellationToken,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.token.cancel();
        *self.coordinator.session.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn record(id: &str, ip: &str) -> BridgeRecord {
        BridgeRecord::new(id, ip, DEFAULT_BRIDGE_PORT, None)
    }

    /// Strategy that waits `delay`, then reports a fixed batch.
    /// Cancellation short-circuits to an empty batch.
    struct Scripted {
        method: DiscoveryMethod,
        delay: Duration,
        batch: Vec<BridgeRecord>,
        invoked: Arc<AtomicBool>,
    }

    impl Scripted {
        fn new(method: DiscoveryMethod, delay_ms: u64, batch: Vec<BridgeRecord>) -> Self {
            Self {
                method,
                delay: Duration::from_millis(delay_ms),
                batch,
                invoked: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait]
    impl DiscoveryStrategy for Scripted {
        fn method(&self) -> DiscoveryMethod {
            self.method
        }

        async fn discover(&self, cancel: &CancellationToken) -> Vec<BridgeRecord> {
            self.invoked.store(true, Ordering::SeqCst);
            tokio::select! {
                _ = cancel.cancelled() => Vec::new(),
                _ = tokio::time::sleep(self.delay) => self.batch.clone(),
            }
        }
    }

    /// Strategy that never completes until cancelled.
    struct Pending;

    #[async_trait]
    impl DiscoveryStrategy for Pending {
        fn method(&self) -> DiscoveryMethod {
            DiscoveryMethod::IpScan
        }

        async fn discover(&self, cancel: &CancellationToken) -> Vec<BridgeRecord> {
            cancel.cancelled().await;
            Vec::new()
        }
    }

    fn coordinator(
        fast_path: Vec<Arc<dyn DiscoveryStrategy>>,
        fallback: Vec<Arc<dyn DiscoveryStrategy>>,
    ) -> DiscoveryCoordinator {
        DiscoveryCoordinator::with_strategies(DiscoveryConfig::default(), fast_path, fallback)
    }

    #[tokio::test(start_paused = true)]
    async fn fast_path_short_circuits_before_fallback() {
        let cloud = Arc::new(Scripted::new(
            DiscoveryMethod::Cloud,
            10,
            vec![record("AABBCC", "192.168.1.7")],
        ));
        let scan = Arc::new(Scripted::new(
            DiscoveryMethod::IpScan,
            10,
            vec![record("DDEEFF", "192.168.1.8")],
        ));
        let scan_invoked = Arc::clone(&scan.invoked);

        let coordinator = coordinator(vec![cloud], vec![scan]);
        let results = coordinator.discover_bridges().await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].normalized_id, "AABBCC");
        assert!(!scan_invoked.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn fast_path_priority_order_is_strict() {
        let mdns = Arc::new(Scripted::new(
            DiscoveryMethod::Mdns,
            5,
            vec![record("001788FFFE", "192.168.1.10")],
        ));
        let cloud = Arc::new(Scripted::new(DiscoveryMethod::Cloud, 5, vec![record("AABBCC", "192.168.1.7")]));
        let cloud_invoked = Arc::clone(&cloud.invoked);

        let coordinator = coordinator(vec![mdns, cloud], vec![]);
        let results = coordinator.discover_bridges().await;

        assert_eq!(results[0].normalized_id, "001788FFFE");
        assert!(!cloud_invoked.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_first_non_empty_wins_and_cancels_peer() {
        let fast = Arc::new(Scripted::new(
            DiscoveryMethod::Smart,
            1_000,
            vec![record("001788FFFE", "192.168.1.10")],
        ));
        let slow = Arc::new(Scripted::new(
            DiscoveryMethod::IpScan,
            3_600_000,
            vec![record("DDEEFF", "192.168.1.20")],
        ));

        let start = tokio::time::Instant::now();
        let coordinator = coordinator(vec![], vec![fast, slow]);
        let results = coordinator.discover_bridges().await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].normalized_id, "001788FFFE");
        // The slow strategy was cancelled, not awaited.
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_records_across_strategies_collapse() {
        // Fast path all empty; smart scan and IP scan find the same bridge
        // with different id casing.
        let cloud = Arc::new(Scripted::new(DiscoveryMethod::Cloud, 5, vec![]));
        let mdns = Arc::new(Scripted::new(DiscoveryMethod::Mdns, 5, vec![]));
        let smart = Arc::new(Scripted::new(
            DiscoveryMethod::Smart,
            10,
            vec![record("001788FFFE", "192.168.1.10")],
        ));
        let scan = Arc::new(Scripted::new(
            DiscoveryMethod::IpScan,
            10,
            vec![record("001788fffe", "192.168.1.10")],
        ));

        let coordinator = coordinator(vec![mdns, cloud], vec![smart, scan]);
        let results = coordinator.discover_bridges().await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].normalized_id, "001788FFFE");
        assert_eq!(results[0].id, "001788FFFE");
        assert_eq!(results[0].ip_address, "192.168.1.10");
    }

    #[tokio::test(start_paused = true)]
    async fn all_empty_completes_well_before_deadline() {
        let coordinator = coordinator(
            vec![Arc::new(Scripted::new(DiscoveryMethod::Cloud, 1_000, vec![]))],
            vec![
                Arc::new(Scripted::new(DiscoveryMethod::Smart, 2_000, vec![])),
                Arc::new(Scripted::new(DiscoveryMethod::IpScan, 3_000, vec![])),
            ],
        );

        let start = tokio::time::Instant::now();
        let results = coordinator.discover_bridges().await;

        assert!(results.is_empty());
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_fallback_strategies_hit_session_deadline() {
        let coordinator = coordinator(
            vec![],
            vec![
                Arc::new(Scripted::new(DiscoveryMethod::Smart, 3_600_000, vec![])),
                Arc::new(Scripted::new(DiscoveryMethod::IpScan, 3_600_000, vec![])),
            ],
        );

        let start = tokio::time::Instant::now();
        let results = coordinator.discover_bridges().await;

        assert!(results.is_empty());
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(40));
        assert!(elapsed < Duration::from_secs(41));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_session_is_rejected_with_empty_result() {
        let coordinator = Arc::new(coordinator(vec![], vec![Arc::new(Pending)]));

        let first = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.discover_bridges().await })
        };
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }

        let second = coordinator.discover_bridges().await;
        assert!(second.is_empty());

        coordinator.stop_discovery();
        let first = first.await.unwrap();
        assert!(first.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_mid_session_completes_empty() {
        let coordinator = Arc::new(coordinator(
            vec![],
            vec![Arc::new(Scripted::new(
                DiscoveryMethod::Smart,
                30_000,
                vec![record("AABBCC", "192.168.1.7")],
            ))],
        ));

        let session = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.discover_bridges().await })
        };
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }

        coordinator.stop_discovery();
        let results = session.await.unwrap();
        assert!(results.is_empty());

        // Idempotent, and a no-op once idle.
        coordinator.stop_discovery();
        coordinator.stop_discovery();
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_session_future_frees_the_slot() {
        let coordinator = Arc::new(coordinator(
            vec![Arc::new(Scripted::new(
                DiscoveryMethod::Cloud,
                50,
                vec![record("AABBCC", "192.168.1.7")],
            ))],
            vec![],
        ));

        // Abort drops the session future mid-poll, as a caller racing
        // discover_bridges against its own timeout would.
        let session = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.discover_bridges().await })
        };
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        session.abort();
        assert!(session.await.is_err());

        let results = coordinator.discover_bridges().await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn new_session_allowed_after_completion() {
        let coordinator = coordinator(
            vec![Arc::new(Scripted::new(
                DiscoveryMethod::Cloud,
                5,
                vec![record("AABBCC", "192.168.1.7")],
            ))],
            vec![],
        );

        let first = coordinator.discover_bridges().await;
        assert_eq!(first.len(), 1);
        let second = coordinator.discover_bridges().await;
        assert_eq!(second.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn callback_variant_delivers_exactly_once() {
        let coordinator = Arc::new(coordinator(
            vec![Arc::new(Scripted::new(
                DiscoveryMethod::Cloud,
                5,
                vec![record("ecb5fafffe10", "192.168.1.9")],
            ))],
            vec![],
        ));

        let (tx, rx) = tokio::sync::oneshot::channel();
        coordinator.discover_bridges_with(move |results| {
            let _ = tx.send(results);
        });

        let results = rx.await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "ECB5FAFFFE10");
    }
}
