//! TTL memoization of the facilitator health probe.
//!
//! Every 402 decision consults facilitator health first, so the probe result
//! is cached for a short window instead of hammering the facilitator's
//! health endpoint on every gated request.
//!
//! The cache is a lock-free snapshot: a verdict cell and a deadline cell,
//! both atomic, overwritten unconditionally by whichever probe finishes
//! last. Staleness within the TTL and a few redundant concurrent probes are
//! acceptable - health is advisory, not authoritative.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use denlabs_x402_types::config::HealthCheckConfig;

use crate::facilitator_client::FacilitatorClient;

/// Process-wide cache of the most recent facilitator health verdict.
#[derive(Debug)]
pub struct HealthCache {
    /// When false, [`HealthCache::check`] always reports healthy.
    enabled: bool,
    ttl: Duration,
    /// Zero point for deadline arithmetic.
    anchor: Instant,
    /// Most recent probe verdict.
    healthy: AtomicBool,
    /// Millis past `anchor` at which the verdict expires; 0 means no probe yet.
    expires_at_millis: AtomicU64,
}

impl HealthCache {
    /// How long a probe verdict stays fresh.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

    /// Creates a cache with the default TTL.
    pub fn new(config: &HealthCheckConfig) -> Self {
        Self::with_ttl(config, Self::DEFAULT_TTL)
    }

    /// Creates a cache with a custom TTL. A zero TTL disables memoization.
    pub fn with_ttl(config: &HealthCheckConfig, ttl: Duration) -> Self {
        Self {
            enabled: config.enabled,
            ttl,
            anchor: Instant::now(),
            healthy: AtomicBool::new(false),
            expires_at_millis: AtomicU64::new(0),
        }
    }

    /// Reports whether the facilitator is currently believed healthy.
    ///
    /// Disabled health-checking always reports healthy without probing.
    /// Otherwise a fresh cached verdict is returned as-is; on a miss, one
    /// bounded probe runs and its outcome overwrites the cache. Probe
    /// failure of any kind is unhealthy.
    pub async fn check(&self, facilitator: &FacilitatorClient) -> bool {
        if !self.enabled {
            return true;
        }
        if let Some(cached) = self.snapshot() {
            return cached;
        }
        let healthy = facilitator.health().await.unwrap_or(false);
        self.store(healthy);
        healthy
    }

    fn now_millis(&self) -> u64 {
        self.anchor.elapsed().as_millis() as u64
    }

    fn snapshot(&self) -> Option<bool> {
        let expires_at = self.expires_at_millis.load(Ordering::Acquire);
        if expires_at == 0 || self.now_millis() >= expires_at {
            return None;
        }
        Some(self.healthy.load(Ordering::Acquire))
    }

    fn store(&self, healthy: bool) {
        // Two independent cells: a racing probe may briefly pair one probe's
        // verdict with the other's deadline. Tolerated; last probe wins.
        self.healthy.store(healthy, Ordering::Release);
        self.expires_at_millis
            .store(self.now_millis() + self.ttl.as_millis() as u64, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn probing_config() -> HealthCheckConfig {
        HealthCheckConfig::default()
    }

    #[tokio::test]
    async fn memoizes_within_ttl() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let facilitator = FacilitatorClient::try_from(mock_server.uri()).unwrap();
        let cache = HealthCache::new(&probing_config());

        assert!(cache.check(&facilitator).await);
        assert!(cache.check(&facilitator).await);
    }

    #[tokio::test]
    async fn zero_ttl_probes_every_time() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&mock_server)
            .await;

        let facilitator = FacilitatorClient::try_from(mock_server.uri()).unwrap();
        let cache = HealthCache::with_ttl(&probing_config(), Duration::ZERO);

        assert!(cache.check(&facilitator).await);
        assert!(cache.check(&facilitator).await);
    }

    #[tokio::test]
    async fn non_200_and_transport_failures_are_unhealthy() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let facilitator = FacilitatorClient::try_from(mock_server.uri()).unwrap();
        let cache = HealthCache::with_ttl(&probing_config(), Duration::ZERO);
        assert!(!cache.check(&facilitator).await);

        // Unroutable facilitator
        let unreachable = FacilitatorClient::try_from("http://127.0.0.1:1")
            .unwrap()
            .with_health_timeout(Duration::from_millis(200));
        assert!(!cache.check(&unreachable).await);
    }

    #[tokio::test]
    async fn disabled_probing_always_reports_healthy() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&mock_server)
            .await;

        let facilitator = FacilitatorClient::try_from(mock_server.uri()).unwrap();
        let config = HealthCheckConfig {
            enabled: false,
            ..HealthCheckConfig::default()
        };
        let cache = HealthCache::new(&config);
        assert!(cache.check(&facilitator).await);
    }
}
