//! # Connection System Bootstrap
//!
//! Builds every long-lived service of the resilience layer exactly once and
//! wires them together. Consumers hold the [`ConnectionSystem`] (or clones of
//! the `Arc`s it hands out) instead of reaching for global singletons.

use anyhow::Context;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use crate::backend::{BackendServices, LivenessQuery, SessionProvider};
use crate::cache::QueryCache;
use crate::config::{ConfigManager, SyncConfig};
use crate::constants::SHARED_BREAKER_NAME;
use crate::diagnostics::ConnectionDiagnostics;
use crate::error::Result;
use crate::events::{EventPublisher, PublishedEvent, Subscription};
use crate::health::HealthMonitor;
use crate::leader::{LeaderCoordinator, PeerBus};
use crate::orchestration::ConnectionOrchestrator;
use crate::realtime::ChannelManager;
use crate::resilience::{CircuitBreaker, PreflightGuard};
use crate::status::ConnectionStatusTracker;
use crate::visibility::VisibilityTracker;

pub struct ConnectionSystem {
    config: SyncConfig,
    publisher: EventPublisher,
    visibility: Arc<VisibilityTracker>,
    status: Arc<ConnectionStatusTracker>,
    leader: Arc<LeaderCoordinator>,
    channels: Arc<ChannelManager>,
    health: Arc<HealthMonitor>,
    breaker: Arc<CircuitBreaker>,
    guard: Arc<PreflightGuard>,
    orchestrator: Arc<ConnectionOrchestrator>,
    diagnostics: Arc<ConnectionDiagnostics>,
    _peer_health: Subscription,
    running: AtomicBool,
}

impl ConnectionSystem {
    /// Construct and wire every service. Nothing runs until [`Self::start`].
    pub fn bootstrap(
        config: SyncConfig,
        services: BackendServices,
        cache: Arc<dyn QueryCache>,
        bus: Arc<dyn PeerBus>,
    ) -> Result<Self> {
        config.validate()?;

        let publisher = EventPublisher::default();
        // Instances start foregrounded; the host reports visibility changes
        let visibility = VisibilityTracker::new(true);
        let status = ConnectionStatusTracker::new(
            config.status.disconnect_stabilization(),
            publisher.clone(),
        );
        let leader = LeaderCoordinator::new(config.leader.clone(), bus, Arc::clone(&visibility));
        let channels = ChannelManager::new(
            config.channels.clone(),
            Arc::clone(&status),
            publisher.clone(),
        );
        let health = HealthMonitor::new(
            config.health.clone(),
            services,
            Arc::clone(&visibility),
            Arc::clone(&leader),
            Arc::clone(&channels),
            publisher.clone(),
        );
        let breaker = Arc::new(CircuitBreaker::new(
            SHARED_BREAKER_NAME,
            config.circuit_breaker.to_resilience_config(),
            publisher.clone(),
        ));
        let guard = Arc::new(PreflightGuard::new(
            config.guard.clone(),
            Arc::clone(&breaker),
            Arc::clone(&health),
            Arc::clone(&channels),
        ));
        let orchestrator = ConnectionOrchestrator::new(
            config.orchestrator.clone(),
            config.cache.clone(),
            Arc::clone(&health),
            Arc::clone(&channels),
            cache,
            Arc::clone(&breaker),
            Arc::clone(&visibility),
            Arc::clone(&status),
            publisher.clone(),
        );
        let diagnostics = Arc::new(ConnectionDiagnostics::new(
            config.diagnostics.clone(),
            Arc::clone(&health),
            Arc::clone(&channels),
            Arc::clone(&breaker),
            Arc::clone(&orchestrator),
            Arc::clone(&leader),
            Arc::clone(&status),
        ));

        // Followers adopt the leader's verdict
        let follower_health = Arc::downgrade(&health);
        let peer_health = leader.on_peer_health(move |healthy| {
            if let Some(health) = follower_health.upgrade() {
                health.apply_peer_status(*healthy);
            }
        });

        info!(
            environment = %config.environment,
            instance_id = %leader.instance_id(),
            "🏗️ Connection system bootstrapped"
        );

        Ok(Self {
            config,
            publisher,
            visibility,
            status,
            leader,
            channels,
            health,
            breaker,
            guard,
            orchestrator,
            diagnostics,
            _peer_health: peer_health,
            running: AtomicBool::new(false),
        })
    }

    /// Load configuration from the environment, then bootstrap
    pub fn from_environment(
        services: BackendServices,
        cache: Arc<dyn QueryCache>,
        bus: Arc<dyn PeerBus>,
    ) -> anyhow::Result<Self> {
        let manager = ConfigManager::load().context("failed to load sync configuration")?;
        let system = Self::bootstrap(manager.config().clone(), services, cache, bus)
            .context("failed to bootstrap connection system")?;
        Ok(system)
    }

    /// Load configuration from the environment and probe reachability over
    /// HTTP against `backend.base_url`
    pub fn over_http(
        session: Arc<dyn SessionProvider>,
        liveness: Arc<dyn LivenessQuery>,
        cache: Arc<dyn QueryCache>,
        bus: Arc<dyn PeerBus>,
    ) -> anyhow::Result<Self> {
        let manager = ConfigManager::load().context("failed to load sync configuration")?;
        let config = manager.config().clone();
        let services = BackendServices::over_http(&config, session, liveness)
            .context("failed to build HTTP reachability probe")?;
        let system = Self::bootstrap(config, services, cache, bus)
            .context("failed to bootstrap connection system")?;
        Ok(system)
    }

    /// Start every background loop. Idempotent.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }

        self.leader.start();
        self.channels.start_health_scan();
        self.health.start();
        self.orchestrator.start();

        info!("🚀 Connection system started");
    }

    /// Stop every background loop in reverse start order
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        self.orchestrator.stop();
        self.health.stop();
        self.channels.stop_health_scan();
        self.leader.stop();

        info!("🛑 Connection system stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PublishedEvent> {
        self.publisher.subscribe()
    }

    pub fn visibility(&self) -> &Arc<VisibilityTracker> {
        &self.visibility
    }

    pub fn status(&self) -> &Arc<ConnectionStatusTracker> {
        &self.status
    }

    pub fn leader(&self) -> &Arc<LeaderCoordinator> {
        &self.leader
    }

    pub fn channels(&self) -> &Arc<ChannelManager> {
        &self.channels
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn guard(&self) -> &Arc<PreflightGuard> {
        &self.guard
    }

    pub fn orchestrator(&self) -> &Arc<ConnectionOrchestrator> {
        &self.orchestrator
    }

    pub fn diagnostics(&self) -> &Arc<ConnectionDiagnostics> {
        &self.diagnostics
    }
}

impl Drop for ConnectionSystem {
    fn drop(&mut self) {
        self.stop();
    }
}
