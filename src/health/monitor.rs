//! Health monitor service.
//!
//! A probe runs three steps in order: a reachability GET (a few attempts
//! with a short fixed backoff), a session validity check (shorter bound in
//! the foreground than in the background, renewing the session when it is
//! close to expiry) and a single-row liveness read.
//!
//! Only the elected leader (or a foreground fallback) runs the periodic loop.
//! Followers receive the leader's verdict through the peer bus and apply it
//! with [`HealthMonitor::apply_peer_status`].

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{next_interval, HealthState, ProbeVerdict, ReconnectOutcome};
use crate::backend::{is_reachable_status, BackendServices};
use crate::config::HealthConfig;
use crate::constants::components;
use crate::events::{ConnectionEvent, EventPublisher, ListenerRegistry, Subscription};
use crate::leader::LeaderCoordinator;
use crate::realtime::ChannelManager;
use crate::utils::ReentrancyGuard;
use crate::visibility::VisibilityTracker;

#[derive(Debug, Default)]
struct MonitorCounters {
    checks_run: AtomicU64,
    checks_failed: AtomicU64,
    checks_collapsed: AtomicU64,
    skipped_not_leader: AtomicU64,
    session_refreshes: AtomicU64,
    session_refresh_failures: AtomicU64,
    force_reconnects: AtomicU64,
    force_reconnect_failures: AtomicU64,
}

/// What listeners were last told, plus a deferred healthy delivery
#[derive(Debug)]
struct Delivery {
    last_delivered: bool,
    last_healthy_at: Option<Instant>,
    deferred: Option<JoinHandle<()>>,
}

impl Delivery {
    fn cancel_deferred(&mut self) {
        if let Some(task) = self.deferred.take() {
            task.abort();
        }
    }
}

/// Serializable monitor statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthMonitorStats {
    pub state: HealthState,
    pub next_check_in_ms: u64,
    pub checks_run: u64,
    pub checks_failed: u64,
    pub checks_collapsed: u64,
    pub skipped_not_leader: u64,
    pub session_refreshes: u64,
    pub session_refresh_failures: u64,
    pub force_reconnects: u64,
    pub force_reconnect_failures: u64,
}

pub struct HealthMonitor {
    me: Weak<HealthMonitor>,
    config: HealthConfig,
    services: BackendServices,
    visibility: Arc<VisibilityTracker>,
    leader: Arc<LeaderCoordinator>,
    channels: Arc<ChannelManager>,
    publisher: EventPublisher,
    state: Mutex<HealthState>,
    last_check_instant: Mutex<Option<Instant>>,
    delivery: Mutex<Delivery>,
    check_in_progress: AtomicBool,
    reconnect_in_progress: AtomicBool,
    listeners: ListenerRegistry<bool>,
    counters: MonitorCounters,
    loop_task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(
        config: HealthConfig,
        services: BackendServices,
        visibility: Arc<VisibilityTracker>,
        leader: Arc<LeaderCoordinator>,
        channels: Arc<ChannelManager>,
        publisher: EventPublisher,
    ) -> Arc<Self> {
        let state = HealthState::initial(&config);
        let delivered = state.healthy;
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            config,
            services,
            visibility,
            leader,
            channels,
            publisher,
            state: Mutex::new(state),
            last_check_instant: Mutex::new(None),
            delivery: Mutex::new(Delivery {
                last_delivered: delivered,
                last_healthy_at: None,
                deferred: None,
            }),
            check_in_progress: AtomicBool::new(false),
            reconnect_in_progress: AtomicBool::new(false),
            listeners: ListenerRegistry::new(),
            counters: MonitorCounters::default(),
            loop_task: Mutex::new(None),
        })
    }

    pub fn state(&self) -> HealthState {
        self.state.lock().clone()
    }

    pub fn is_healthy(&self) -> bool {
        self.state.lock().healthy
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnect_in_progress.load(Ordering::Acquire)
    }

    /// Time until the periodic loop would probe again
    pub fn next_check_in(&self) -> Duration {
        let interval = self.state.lock().current_interval();
        match *self.last_check_instant.lock() {
            Some(last) => interval.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Register a listener for definitive health transitions
    pub fn on_health_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.listeners.subscribe(listener)
    }

    /// Run one probe without touching monitor state
    pub async fn probe(&self) -> ProbeVerdict {
        if let Err(reason) = self.check_reachability().await {
            return ProbeVerdict::Unhealthy { reason };
        }

        match self.check_session().await {
            ProbeVerdict::Healthy => {}
            other => return other,
        }

        match tokio::time::timeout(self.config.liveness_timeout(), self.services.liveness.ping()).await
        {
            Ok(Ok(())) => ProbeVerdict::Healthy,
            Ok(Err(e)) => ProbeVerdict::Unhealthy {
                reason: format!("liveness query failed: {e}"),
            },
            Err(_) => ProbeVerdict::Unhealthy {
                reason: "liveness query timed out".to_string(),
            },
        }
    }

    async fn check_reachability(&self) -> Result<(), String> {
        let attempts = self.config.reachability_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match tokio::time::timeout(
                self.config.reachability_timeout(),
                self.services.reachability.probe(),
            )
            .await
            {
                Ok(Ok(status)) if is_reachable_status(status) => return Ok(()),
                Ok(Ok(status)) => last_error = format!("unexpected HTTP status {status}"),
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = "reachability probe timed out".to_string(),
            }

            debug!(attempt, attempts, error = %last_error, "Reachability attempt failed");
            if attempt < attempts {
                tokio::time::sleep(self.config.reachability_backoff()).await;
            }
        }

        Err(format!("backend unreachable after {attempts} attempt(s): {last_error}"))
    }

    async fn check_session(&self) -> ProbeVerdict {
        let timeout = self.config.session_timeout(self.visibility.is_foreground());

        let session = match tokio::time::timeout(timeout, self.services.session.get_session()).await {
            Ok(Ok(Some(session))) => session,
            Ok(Ok(None)) => {
                debug!("No active session - skipping renewal");
                return ProbeVerdict::Healthy;
            }
            Ok(Err(e)) => {
                return ProbeVerdict::Unhealthy {
                    reason: format!("session lookup failed: {e}"),
                }
            }
            Err(_) => {
                debug!(timeout_ms = timeout.as_millis() as u64, "Session lookup timed out");
                return ProbeVerdict::Uncertain {
                    reason: "session lookup timed out".to_string(),
                };
            }
        };

        let now = Utc::now();
        if session.remaining(now) >= self.config.session_refresh_threshold() {
            return ProbeVerdict::Healthy;
        }

        info!(
            component = components::HEALTH_MONITOR,
            remaining_secs = session.remaining(now).as_secs(),
            "🔑 Session close to expiry - renewing"
        );
        match tokio::time::timeout(timeout, self.services.session.refresh_session()).await {
            Ok(Ok(_)) => {
                self.counters.session_refreshes.fetch_add(1, Ordering::Relaxed);
                ProbeVerdict::Healthy
            }
            failure => {
                self.counters
                    .session_refresh_failures
                    .fetch_add(1, Ordering::Relaxed);
                let reason = match failure {
                    Ok(Err(e)) => format!("session refresh failed: {e}"),
                    _ => "session refresh timed out".to_string(),
                };

                if session.is_expired(Utc::now()) {
                    ProbeVerdict::Unhealthy { reason }
                } else {
                    // Still valid; the next probe retries the renewal
                    warn!(reason = %reason, "Session renewal failed before expiry");
                    ProbeVerdict::Healthy
                }
            }
        }
    }

    /// Probe and update monitor state. A concurrent caller gets `true`
    /// without probing.
    pub async fn check_health(&self) -> bool {
        let Some(_guard) = ReentrancyGuard::try_acquire(&self.check_in_progress) else {
            self.counters.checks_collapsed.fetch_add(1, Ordering::Relaxed);
            debug!("Health check already in flight - assuming healthy");
            return true;
        };

        self.counters.checks_run.fetch_add(1, Ordering::Relaxed);
        let verdict = self.probe().await;
        let healthy = verdict.counts_as_healthy();

        if !healthy {
            self.counters.checks_failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                component = components::HEALTH_MONITOR,
                reason = verdict.reason().unwrap_or_default(),
                "⚠️ Health check failed"
            );
        } else if let ProbeVerdict::Uncertain { reason } = &verdict {
            debug!(reason = %reason, "Health check uncertain - treating as healthy");
        }

        self.record_result(healthy);
        self.leader.broadcast_health_status(healthy);
        healthy
    }

    /// Re-establish the connection: renew the session, probe, then
    /// reconnect every channel. Time-boxed and reentrancy-guarded.
    pub async fn force_reconnect(&self) -> ReconnectOutcome {
        let Some(_guard) = ReentrancyGuard::try_acquire(&self.reconnect_in_progress) else {
            debug!("Force reconnect already in progress");
            return ReconnectOutcome::AlreadyInProgress;
        };

        self.counters.force_reconnects.fetch_add(1, Ordering::Relaxed);
        let timeout = self.config.force_reconnect_timeout();
        info!(
            component = components::HEALTH_MONITOR,
            timeout_ms = timeout.as_millis() as u64,
            "🔌 Forcing reconnect"
        );

        let attempt = async {
            if let Err(e) = self.services.session.refresh_session().await {
                debug!(error = %e, "Session refresh during force reconnect failed");
            }

            let verdict = self.probe().await;
            if !verdict.counts_as_healthy() {
                return false;
            }

            let summary = self.channels.reconnect_all().await;
            debug!(
                joined = summary.joined,
                failed = summary.failed,
                "Channels reconnected during force reconnect"
            );
            true
        };

        let outcome = match tokio::time::timeout(timeout, attempt).await {
            Ok(true) => ReconnectOutcome::Reconnected,
            Ok(false) => ReconnectOutcome::Failed,
            Err(_) => ReconnectOutcome::TimedOut,
        };

        if outcome.succeeded() {
            self.record_result(true);
            info!(component = components::HEALTH_MONITOR, "✅ Force reconnect succeeded");
        } else {
            self.counters
                .force_reconnect_failures
                .fetch_add(1, Ordering::Relaxed);
            self.record_result(false);
            warn!(
                component = components::HEALTH_MONITOR,
                outcome = ?outcome,
                "❌ Force reconnect did not restore the connection"
            );
        }
        outcome
    }

    /// Apply a verdict broadcast by the leader instance
    pub fn apply_peer_status(&self, healthy: bool) {
        let previous = {
            let mut state = self.state.lock();
            let previous = state.healthy;
            state.healthy = healthy;
            state.last_check_at = Some(Utc::now());
            if healthy {
                state.consecutive_failures = 0;
                state.current_interval_ms = self.config.baseline_interval().as_millis() as u64;
            }
            previous
        };
        self.notify_transition(previous, healthy);
    }

    fn record_result(&self, healthy: bool) {
        let previous = {
            let mut state = self.state.lock();
            let previous = state.healthy;
            state.healthy = healthy;
            state.last_check_at = Some(Utc::now());
            state.consecutive_failures = if healthy {
                0
            } else {
                state.consecutive_failures.saturating_add(1)
            };
            state.current_interval_ms =
                next_interval(&self.config, state.consecutive_failures).as_millis() as u64;
            previous
        };
        *self.last_check_instant.lock() = Some(Instant::now());

        self.notify_transition(previous, healthy);
    }

    /// Tell listeners about a change from what they last heard.
    ///
    /// A healthy delivery within the debounce window of the previous healthy
    /// delivery is deferred to the end of that window, then sent only if the
    /// monitor is still healthy. Unhealthy is always delivered at once.
    fn notify_transition(&self, previous: bool, healthy: bool) {
        if previous != healthy {
            debug!(healthy, "Health state flipped");
        }

        {
            let mut delivery = self.delivery.lock();
            if !healthy {
                delivery.cancel_deferred();
            }
            if delivery.last_delivered == healthy {
                return;
            }

            if healthy {
                let debounce = self.config.healthy_notification_debounce();
                if let Some(wait) = delivery
                    .last_healthy_at
                    .map(|at| debounce.saturating_sub(at.elapsed()))
                    .filter(|wait| !wait.is_zero())
                {
                    if delivery.deferred.as_ref().map_or(true, |t| t.is_finished()) {
                        debug!(wait_ms = wait.as_millis() as u64, "Healthy notification deferred by debounce");
                        let monitor = self.me.clone();
                        delivery.deferred = Some(tokio::spawn(async move {
                            tokio::time::sleep(wait).await;
                            if let Some(monitor) = monitor.upgrade() {
                                monitor.deliver_deferred_healthy();
                            }
                        }));
                    }
                    return;
                }
                delivery.last_healthy_at = Some(Instant::now());
            }
            delivery.last_delivered = healthy;
        }

        self.deliver(healthy);
    }

    fn deliver_deferred_healthy(&self) {
        {
            let mut delivery = self.delivery.lock();
            delivery.deferred = None;
            if delivery.last_delivered || !self.is_healthy() {
                return;
            }
            delivery.last_delivered = true;
            delivery.last_healthy_at = Some(Instant::now());
        }
        self.deliver(true);
    }

    fn deliver(&self, healthy: bool) {
        info!(
            component = components::HEALTH_MONITOR,
            healthy,
            "🩺 Health changed"
        );
        self.listeners.notify(&healthy);
        self.publisher
            .publish(ConnectionEvent::HealthChanged { healthy });
    }

    /// Start the periodic probing loop
    pub fn start(self: &Arc<Self>) {
        let mut task = self.loop_task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let monitor = Arc::downgrade(self);
        *task = Some(tokio::spawn(async move {
            loop {
                let Some(monitor) = monitor.upgrade() else {
                    break;
                };

                let wait = if monitor.leader.should_run_health_check() {
                    monitor.check_health().await;
                    monitor.state.lock().current_interval()
                } else {
                    monitor
                        .counters
                        .skipped_not_leader
                        .fetch_add(1, Ordering::Relaxed);
                    // Re-evaluate leadership sooner than a full baseline
                    monitor.config.failure_interval_floor()
                };
                drop(monitor);

                tokio::time::sleep(wait).await;
            }
        }));

        info!(
            component = components::HEALTH_MONITOR,
            baseline_seconds = self.config.baseline_interval_seconds,
            "✅ Health monitor started"
        );
    }

    pub fn stop(&self) {
        self.delivery.lock().cancel_deferred();
        if let Some(task) = self.loop_task.lock().take() {
            task.abort();
            info!(component = components::HEALTH_MONITOR, "🛑 Health monitor stopped");
        }
    }

    pub fn stats(&self) -> HealthMonitorStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        HealthMonitorStats {
            state: self.state(),
            next_check_in_ms: self.next_check_in().as_millis() as u64,
            checks_run: load(&self.counters.checks_run),
            checks_failed: load(&self.counters.checks_failed),
            checks_collapsed: load(&self.counters.checks_collapsed),
            skipped_not_leader: load(&self.counters.skipped_not_leader),
            session_refreshes: load(&self.counters.session_refreshes),
            session_refresh_failures: load(&self.counters.session_refresh_failures),
            force_reconnects: load(&self.counters.force_reconnects),
            force_reconnect_failures: load(&self.counters.force_reconnect_failures),
        }
    }
}

impl fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("state", &*self.state.lock())
            .field("check_in_progress", &self.check_in_progress.load(Ordering::Relaxed))
            .finish()
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.loop_task.get_mut().take() {
            task.abort();
        }
        self.delivery.get_mut().cancel_deferred();
    }
}
