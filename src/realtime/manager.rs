//! # Realtime Channel Manager
//!
//! Owns the registry of active realtime subscriptions. Reconnection runs in
//! priority tiers (critical → high → normal): every reconnection in a tier is
//! issued in parallel, and the next tier starts only after the previous one
//! finished plus a short settle pause.
//!
//! A channel that keeps failing is evicted as soon as a failed attempt brings
//! its counter up to the retry limit. Consumers must re-register to resume
//! updates, which turns a silently dead subscription into an observable
//! absence.
//!
//! The passive health scan only reports into the connection status; repair
//! is left to the connection orchestrator.

use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{
    ChannelOptions, ChannelRegistration, ChannelState, RealtimeChannel, StatusCallback,
};
use crate::config::ChannelConfig;
use crate::constants::components;
use crate::error::{ResilienceError, Result};
use crate::events::{ConnectionEvent, EventPublisher};
use crate::logging::log_channel_operation;
use crate::priority::{group_into_waves, Priority};
use crate::status::{ConnectionStatus, ConnectionStatusTracker};
use crate::utils::ReentrancyGuard;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone)]
struct ChannelEntry {
    handle: Arc<dyn RealtimeChannel>,
    registration: Arc<Mutex<ChannelRegistration>>,
}

impl ChannelEntry {
    /// Registration with its state refreshed from the live handle
    fn snapshot(&self) -> ChannelRegistration {
        let mut registration = self.registration.lock();
        registration.state = self.handle.state();
        registration.clone()
    }
}

#[derive(Debug, Default)]
struct ChannelMetrics {
    reconnect_cycles: AtomicU64,
    collapsed_cycles: AtomicU64,
    refresh_attempts: AtomicU64,
    refresh_successes: AtomicU64,
    evictions: AtomicU64,
}

/// Releases the reconnect flag, then wakes collapsed callers; runs on cancellation too
struct PassInFlight<'a> {
    guard: Option<ReentrancyGuard<'a>>,
    finished: &'a Notify,
}

impl Drop for PassInFlight<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.finished.notify_waiters();
    }
}

/// Outcome of one `reconnect_all` pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconnectSummary {
    /// Another pass was already running; this call waited for it and reports its result
    pub collapsed: bool,
    /// Tiers processed, in order
    pub tiers: Vec<Priority>,
    pub joined: usize,
    pub failed: usize,
    pub evicted: Vec<String>,
}

impl ReconnectSummary {
    pub fn is_fully_joined(&self) -> bool {
        self.failed == 0 && self.evicted.is_empty()
    }
}

/// Aggregated registry statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStats {
    pub total: usize,
    pub joined: usize,
    pub joining: usize,
    pub closed: usize,
    pub errored: usize,
    pub reconnect_cycles: u64,
    pub collapsed_cycles: u64,
    pub refresh_attempts: u64,
    pub refresh_successes: u64,
    pub evictions: u64,
    pub channels: Vec<ChannelRegistration>,
}

pub struct ChannelManager {
    config: ChannelConfig,
    registry: DashMap<String, ChannelEntry>,
    reconnect_in_progress: AtomicBool,
    pass_finished: Notify,
    last_pass: Mutex<Option<ReconnectSummary>>,
    status: Arc<ConnectionStatusTracker>,
    publisher: EventPublisher,
    metrics: ChannelMetrics,
    scan_task: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelManager {
    pub fn new(
        config: ChannelConfig,
        status: Arc<ConnectionStatusTracker>,
        publisher: EventPublisher,
    ) -> Arc<Self> {
        info!(
            component = components::CHANNEL_MANAGER,
            tier_pause_ms = config.tier_pause_ms,
            subscribe_timeout_ms = config.subscribe_timeout_ms,
            default_retry_limit = config.default_retry_limit,
            "📡 Channel manager initialized"
        );

        Arc::new(Self {
            config,
            registry: DashMap::new(),
            reconnect_in_progress: AtomicBool::new(false),
            pass_finished: Notify::new(),
            last_pass: Mutex::new(None),
            status,
            publisher,
            metrics: ChannelMetrics::default(),
            scan_task: Mutex::new(None),
        })
    }

    /// Register a channel handle under `id`, replacing any previous registration
    pub fn register_channel(
        &self,
        id: impl Into<String>,
        handle: Arc<dyn RealtimeChannel>,
        options: ChannelOptions,
    ) {
        let id = id.into();
        let now = Utc::now();
        let registration = ChannelRegistration {
            id: id.clone(),
            channel_type: options.channel_type,
            priority: options.priority,
            state: handle.state(),
            reconnect_attempts: 0,
            retry_limit: options
                .retry_limit
                .unwrap_or(self.config.default_retry_limit),
            created_at: now,
            last_activity_at: now,
        };

        log_channel_operation(
            "register",
            &id,
            Some(registration.priority.as_str()),
            "registered",
            None,
            Some(&registration.channel_type),
        );

        let entry = ChannelEntry {
            handle,
            registration: Arc::new(Mutex::new(registration)),
        };
        if self.registry.insert(id.clone(), entry).is_some() {
            warn!(channel_id = %id, "Channel re-registered, previous handle replaced");
        }
    }

    /// Remove a channel and unsubscribe its handle. Returns false if unknown.
    pub async fn unregister_channel(&self, id: &str) -> bool {
        let Some((_, entry)) = self.registry.remove(id) else {
            return false;
        };

        if let Err(e) = entry.handle.unsubscribe().await {
            warn!(channel_id = %id, error = %e, "Unsubscribe failed during unregister");
        }
        log_channel_operation("unregister", id, None, "removed", None, None);
        true
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.registry.contains_key(id)
    }

    /// Record that updates arrived on a channel
    pub fn touch_channel(&self, id: &str) {
        if let Some(entry) = self.registry.get(id) {
            entry.registration.lock().last_activity_at = Utc::now();
        }
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnect_in_progress.load(Ordering::Acquire)
    }

    /// Refresh one channel. `true` when the channel ends up joined (or joining).
    pub async fn refresh_channel(&self, id: &str) -> bool {
        match self.try_refresh_channel(id).await {
            Ok(state) => state.is_live(),
            Err(e) => {
                debug!(channel_id = %id, error = %e, "Channel refresh failed");
                false
            }
        }
    }

    /// Refresh one channel, reporting the typed failure
    pub async fn try_refresh_channel(&self, id: &str) -> Result<ChannelState> {
        let entry = self
            .registry
            .get(id)
            .map(|entry| entry.clone())
            .ok_or_else(|| ResilienceError::ChannelNotFound {
                channel_id: id.to_string(),
            })?;

        let current = entry.handle.state();
        if current.is_live() {
            entry.registration.lock().state = current;
            return Ok(current);
        }

        let (attempt, retry_limit, priority) = {
            let mut registration = entry.registration.lock();
            registration.state = current;
            if registration.reconnect_attempts >= registration.retry_limit {
                let attempts = registration.reconnect_attempts;
                let retry_limit = registration.retry_limit;
                drop(registration);
                self.evict(id, &entry, attempts);
                return Err(ResilienceError::ChannelRetryExceeded {
                    channel_id: id.to_string(),
                    retry_limit,
                });
            }
            registration.reconnect_attempts += 1;
            registration.state = ChannelState::Joining;
            (
                registration.reconnect_attempts,
                registration.retry_limit,
                registration.priority,
            )
        };
        self.metrics.refresh_attempts.fetch_add(1, Ordering::Relaxed);

        debug!(
            channel_id = %id,
            priority = %priority,
            attempt,
            retry_limit,
            "Refreshing channel"
        );

        if let Err(e) = entry.handle.unsubscribe().await {
            debug!(channel_id = %id, error = %e, "Unsubscribe before resubscribe failed");
        }
        tokio::time::sleep(self.config.resubscribe_pause()).await;

        let timeout = self.config.subscribe_timeout();
        match tokio::time::timeout(timeout, Self::resubscribe(&entry)).await {
            Ok(ChannelState::Joined) => {
                {
                    let mut registration = entry.registration.lock();
                    registration.reconnect_attempts = 0;
                    registration.state = ChannelState::Joined;
                    registration.last_activity_at = Utc::now();
                }
                self.metrics.refresh_successes.fetch_add(1, Ordering::Relaxed);
                log_channel_operation(
                    "refresh",
                    id,
                    Some(priority.as_str()),
                    "joined",
                    Some(attempt),
                    None,
                );
                Ok(ChannelState::Joined)
            }
            Ok(state) => {
                entry.registration.lock().state = state;
                warn!(channel_id = %id, state = ?state, attempt, "Channel failed to rejoin");
                Err(self.failed_attempt(
                    id,
                    &entry,
                    attempt,
                    retry_limit,
                    ResilienceError::Backend(crate::error::BackendError::Realtime(format!(
                        "channel '{id}' ended in state {state:?}"
                    ))),
                ))
            }
            Err(_) => {
                entry.registration.lock().state = ChannelState::Errored;
                warn!(
                    channel_id = %id,
                    attempt,
                    timeout_ms = timeout.as_millis() as u64,
                    "⏱️ Channel resubscription timed out"
                );
                Err(self.failed_attempt(
                    id,
                    &entry,
                    attempt,
                    retry_limit,
                    ResilienceError::SubscriptionTimeout {
                        channel_id: id.to_string(),
                        timeout,
                    },
                ))
            }
        }
    }

    /// Evict once the failed attempt used up the retry limit, else pass `error` through
    fn failed_attempt(
        &self,
        id: &str,
        entry: &ChannelEntry,
        attempt: u32,
        retry_limit: u32,
        error: ResilienceError,
    ) -> ResilienceError {
        if attempt < retry_limit {
            return error;
        }

        debug!(channel_id = %id, error = %error, "Final attempt failed");
        self.evict(id, entry, attempt);
        ResilienceError::ChannelRetryExceeded {
            channel_id: id.to_string(),
            retry_limit,
        }
    }

    /// Subscribe and wait for the first terminal status
    async fn resubscribe(entry: &ChannelEntry) -> ChannelState {
        let (tx, mut rx) = watch::channel(ChannelState::Joining);
        let registration = Arc::clone(&entry.registration);
        let callback: StatusCallback = Arc::new(move |state: ChannelState| {
            {
                let mut registration = registration.lock();
                registration.state = state;
                registration.last_activity_at = Utc::now();
            }
            tx.send_replace(state);
        });

        if let Err(e) = entry.handle.subscribe(callback).await {
            debug!(error = %e, "Subscribe call failed");
            return ChannelState::Errored;
        }

        let immediate = entry.handle.state();
        if immediate != ChannelState::Joining {
            return immediate;
        }

        let result = rx.wait_for(|state| *state != ChannelState::Joining).await;
        match result {
            Ok(state) => *state,
            // Transport dropped our callback without reporting a final state
            Err(_) => entry.handle.state(),
        }
    }

    fn evict(&self, id: &str, entry: &ChannelEntry, attempts: u32) {
        // Only evict the registration we inspected, not a fresh re-registration
        let removed = self
            .registry
            .remove_if(id, |_, current| {
                Arc::ptr_eq(&current.registration, &entry.registration)
            })
            .is_some();
        if !removed {
            return;
        }

        self.metrics.evictions.fetch_add(1, Ordering::Relaxed);
        warn!(
            channel_id = %id,
            attempts,
            "🗑️ Channel evicted after exhausting retry limit"
        );
        self.publisher.publish(ConnectionEvent::ChannelEvicted {
            channel_id: id.to_string(),
            attempts,
        });

        let handle = Arc::clone(&entry.handle);
        let id = id.to_string();
        tokio::spawn(async move {
            if let Err(e) = handle.unsubscribe().await {
                debug!(channel_id = %id, error = %e, "Unsubscribe after eviction failed");
            }
        });
    }

    /// Reconnect every registered channel tier by tier.
    ///
    /// Concurrent calls collapse into the one already running: they issue no
    /// subscribes of their own but return only once that pass has finished.
    pub async fn reconnect_all(&self) -> ReconnectSummary {
        let Some(guard) = ReentrancyGuard::try_acquire(&self.reconnect_in_progress) else {
            self.metrics.collapsed_cycles.fetch_add(1, Ordering::Relaxed);
            debug!("reconnect_all already in progress - waiting for the running pass");
            self.wait_for_running_pass().await;
            let finished = self.last_pass.lock().clone().unwrap_or_default();
            return ReconnectSummary {
                collapsed: true,
                ..finished
            };
        };

        let _pass = PassInFlight {
            guard: Some(guard),
            finished: &self.pass_finished,
        };
        let summary = self.run_reconnect_pass().await;
        *self.last_pass.lock() = Some(summary.clone());
        summary
    }

    async fn wait_for_running_pass(&self) {
        loop {
            let notified = self.pass_finished.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_reconnecting() {
                return;
            }
            notified.await;
        }
    }

    async fn run_reconnect_pass(&self) -> ReconnectSummary {
        self.metrics.reconnect_cycles.fetch_add(1, Ordering::Relaxed);

        let started = Instant::now();
        let items: Vec<(Priority, String)> = self
            .registry
            .iter()
            .map(|entry| (entry.registration.lock().priority, entry.key().clone()))
            .collect();
        let waves = group_into_waves(items, |_| self.config.tier_pause());

        info!(
            component = components::CHANNEL_MANAGER,
            channels = waves.iter().map(|w| w.len()).sum::<usize>(),
            tiers = waves.len(),
            "🔄 Reconnecting all channels"
        );

        let mut summary = ReconnectSummary::default();
        for (index, wave) in waves.into_iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(wave.delay).await;
            }

            let results = join_all(
                wave.items
                    .iter()
                    .map(|id| async move { (id, self.try_refresh_channel(id).await) }),
            )
            .await;

            for (id, result) in results {
                match result {
                    Ok(_) => summary.joined += 1,
                    Err(ResilienceError::ChannelRetryExceeded { .. }) => {
                        summary.evicted.push(id.clone())
                    }
                    // Unregistered while the wave was in flight
                    Err(ResilienceError::ChannelNotFound { .. }) => {}
                    Err(_) => summary.failed += 1,
                }
            }
            summary.tiers.push(wave.priority);
        }

        info!(
            component = components::CHANNEL_MANAGER,
            joined = summary.joined,
            failed = summary.failed,
            evicted = summary.evicted.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "✅ Channel reconnection pass complete"
        );

        summary
    }

    /// Ids of channels currently closed or errored, sorted
    pub fn get_unhealthy_channels(&self) -> Vec<String> {
        let mut unhealthy: Vec<String> = self
            .registry
            .iter()
            .filter(|entry| entry.handle.state().is_unhealthy())
            .map(|entry| entry.key().clone())
            .collect();
        unhealthy.sort();
        unhealthy
    }

    pub fn get_stats(&self) -> ChannelStats {
        let mut channels: Vec<ChannelRegistration> =
            self.registry.iter().map(|entry| entry.snapshot()).collect();
        channels.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));

        let count = |state: ChannelState| channels.iter().filter(|c| c.state == state).count();

        ChannelStats {
            total: channels.len(),
            joined: count(ChannelState::Joined),
            joining: count(ChannelState::Joining),
            closed: count(ChannelState::Closed),
            errored: count(ChannelState::Errored),
            reconnect_cycles: self.metrics.reconnect_cycles.load(Ordering::Relaxed),
            collapsed_cycles: self.metrics.collapsed_cycles.load(Ordering::Relaxed),
            refresh_attempts: self.metrics.refresh_attempts.load(Ordering::Relaxed),
            refresh_successes: self.metrics.refresh_successes.load(Ordering::Relaxed),
            evictions: self.metrics.evictions.load(Ordering::Relaxed),
            channels,
        }
    }

    /// Wait until every listed channel is joined
    pub async fn wait_until_ready(&self, ids: &[String], timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;

        loop {
            let pending: Vec<String> = ids
                .iter()
                .filter(|id| {
                    self.registry
                        .get(id.as_str())
                        .map(|entry| entry.handle.state() != ChannelState::Joined)
                        .unwrap_or(true)
                })
                .cloned()
                .collect();

            if pending.is_empty() {
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(ResilienceError::ConnectionNotReady {
                    pending,
                    waited: timeout,
                });
            }

            tokio::time::sleep(READY_POLL_INTERVAL.min(deadline - Instant::now())).await;
        }
    }

    /// One passive scan: report status, never repair
    pub fn scan_channel_health(&self) -> Vec<String> {
        let unhealthy = self.get_unhealthy_channels();
        if unhealthy.is_empty() {
            self.status.report(ConnectionStatus::Connected);
        } else {
            warn!(
                component = components::CHANNEL_MANAGER,
                unhealthy = ?unhealthy,
                "⚠️ Unhealthy realtime channels detected"
            );
            self.status.report(ConnectionStatus::Disconnected);
        }
        unhealthy
    }

    /// Start the periodic passive health scan
    pub fn start_health_scan(self: &Arc<Self>) {
        let mut task = self.scan_task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let manager = Arc::downgrade(self);
        let period = self.config.health_scan_interval();
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.scan_channel_health();
            }
        }));
    }

    pub fn stop_health_scan(&self) {
        if let Some(task) = self.scan_task.lock().take() {
            task.abort();
        }
    }
}

impl fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelManager")
            .field("channels", &self.registry.len())
            .field("reconnect_in_progress", &self.is_reconnecting())
            .finish()
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        self.stop_health_scan();
    }
}
