//! Connection orchestrator service and its signal loop.

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::RecoveryMetrics;
use crate::cache::{plan_invalidation, run_invalidation_waves, InvalidationSummary, QueryCache};
use crate::config::{CacheConfig, OrchestratorConfig};
use crate::constants::{components, triggers};
use crate::events::{ConnectionEvent, EventPublisher, Subscription};
use crate::health::HealthMonitor;
use crate::logging::log_recovery_operation;
use crate::realtime::{ChannelManager, ReconnectSummary};
use crate::resilience::CircuitBreaker;
use crate::status::{ConnectionStatus, ConnectionStatusTracker};
use crate::utils::ReentrancyGuard;
use crate::visibility::VisibilityTracker;

/// Typed inputs consumed by the orchestrator's signal loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorSignal {
    TabVisible,
    TabHidden,
    ConnectionLost,
    ConnectionRestored,
    HealthChanged(bool),
}

/// What one completed recovery cycle did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryReport {
    pub trigger: String,
    pub channels: ReconnectSummary,
    pub invalidation: InvalidationSummary,
    pub duration_ms: u64,
}

impl RecoveryReport {
    pub fn succeeded(&self) -> bool {
        self.channels.failed == 0 && self.invalidation.failed_waves == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    Completed(RecoveryReport),
    /// Visibility signal arrived inside the debounce window
    Debounced,
    /// A newer lost/restored signal arrived during the restore debounce
    Superseded,
    /// Another recovery cycle was already running
    AlreadyRunning,
    /// Breaker open and cooling down; recovery would only add load
    SuppressedByBreaker { remaining_ms: u64 },
    /// Force-reconnect could not restore the connection
    Failed { reason: String },
}

impl RecoveryOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RecoveryOutcome::Completed(_))
    }
}

pub struct ConnectionOrchestrator {
    config: OrchestratorConfig,
    cache_config: CacheConfig,
    health: Arc<HealthMonitor>,
    channels: Arc<ChannelManager>,
    cache: Arc<dyn QueryCache>,
    breaker: Arc<CircuitBreaker>,
    visibility: Arc<VisibilityTracker>,
    status: Arc<ConnectionStatusTracker>,
    publisher: EventPublisher,
    metrics: Mutex<RecoveryMetrics>,
    last_visibility_signal: Mutex<Option<Instant>>,
    /// Bumped by every lost/restored signal; a pending restore runs only if unchanged
    restore_generation: AtomicU64,
    recovery_in_progress: AtomicBool,
    signal_tx: Mutex<Option<mpsc::UnboundedSender<OrchestratorSignal>>>,
    loop_task: Mutex<Option<JoinHandle<()>>>,
    pending_restore: Mutex<Option<JoinHandle<()>>>,
    health_subscription: Mutex<Option<Subscription>>,
}

impl ConnectionOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: OrchestratorConfig,
        cache_config: CacheConfig,
        health: Arc<HealthMonitor>,
        channels: Arc<ChannelManager>,
        cache: Arc<dyn QueryCache>,
        breaker: Arc<CircuitBreaker>,
        visibility: Arc<VisibilityTracker>,
        status: Arc<ConnectionStatusTracker>,
        publisher: EventPublisher,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            cache_config,
            health,
            channels,
            cache,
            breaker,
            visibility,
            status,
            publisher,
            metrics: Mutex::new(RecoveryMetrics::default()),
            last_visibility_signal: Mutex::new(None),
            restore_generation: AtomicU64::new(0),
            recovery_in_progress: AtomicBool::new(false),
            signal_tx: Mutex::new(None),
            loop_task: Mutex::new(None),
            pending_restore: Mutex::new(None),
            health_subscription: Mutex::new(None),
        })
    }

    pub fn metrics(&self) -> RecoveryMetrics {
        self.metrics.lock().clone()
    }

    pub fn is_recovering(&self) -> bool {
        self.recovery_in_progress.load(Ordering::Acquire)
    }

    /// The instance became visible or focused
    pub async fn on_tab_visible(&self) -> RecoveryOutcome {
        self.visibility.set_foreground(true);

        {
            let mut last = self.last_visibility_signal.lock();
            let now = Instant::now();
            let within_window = last
                .is_some_and(|previous| now.duration_since(previous) < self.config.visibility_debounce());
            *last = Some(now);
            if within_window {
                self.metrics.lock().debounced += 1;
                debug!("Visibility signal discarded by debounce");
                return RecoveryOutcome::Debounced;
            }
        }

        if let Some(outcome) = self.suppressed_by_breaker() {
            return outcome;
        }

        if !self.health.check_health().await {
            let outcome = self.health.force_reconnect().await;
            if !outcome.succeeded() {
                {
                    let mut metrics = self.metrics.lock();
                    metrics.record_attempt(triggers::TAB_VISIBLE);
                    metrics.record_outcome(false, Duration::ZERO);
                }
                self.publisher.publish(ConnectionEvent::ReconnectionAttempted {
                    trigger: triggers::TAB_VISIBLE.to_string(),
                    succeeded: false,
                });
                warn!(
                    component = components::CONNECTION_ORCHESTRATOR,
                    outcome = ?outcome,
                    "Force reconnect failed after becoming visible"
                );
                return RecoveryOutcome::Failed {
                    reason: format!("force reconnect {outcome:?}"),
                };
            }
        }

        self.run_recovery(triggers::TAB_VISIBLE).await
    }

    pub fn on_tab_hidden(&self) {
        self.visibility.set_foreground(false);
    }

    /// Connection dropped: cancel a restore still waiting out its debounce
    /// and report the loss. A restore already recovering runs to completion.
    pub fn on_connection_lost(&self) {
        self.restore_generation.fetch_add(1, Ordering::AcqRel);
        if let Some(pending) = self.pending_restore.lock().take() {
            if self.is_recovering() {
                debug!("Connection lost mid-recovery; letting the recovery finish");
            } else {
                pending.abort();
            }
        }
        self.metrics.lock().connection_losses += 1;
        self.status.report(ConnectionStatus::Disconnected);
        info!(component = components::CONNECTION_ORCHESTRATOR, "📴 Connection lost");
    }

    /// Connection came back. Recovery runs only after the restore debounce
    /// passes with no newer lost/restored signal.
    pub async fn on_connection_restored(&self) -> RecoveryOutcome {
        let generation = self.restore_generation.fetch_add(1, Ordering::AcqRel) + 1;
        tokio::time::sleep(self.config.restore_debounce()).await;

        if self.restore_generation.load(Ordering::Acquire) != generation {
            self.metrics.lock().superseded += 1;
            debug!("Restore superseded by a newer connection signal");
            return RecoveryOutcome::Superseded;
        }

        self.run_recovery(triggers::CONNECTION_RESTORED).await
    }

    /// Channels first, then staged cache invalidation
    pub async fn run_recovery(&self, trigger: &str) -> RecoveryOutcome {
        if let Some(outcome) = self.suppressed_by_breaker() {
            return outcome;
        }

        let Some(_guard) = ReentrancyGuard::try_acquire(&self.recovery_in_progress) else {
            self.metrics.lock().collapsed += 1;
            debug!(trigger, "Recovery already running - collapsing");
            return RecoveryOutcome::AlreadyRunning;
        };

        self.metrics.lock().record_attempt(trigger);
        let started = Instant::now();
        log_recovery_operation(trigger, "channels", "started", None, None);

        let channels = self.channels.reconnect_all().await;
        log_recovery_operation(
            trigger,
            "channels",
            "completed",
            Some(started.elapsed().as_millis() as u64),
            Some(&format!("joined={} failed={}", channels.joined, channels.failed)),
        );

        tokio::time::sleep(self.config.post_channel_stabilization()).await;

        let waves = plan_invalidation(&self.cache.queries(), Utc::now(), &self.cache_config);
        log_recovery_operation(
            trigger,
            "invalidation",
            "started",
            None,
            Some(&format!("waves={}", waves.len())),
        );
        let invalidation = run_invalidation_waves(self.cache.as_ref(), waves).await;

        let duration = started.elapsed();
        let report = RecoveryReport {
            trigger: trigger.to_string(),
            channels,
            invalidation,
            duration_ms: duration.as_millis() as u64,
        };
        let succeeded = report.succeeded();

        self.metrics.lock().record_outcome(succeeded, duration);
        self.publisher.publish(ConnectionEvent::ReconnectionAttempted {
            trigger: trigger.to_string(),
            succeeded,
        });
        if succeeded {
            self.status.report(ConnectionStatus::Connected);
        }

        log_recovery_operation(
            trigger,
            "complete",
            if succeeded { "succeeded" } else { "partial" },
            Some(report.duration_ms),
            Some(&format!("invalidated={}", report.invalidation.invalidated)),
        );

        RecoveryOutcome::Completed(report)
    }

    fn suppressed_by_breaker(&self) -> Option<RecoveryOutcome> {
        let remaining = self.breaker.remaining_cooldown()?;
        self.metrics.lock().suppressed_by_breaker += 1;
        debug!(
            remaining_ms = remaining.as_millis() as u64,
            "Recovery suppressed while breaker cools down"
        );
        Some(RecoveryOutcome::SuppressedByBreaker {
            remaining_ms: remaining.as_millis() as u64,
        })
    }

    /// Queue a signal for the running loop; false when the loop is not running
    pub fn signal(&self, signal: OrchestratorSignal) -> bool {
        self.signal_tx
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(signal).is_ok())
    }

    /// Start consuming signals and health transitions
    pub fn start(self: &Arc<Self>) {
        let mut loop_task = self.loop_task.lock();
        if loop_task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let health_tx = tx.clone();
        *self.health_subscription.lock() = Some(self.health.on_health_change(move |healthy| {
            let _ = health_tx.send(OrchestratorSignal::HealthChanged(*healthy));
        }));
        *self.signal_tx.lock() = Some(tx);

        let orchestrator = Arc::downgrade(self);
        *loop_task = Some(tokio::spawn(async move {
            while let Some(signal) = rx.recv().await {
                let Some(orchestrator) = orchestrator.upgrade() else {
                    break;
                };
                orchestrator.dispatch(signal);
            }
        }));

        info!(component = components::CONNECTION_ORCHESTRATOR, "✅ Connection orchestrator started");
    }

    fn dispatch(self: &Arc<Self>, signal: OrchestratorSignal) {
        debug!(signal = ?signal, "Orchestrator signal");
        match signal {
            OrchestratorSignal::TabVisible => {
                let orchestrator = Arc::clone(self);
                tokio::spawn(async move {
                    orchestrator.on_tab_visible().await;
                });
            }
            OrchestratorSignal::TabHidden => self.on_tab_hidden(),
            OrchestratorSignal::ConnectionLost | OrchestratorSignal::HealthChanged(false) => {
                self.on_connection_lost()
            }
            OrchestratorSignal::ConnectionRestored | OrchestratorSignal::HealthChanged(true) => {
                let orchestrator = Arc::clone(self);
                let mut pending = self.pending_restore.lock();
                if let Some(previous) = pending.take() {
                    // Superseded anyway; only abort if still in its debounce sleep
                    if !self.is_recovering() {
                        previous.abort();
                    }
                }
                *pending = Some(tokio::spawn(async move {
                    orchestrator.on_connection_restored().await;
                }));
            }
        }
    }

    pub fn stop(&self) {
        self.health_subscription.lock().take();
        self.signal_tx.lock().take();
        if let Some(task) = self.loop_task.lock().take() {
            task.abort();
        }
        if let Some(pending) = self.pending_restore.lock().take() {
            pending.abort();
        }
        info!(component = components::CONNECTION_ORCHESTRATOR, "🛑 Connection orchestrator stopped");
    }
}

impl fmt::Debug for ConnectionOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOrchestrator")
            .field("recovery_in_progress", &self.is_recovering())
            .field("restore_generation", &self.restore_generation.load(Ordering::Relaxed))
            .finish()
    }
}

impl Drop for ConnectionOrchestrator {
    fn drop(&mut self) {
        if let Some(task) = self.loop_task.get_mut().take() {
            task.abort();
        }
        if let Some(pending) = self.pending_restore.get_mut().take() {
            pending.abort();
        }
    }
}
