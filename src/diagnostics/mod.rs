//! # Connection Diagnostics
//!
//! Read-only aggregation of the resilience layer's counters for operators,
//! plus two operator-driven test affordances: a manual reconnection cycle
//! and a bounded health-sampling loop. Production code paths never depend
//! on anything in this module.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::DiagnosticsConfig;
use crate::constants::{components, triggers};
use crate::health::{HealthMonitor, HealthMonitorStats, HealthState, ProbeVerdict};
use crate::leader::{LeaderCoordinator, LeaderStatus};
use crate::orchestration::{ConnectionOrchestrator, RecoveryMetrics, RecoveryOutcome};
use crate::realtime::{ChannelManager, ChannelStats};
use crate::resilience::{CircuitBreaker, CircuitBreakerSnapshot};
use crate::status::{ConnectionStatus, ConnectionStatusTracker};

/// Recovery metrics plus derived rates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoverySummary {
    #[serde(flatten)]
    pub metrics: RecoveryMetrics,
    pub success_rate: f64,
    pub average_recovery_ms: u64,
}

/// Full point-in-time view of the layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticsReport {
    pub generated_at: DateTime<Utc>,
    pub connection_status: ConnectionStatus,
    pub leader: LeaderStatus,
    pub health: HealthMonitorStats,
    pub channels: ChannelStats,
    pub circuit_breaker: CircuitBreakerSnapshot,
    pub cooldown_message: String,
    pub recovery: RecoverySummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestReconnectionReport {
    pub started_at: DateTime<Utc>,
    pub health_before: HealthState,
    pub probe: ProbeVerdict,
    pub outcome: RecoveryOutcome,
    pub health_after: HealthState,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSample {
    /// Offset from the start of monitoring
    pub offset_ms: u64,
    pub verdict: ProbeVerdict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthMonitoringReport {
    pub requested_seconds: u64,
    pub effective_duration_ms: u64,
    /// The requested duration exceeded the configured maximum
    pub clamped: bool,
    pub samples: Vec<HealthSample>,
    pub healthy: usize,
    pub unhealthy: usize,
    pub uncertain: usize,
}

pub struct ConnectionDiagnostics {
    config: DiagnosticsConfig,
    health: Arc<HealthMonitor>,
    channels: Arc<ChannelManager>,
    breaker: Arc<CircuitBreaker>,
    orchestrator: Arc<ConnectionOrchestrator>,
    leader: Arc<LeaderCoordinator>,
    status: Arc<ConnectionStatusTracker>,
}

impl ConnectionDiagnostics {
    pub fn new(
        config: DiagnosticsConfig,
        health: Arc<HealthMonitor>,
        channels: Arc<ChannelManager>,
        breaker: Arc<CircuitBreaker>,
        orchestrator: Arc<ConnectionOrchestrator>,
        leader: Arc<LeaderCoordinator>,
        status: Arc<ConnectionStatusTracker>,
    ) -> Self {
        Self {
            config,
            health,
            channels,
            breaker,
            orchestrator,
            leader,
            status,
        }
    }

    pub fn report(&self) -> DiagnosticsReport {
        let breaker = self.breaker.snapshot();
        let metrics = self.orchestrator.metrics();
        debug!(
            component = components::DIAGNOSTICS,
            breaker = %breaker.format_summary(),
            "📊 Diagnostics report generated"
        );

        DiagnosticsReport {
            generated_at: Utc::now(),
            connection_status: self.status.current(),
            leader: self.leader.status(),
            health: self.health.stats(),
            channels: self.channels.get_stats(),
            cooldown_message: breaker.cooldown_message(),
            circuit_breaker: breaker,
            recovery: RecoverySummary {
                success_rate: metrics.success_rate(),
                average_recovery_ms: metrics.average_recovery_time().as_millis() as u64,
                metrics,
            },
        }
    }

    /// Probe, then run one full recovery cycle
    pub async fn test_reconnection(&self) -> TestReconnectionReport {
        let started_at = Utc::now();
        let started = Instant::now();
        let health_before = self.health.state();

        info!(component = components::DIAGNOSTICS, "🧪 Manual reconnection test started");
        let probe = self.health.probe().await;
        let outcome = self.orchestrator.run_recovery(triggers::MANUAL_TEST).await;

        let report = TestReconnectionReport {
            started_at,
            health_before,
            probe,
            outcome,
            health_after: self.health.state(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            component = components::DIAGNOSTICS,
            completed = report.outcome.is_completed(),
            duration_ms = report.duration_ms,
            "🧪 Manual reconnection test finished"
        );
        report
    }

    /// Sample state-free probes once per sample interval for up to
    /// `duration_seconds`, clamped to the configured maximum
    pub async fn monitor_health_checks(&self, duration_seconds: u64) -> HealthMonitoringReport {
        let requested = Duration::from_secs(duration_seconds);
        let max = self.config.max_monitor_duration();
        let clamped = requested > max;
        let duration = requested.min(max);

        let started = Instant::now();
        let deadline = started + duration;
        let mut ticker = tokio::time::interval(self.config.sample_interval());
        let mut samples = Vec::new();

        loop {
            ticker.tick().await;
            if Instant::now() >= deadline {
                break;
            }
            let offset_ms = started.elapsed().as_millis() as u64;
            let verdict = self.health.probe().await;
            samples.push(HealthSample { offset_ms, verdict });
        }

        let count = |f: fn(&ProbeVerdict) -> bool| samples.iter().filter(|s| f(&s.verdict)).count();
        let healthy = count(|v| matches!(v, ProbeVerdict::Healthy));
        let unhealthy = count(|v| matches!(v, ProbeVerdict::Unhealthy { .. }));
        let uncertain = count(|v| matches!(v, ProbeVerdict::Uncertain { .. }));

        HealthMonitoringReport {
            requested_seconds: duration_seconds,
            effective_duration_ms: duration.as_millis() as u64,
            clamped,
            samples,
            healthy,
            unhealthy,
            uncertain,
        }
    }
}
