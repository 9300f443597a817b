//! # Health Monitoring
//!
//! Periodic verification that the remote service is reachable and the
//! session is valid. The probing interval adapts to the failure history and
//! the session is renewed before it can expire.

pub mod monitor;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::config::HealthConfig;

pub use monitor::{HealthMonitor, HealthMonitorStats};

/// Mutable probing state owned by the health monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthState {
    pub healthy: bool,
    pub last_check_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub current_interval_ms: u64,
}

impl HealthState {
    pub fn initial(config: &HealthConfig) -> Self {
        Self {
            healthy: true,
            last_check_at: None,
            consecutive_failures: 0,
            current_interval_ms: config.baseline_interval().as_millis() as u64,
        }
    }

    pub fn current_interval(&self) -> Duration {
        Duration::from_millis(self.current_interval_ms)
    }
}

/// Outcome of one state-free probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ProbeVerdict {
    Healthy,
    /// Failed definitively
    Unhealthy { reason: String },
    /// Outcome unknown, e.g. the session lookup timed out
    Uncertain { reason: String },
}

impl ProbeVerdict {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeVerdict::Healthy)
    }

    /// Uncertain outcomes are treated as healthy: slow auth is not a dead connection
    pub fn counts_as_healthy(&self) -> bool {
        !matches!(self, ProbeVerdict::Unhealthy { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ProbeVerdict::Healthy => None,
            ProbeVerdict::Unhealthy { reason } | ProbeVerdict::Uncertain { reason } => Some(reason),
        }
    }
}

/// Outcome of `HealthMonitor::force_reconnect`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectOutcome {
    Reconnected,
    Failed,
    TimedOut,
    /// Another force-reconnect was running; this call did nothing
    AlreadyInProgress,
}

impl ReconnectOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, ReconnectOutcome::Reconnected)
    }
}

/// Interval after `consecutive_failures` failures in a row.
///
/// Zero failures is the baseline. The n-th failure waits
/// `floor * 2^(n-1)`, never more than the baseline.
pub fn next_interval(config: &HealthConfig, consecutive_failures: u32) -> Duration {
    let baseline = config.baseline_interval();
    if consecutive_failures == 0 {
        return baseline;
    }

    let exponent = (consecutive_failures - 1).min(20);
    config
        .failure_interval_floor()
        .saturating_mul(1u32 << exponent)
        .min(baseline)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_doubles_up_to_baseline() {
        let config = HealthConfig::default();
        let secs = |failures| next_interval(&config, failures).as_secs();

        assert_eq!(secs(0), 300);
        assert_eq!(secs(1), 15);
        assert_eq!(secs(2), 30);
        assert_eq!(secs(3), 60);
        assert_eq!(secs(4), 120);
        assert_eq!(secs(5), 240);
        assert_eq!(secs(6), 300);
        assert_eq!(secs(40), 300);
    }

    #[test]
    fn test_uncertain_counts_as_healthy() {
        let uncertain = ProbeVerdict::Uncertain {
            reason: "session lookup timed out".to_string(),
        };
        assert!(uncertain.counts_as_healthy());
        assert!(!uncertain.is_healthy());
        assert!(!ProbeVerdict::Unhealthy {
            reason: "unreachable".to_string()
        }
        .counts_as_healthy());
    }
}
