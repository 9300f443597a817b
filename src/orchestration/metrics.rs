//! Recovery cycle counters for the connection orchestrator.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Running recovery statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecoveryMetrics {
    /// Recovery cycles that actually ran
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    /// Restore signals cancelled by a newer signal during the debounce window
    pub superseded: u64,
    /// Visibility signals discarded by the debounce window
    pub debounced: u64,
    /// Cycles skipped because the breaker was cooling down
    pub suppressed_by_breaker: u64,
    /// Cycles refused because another one was running
    pub collapsed: u64,
    pub connection_losses: u64,
    pub total_recovery_time: Duration,
    pub last_recovery_at: Option<DateTime<Utc>>,
    pub last_trigger: Option<String>,
}

impl RecoveryMetrics {
    pub fn record_attempt(&mut self, trigger: &str) {
        self.attempts += 1;
        self.last_trigger = Some(trigger.to_string());
    }

    pub fn record_outcome(&mut self, succeeded: bool, duration: Duration) {
        if succeeded {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.total_recovery_time += duration;
        self.last_recovery_at = Some(Utc::now());
    }

    /// 0.0 to 1.0; 1.0 before any cycle completed
    pub fn success_rate(&self) -> f64 {
        let completed = self.successes + self.failures;
        if completed == 0 {
            return 1.0;
        }
        self.successes as f64 / completed as f64
    }

    pub fn average_recovery_time(&self) -> Duration {
        let completed = self.successes + self.failures;
        if completed == 0 {
            return Duration::ZERO;
        }
        self.total_recovery_time / completed as u32
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Recoveries: {} | Success: {:.1}% | Avg: {}ms | Superseded: {} | Debounced: {}",
            self.attempts,
            self.success_rate() * 100.0,
            self.average_recovery_time().as_millis(),
            self.superseded,
            self.debounced
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_and_averages() {
        let mut metrics = RecoveryMetrics::default();
        assert_eq!(metrics.success_rate(), 1.0);
        assert_eq!(metrics.average_recovery_time(), Duration::ZERO);

        metrics.record_attempt("tab_visible");
        metrics.record_outcome(true, Duration::from_millis(300));
        metrics.record_attempt("connection_restored");
        metrics.record_outcome(false, Duration::from_millis(100));

        assert_eq!(metrics.attempts, 2);
        assert_eq!(metrics.success_rate(), 0.5);
        assert_eq!(metrics.average_recovery_time(), Duration::from_millis(200));
        assert_eq!(metrics.last_trigger.as_deref(), Some("connection_restored"));
        assert!(metrics.last_recovery_at.is_some());
    }
}
