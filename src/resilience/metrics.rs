//! # Circuit Breaker Metrics
//!
//! Point-in-time view of a breaker, exported through diagnostics and used to
//! build the user-facing cooldown message.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use super::CircuitState;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub name: String,

    pub state: CircuitState,

    /// Consecutive failures since the last success
    pub failures: u32,

    pub failure_threshold: u32,

    pub total_calls: u64,

    pub success_count: u64,

    pub failure_count: u64,

    /// Calls rejected without running while open
    pub rejected_count: u64,

    /// 0.0 to 1.0; 1.0 when no calls were made
    pub success_rate: f64,

    pub average_duration: Duration,

    pub last_failure_at: Option<DateTime<Utc>>,

    /// Cooldown left before a trial call is admitted; `None` unless open
    pub remaining_cooldown: Option<Duration>,
}

impl CircuitBreakerSnapshot {
    pub fn is_healthy(&self) -> bool {
        self.state == CircuitState::Closed
    }

    /// Human-readable recovery estimate for banners
    pub fn cooldown_message(&self) -> String {
        cooldown_message(self.state, self.remaining_cooldown)
    }

    pub fn format_summary(&self) -> String {
        format!(
            "State: {} | Calls: {} | Success: {:.1}% | Failures: {}/{} | Avg Duration: {}ms",
            self.state.description(),
            self.total_calls,
            self.success_rate * 100.0,
            self.failures,
            self.failure_threshold,
            self.average_duration.as_millis()
        )
    }
}

pub(crate) fn cooldown_message(state: CircuitState, remaining: Option<Duration>) -> String {
    match (state, remaining) {
        (CircuitState::Open, Some(remaining)) if !remaining.is_zero() => {
            let secs = remaining.as_secs_f64().ceil() as u64;
            if secs == 1 {
                "Service is recovering. Retrying in about 1 second.".to_string()
            } else {
                format!("Service is recovering. Retrying in about {secs} seconds.")
            }
        }
        (CircuitState::Open, _) | (CircuitState::HalfOpen, _) => {
            "Service is recovering. Retrying now.".to_string()
        }
        (CircuitState::Closed, _) => "Service is available.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_message_rounds_up() {
        assert_eq!(
            cooldown_message(CircuitState::Open, Some(Duration::from_millis(29_100))),
            "Service is recovering. Retrying in about 30 seconds."
        );
        assert_eq!(
            cooldown_message(CircuitState::Open, Some(Duration::from_millis(400))),
            "Service is recovering. Retrying in about 1 second."
        );
        assert_eq!(
            cooldown_message(CircuitState::HalfOpen, None),
            "Service is recovering. Retrying now."
        );
        assert_eq!(cooldown_message(CircuitState::Closed, None), "Service is available.");
    }
}
