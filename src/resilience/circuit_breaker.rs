//! # Circuit Breaker Implementation
//!
//! Fail-fast gate shared by every guarded critical operation. Three states:
//! Closed (calls pass), Open (calls are rejected until the cooldown since the
//! last failure elapses) and Half-Open (the next call decides: success closes,
//! failure reopens and restarts the cooldown).
//!
//! The breaker is fed only by guarded operations. The ambient health loop
//! never records into it, so a burst of failing critical calls trips it even
//! while background probing still reports healthy.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::metrics::cooldown_message;
use super::{CircuitBreakerConfig, CircuitBreakerSnapshot};
use crate::error::{ResilienceError, Result};
use crate::events::{ConnectionEvent, EventPublisher};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Cooldown elapsed - the next call decides
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open, // Default to safest state
        }
    }
}

impl CircuitState {
    pub fn description(&self) -> &'static str {
        match self {
            CircuitState::Closed => "Healthy - Normal operation",
            CircuitState::Open => "Failing - Rejecting all calls",
            CircuitState::HalfOpen => "Recovering - Next call decides",
        }
    }
}

#[derive(Debug, Default)]
struct BreakerCounters {
    failures: u32,
    last_failure_at: Option<Instant>,
    last_failure_wall: Option<DateTime<Utc>>,
    total_calls: u64,
    success_count: u64,
    failure_count: u64,
    rejected_count: u64,
    total_duration: Duration,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    state: AtomicU8,
    config: CircuitBreakerConfig,
    counters: Mutex<BreakerCounters>,
    publisher: EventPublisher,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig, publisher: EventPublisher) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            cooldown_seconds = config.cooldown.as_secs(),
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config,
            counters: Mutex::new(BreakerCounters::default()),
            publisher,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Stored state; an open breaker whose cooldown elapsed stays `Open`
    /// until the next admission moves it to `HalfOpen`
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    pub fn failures(&self) -> u32 {
        self.counters.lock().failures
    }

    /// Cooldown left while open; `None` when closed, half-open or cooled down
    pub fn remaining_cooldown(&self) -> Option<Duration> {
        if self.state() != CircuitState::Open {
            return None;
        }
        let counters = self.counters.lock();
        self.remaining_from(&counters).filter(|r| !r.is_zero())
    }

    /// Open and still cooling down
    pub fn is_rejecting(&self) -> bool {
        self.remaining_cooldown().is_some()
    }

    fn remaining_from(&self, counters: &BreakerCounters) -> Option<Duration> {
        let last_failure = counters.last_failure_at?;
        Some(self.config.cooldown.saturating_sub(last_failure.elapsed()))
    }

    /// Admit or reject a call for `operation`.
    ///
    /// An open breaker whose cooldown has elapsed moves to half-open and admits.
    pub fn check(&self, operation: &str) -> Result<()> {
        match self.state() {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let mut counters = self.counters.lock();
                match self.remaining_from(&counters) {
                    Some(remaining) if !remaining.is_zero() => {
                        counters.rejected_count += 1;
                        debug!(
                            component = %self.name,
                            operation = %operation,
                            remaining_ms = remaining.as_millis() as u64,
                            "⛔ Call rejected by open circuit"
                        );
                        Err(ResilienceError::CircuitBreakerOpen {
                            operation: operation.to_string(),
                            remaining,
                        })
                    }
                    Some(_) => {
                        drop(counters);
                        self.transition_to_half_open();
                        Ok(())
                    }
                    None => {
                        // Forced open without a recorded failure
                        warn!(component = %self.name, "Circuit open but no failure timestamp recorded");
                        drop(counters);
                        self.transition_to_half_open();
                        Ok(())
                    }
                }
            }
        }
    }

    /// Execute an operation with circuit breaker protection
    pub async fn call<F, T, E, Fut>(&self, operation: &str, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        self.check(operation)?;

        let start_time = Instant::now();
        let result = f().await;
        let duration = start_time.elapsed();

        match result {
            Ok(value) => {
                self.record_success(duration);
                Ok(value)
            }
            Err(e) => {
                self.record_failure(duration);
                Err(ResilienceError::OperationFailed {
                    operation: operation.to_string(),
                    attempts: 1,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Record a successful terminal outcome; closes the breaker
    pub fn record_success(&self, duration: Duration) {
        let previous = {
            let mut counters = self.counters.lock();
            counters.total_calls += 1;
            counters.success_count += 1;
            counters.total_duration += duration;
            counters.failures = 0;
            self.state.swap(CircuitState::Closed as u8, Ordering::AcqRel)
        };

        debug!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            "🟢 Operation succeeded"
        );

        if CircuitState::from(previous) != CircuitState::Closed {
            self.announce_closed();
        }
    }

    /// Record a failed terminal outcome (timeouts included)
    pub fn record_failure(&self, duration: Duration) {
        let (previous, failures) = {
            let mut counters = self.counters.lock();
            counters.total_calls += 1;
            counters.failure_count += 1;
            counters.total_duration += duration;
            counters.failures = counters.failures.saturating_add(1);
            counters.last_failure_at = Some(Instant::now());
            counters.last_failure_wall = Some(Utc::now());

            let previous = self.state();
            let should_open = match previous {
                CircuitState::Closed => counters.failures >= self.config.failure_threshold,
                CircuitState::HalfOpen => true,
                // Already open: the new failure restarts the cooldown
                CircuitState::Open => false,
            };
            if should_open {
                self.state.store(CircuitState::Open as u8, Ordering::Release);
            }
            (previous, counters.failures)
        };

        error!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            failures,
            "🔴 Operation failed"
        );

        if previous != CircuitState::Open && self.state() == CircuitState::Open {
            self.announce_opened(failures);
        }
    }

    fn transition_to_half_open(&self) {
        let moved = self
            .state
            .compare_exchange(
                CircuitState::Open as u8,
                CircuitState::HalfOpen as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if moved {
            info!(component = %self.name, "🟡 Circuit breaker half-open (next call decides)");
        }
    }

    fn announce_opened(&self, failures: u32) {
        error!(
            component = %self.name,
            consecutive_failures = failures,
            failure_threshold = self.config.failure_threshold,
            cooldown_seconds = self.config.cooldown.as_secs(),
            "🔴 Circuit breaker opened (failing fast)"
        );

        self.publisher.publish(ConnectionEvent::CircuitBreakerOpened {
            cooldown_secs: self.config.cooldown.as_secs(),
            message: cooldown_message(CircuitState::Open, Some(self.config.cooldown)),
        });
    }

    fn announce_closed(&self) {
        info!(component = %self.name, "🟢 Circuit breaker closed (recovered)");
        self.publisher.publish(ConnectionEvent::CircuitBreakerClosed);
    }

    /// Force circuit to open state, starting a fresh cooldown
    pub fn force_open(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced open");
        {
            let mut counters = self.counters.lock();
            counters.last_failure_at = Some(Instant::now());
            counters.last_failure_wall = Some(Utc::now());
        }
        let previous = self.state.swap(CircuitState::Open as u8, Ordering::AcqRel);
        if CircuitState::from(previous) != CircuitState::Open {
            self.announce_opened(self.failures());
        }
    }

    /// Force circuit to closed state, zeroing failures
    pub fn force_closed(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced closed");
        self.counters.lock().failures = 0;
        let previous = self.state.swap(CircuitState::Closed as u8, Ordering::AcqRel);
        if CircuitState::from(previous) != CircuitState::Closed {
            self.announce_closed();
        }
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let state = self.state();
        let counters = self.counters.lock();

        let success_rate = if counters.total_calls > 0 {
            counters.success_count as f64 / counters.total_calls as f64
        } else {
            1.0
        };
        let average_duration = if counters.total_calls > 0 {
            counters.total_duration / counters.total_calls as u32
        } else {
            Duration::ZERO
        };
        let remaining_cooldown = if state == CircuitState::Open {
            self.remaining_from(&counters)
        } else {
            None
        };

        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state,
            failures: counters.failures,
            failure_threshold: self.config.failure_threshold,
            total_calls: counters.total_calls,
            success_count: counters.success_count,
            failure_count: counters.failure_count,
            rejected_count: counters.rejected_count,
            success_rate,
            average_duration,
            last_failure_at: counters.last_failure_wall,
            remaining_cooldown,
        }
    }
}
