//! # Pre-flight Guard
//!
//! Wraps a single critical operation:
//!
//! 1. Fail fast with `CircuitBreakerOpen` while the shared breaker cools down.
//! 2. Run a bounded health pre-check; a definitive failure is recorded on the
//!    breaker and the operation is never attempted.
//! 3. On an uncertain pre-check, force a reconnect and wait briefly.
//! 4. Wait (bounded) for the channels the operation depends on.
//! 5. Run the operation raced against a timeout, retrying with a fixed delay.
//!
//! Every terminal outcome is recorded on the breaker. Timeouts count as
//! failures here even though their real outcome is unknown.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::CircuitBreaker;
use crate::config::GuardConfig;
use crate::constants::components;
use crate::error::{ResilienceError, Result};
use crate::health::{HealthMonitor, ProbeVerdict};
use crate::logging::log_error;
use crate::realtime::ChannelManager;

/// Per-call bounds for [`PreflightGuard::guard`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardOptions {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
    /// Channels that must be joined before the operation runs
    pub required_channels: Vec<String>,
}

impl GuardOptions {
    pub fn from_config(config: &GuardConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            timeout: Duration::from_millis(config.operation_timeout_ms),
            required_channels: Vec::new(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn requiring_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_channels = channels.into_iter().map(Into::into).collect();
        self
    }
}

impl Default for GuardOptions {
    fn default() -> Self {
        Self::from_config(&GuardConfig::default())
    }
}

enum PrecheckResult {
    Healthy,
    Uncertain,
    Unhealthy(String),
}

pub struct PreflightGuard {
    config: GuardConfig,
    breaker: Arc<CircuitBreaker>,
    health: Arc<HealthMonitor>,
    channels: Arc<ChannelManager>,
}

impl PreflightGuard {
    pub fn new(
        config: GuardConfig,
        breaker: Arc<CircuitBreaker>,
        health: Arc<HealthMonitor>,
        channels: Arc<ChannelManager>,
    ) -> Self {
        Self {
            config,
            breaker,
            health,
            channels,
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Options pre-filled from configuration
    pub fn default_options(&self) -> GuardOptions {
        GuardOptions::from_config(&self.config)
    }

    /// Run `operation` behind the breaker and the pre-flight checks
    pub async fn guard<T, E, F, Fut>(
        &self,
        operation_name: &str,
        mut operation: F,
        options: GuardOptions,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: fmt::Display,
    {
        let started = Instant::now();

        self.breaker.check(operation_name)?;

        match self.precheck().await {
            PrecheckResult::Healthy => {}
            PrecheckResult::Unhealthy(reason) => {
                self.breaker.record_failure(started.elapsed());
                warn!(
                    component = components::PREFLIGHT_GUARD,
                    operation = %operation_name,
                    reason = %reason,
                    "🚫 Pre-check failed - operation not attempted"
                );
                return Err(ResilienceError::ConnectionUnhealthy { reason });
            }
            PrecheckResult::Uncertain => {
                info!(
                    component = components::PREFLIGHT_GUARD,
                    operation = %operation_name,
                    "Pre-check uncertain - forcing reconnect"
                );
                let outcome = self.health.force_reconnect().await;
                debug!(outcome = ?outcome, "Force reconnect before guarded operation");
                tokio::time::sleep(self.config.stabilization_wait()).await;
            }
        }

        if !options.required_channels.is_empty() {
            if let Err(e) = self
                .channels
                .wait_until_ready(&options.required_channels, self.config.channel_ready_timeout())
                .await
            {
                self.breaker.record_failure(started.elapsed());
                log_error(
                    components::PREFLIGHT_GUARD,
                    operation_name,
                    &e.to_string(),
                    Some("required channels not ready"),
                );
                return Err(e);
            }
        }

        let attempts = options.max_retries.saturating_add(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let attempt_started = Instant::now();
            match tokio::time::timeout(options.timeout, operation()).await {
                Ok(Ok(value)) => {
                    self.breaker.record_success(attempt_started.elapsed());
                    debug!(
                        component = components::PREFLIGHT_GUARD,
                        operation = %operation_name,
                        attempt,
                        "✅ Guarded operation succeeded"
                    );
                    return Ok(value);
                }
                Ok(Err(e)) => {
                    warn!(operation = %operation_name, attempt, attempts, error = %e, "Guarded operation failed");
                    last_error = Some(ResilienceError::OperationFailed {
                        operation: operation_name.to_string(),
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
                Err(_) => {
                    warn!(
                        operation = %operation_name,
                        attempt,
                        attempts,
                        timeout_ms = options.timeout.as_millis() as u64,
                        "⏱️ Guarded operation timed out"
                    );
                    last_error = Some(ResilienceError::OperationTimeout {
                        operation: operation_name.to_string(),
                        timeout: options.timeout,
                    });
                }
            }

            if attempt < attempts {
                tokio::time::sleep(options.retry_delay).await;
            }
        }

        self.breaker.record_failure(started.elapsed());
        let error = last_error.unwrap_or_else(|| ResilienceError::OperationFailed {
            operation: operation_name.to_string(),
            attempts,
            reason: "no attempt was made".to_string(),
        });
        log_error(components::PREFLIGHT_GUARD, operation_name, &error.to_string(), None);
        Err(error)
    }

    /// Bounded pre-check: a few short probes, stopping at the first healthy one
    async fn precheck(&self) -> PrecheckResult {
        let attempts = self.config.precheck_retries.saturating_add(1);
        let mut result = PrecheckResult::Uncertain;

        for attempt in 1..=attempts {
            result = match tokio::time::timeout(self.config.precheck_timeout(), self.health.probe())
                .await
            {
                Ok(ProbeVerdict::Healthy) => return PrecheckResult::Healthy,
                Ok(ProbeVerdict::Unhealthy { reason }) => PrecheckResult::Unhealthy(reason),
                Ok(ProbeVerdict::Uncertain { .. }) | Err(_) => PrecheckResult::Uncertain,
            };
            debug!(attempt, attempts, "Pre-check did not confirm health");
        }

        result
    }
}

impl fmt::Debug for PreflightGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreflightGuard")
            .field("breaker", &self.breaker.name())
            .finish()
    }
}
