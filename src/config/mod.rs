//! # Sync Layer Configuration
//!
//! YAML-based configuration for the connection resilience layer. A single
//! `hotelops-sync.yaml` file carries the base values plus optional
//! `development` / `test` / `production` sections that are deep-merged over
//! the base for the active environment.
//!
//! Every section has a `Default` so a partial file is valid, and the whole
//! tree is checked by [`SyncConfig::validate`] before any service is built.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hotelops_sync::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let baseline = manager.config().health.baseline_interval();
//! let threshold = manager.config().circuit_breaker.failure_threshold;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::priority::Priority;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring hotelops-sync.yaml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Active environment, always overwritten by the loader
    pub environment: String,

    /// Remote data service endpoints
    pub backend: BackendConfig,

    /// Periodic health probing and session renewal
    pub health: HealthConfig,

    /// Realtime channel reconnection
    pub channels: ChannelConfig,

    /// Debounced connection status broadcast
    pub status: StatusConfig,

    /// Visibility and recovery sequencing
    pub orchestrator: OrchestratorConfig,

    /// Staged cache invalidation
    pub cache: CacheConfig,

    /// Shared breaker guarding critical operations
    pub circuit_breaker: CircuitBreakerSettings,

    /// Pre-flight guard bounds
    pub guard: GuardConfig,

    /// Cross-instance leader election
    pub leader: LeaderConfig,

    /// Operator diagnostics
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the remote data service, probed with a bare GET
    pub base_url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Interval after a successful probe, also the ceiling for backoff
    pub baseline_interval_seconds: u64,
    /// Interval after the first consecutive failure, doubled per further failure
    pub failure_interval_floor_seconds: u64,
    /// Renew the session when less than this much lifetime remains
    pub session_refresh_threshold_seconds: u64,
    pub reachability_attempts: u32,
    pub reachability_backoff_ms: u64,
    pub reachability_timeout_ms: u64,
    /// Session lookup bound while the instance is in the foreground
    pub foreground_session_timeout_ms: u64,
    /// Session lookup bound while the instance is backgrounded
    pub background_session_timeout_ms: u64,
    pub liveness_timeout_ms: u64,
    pub force_reconnect_timeout_ms: u64,
    /// A healthy notification inside this window of the previous one is held
    /// until the window closes, then sent if still healthy
    pub healthy_notification_debounce_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            baseline_interval_seconds: 300,
            failure_interval_floor_seconds: 15,
            session_refresh_threshold_seconds: 20 * 60,
            reachability_attempts: 3,
            reachability_backoff_ms: 1000,
            reachability_timeout_ms: 5000,
            foreground_session_timeout_ms: 3000,
            background_session_timeout_ms: 10_000,
            liveness_timeout_ms: 5000,
            force_reconnect_timeout_ms: 15_000,
            healthy_notification_debounce_ms: 5000,
        }
    }
}

impl HealthConfig {
    pub fn baseline_interval(&self) -> Duration {
        Duration::from_secs(self.baseline_interval_seconds)
    }

    pub fn failure_interval_floor(&self) -> Duration {
        Duration::from_secs(self.failure_interval_floor_seconds)
    }

    pub fn session_refresh_threshold(&self) -> Duration {
        Duration::from_secs(self.session_refresh_threshold_seconds)
    }

    pub fn reachability_backoff(&self) -> Duration {
        Duration::from_millis(self.reachability_backoff_ms)
    }

    pub fn reachability_timeout(&self) -> Duration {
        Duration::from_millis(self.reachability_timeout_ms)
    }

    pub fn session_timeout(&self, foreground: bool) -> Duration {
        if foreground {
            Duration::from_millis(self.foreground_session_timeout_ms)
        } else {
            Duration::from_millis(self.background_session_timeout_ms)
        }
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    pub fn force_reconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.force_reconnect_timeout_ms)
    }

    pub fn healthy_notification_debounce(&self) -> Duration {
        Duration::from_millis(self.healthy_notification_debounce_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Pause between priority tiers during `reconnect_all`
    pub tier_pause_ms: u64,
    /// Pause between unsubscribe and resubscribe of a single channel
    pub resubscribe_pause_ms: u64,
    pub subscribe_timeout_ms: u64,
    pub default_retry_limit: u32,
    /// Passive scan period; the scan only reports, it never repairs
    pub health_scan_interval_seconds: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            tier_pause_ms: 100,
            resubscribe_pause_ms: 100,
            subscribe_timeout_ms: 10_000,
            default_retry_limit: 10,
            health_scan_interval_seconds: 30,
        }
    }
}

impl ChannelConfig {
    pub fn tier_pause(&self) -> Duration {
        Duration::from_millis(self.tier_pause_ms)
    }

    pub fn resubscribe_pause(&self) -> Duration {
        Duration::from_millis(self.resubscribe_pause_ms)
    }

    pub fn subscribe_timeout(&self) -> Duration {
        Duration::from_millis(self.subscribe_timeout_ms)
    }

    pub fn health_scan_interval(&self) -> Duration {
        Duration::from_secs(self.health_scan_interval_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StatusConfig {
    /// A `disconnected` observation must persist this long before it is broadcast
    pub disconnect_stabilization_ms: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            disconnect_stabilization_ms: 3000,
        }
    }
}

impl StatusConfig {
    pub fn disconnect_stabilization(&self) -> Duration {
        Duration::from_millis(self.disconnect_stabilization_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Visibility signals arriving within this window of the previous one are discarded
    pub visibility_debounce_ms: u64,
    /// Quiet period required after a restore signal before recovery starts
    pub restore_debounce_ms: u64,
    /// Pause between channel reconnection and cache invalidation
    pub post_channel_stabilization_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            visibility_debounce_ms: 1000,
            restore_debounce_ms: 2000,
            post_channel_stabilization_ms: 500,
        }
    }
}

impl OrchestratorConfig {
    pub fn visibility_debounce(&self) -> Duration {
        Duration::from_millis(self.visibility_debounce_ms)
    }

    pub fn restore_debounce(&self) -> Duration {
        Duration::from_millis(self.restore_debounce_ms)
    }

    pub fn post_channel_stabilization(&self) -> Duration {
        Duration::from_millis(self.post_channel_stabilization_ms)
    }
}

/// Per-tier timing for staged cache invalidation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct TierTiming {
    /// Offset from the start of the invalidation phase
    pub wave_delay_ms: u64,
    /// Queries not updated for this long are stale
    pub stale_after_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub critical: TierTiming,
    pub high: TierTiming,
    pub normal: TierTiming,
    /// Query-key first segment → priority tier
    pub priorities: HashMap<String, Priority>,
    /// Tier for keys not listed in `priorities`
    pub default_priority: Priority,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let priorities = [
            ("rooms", Priority::Critical),
            ("room_status", Priority::Critical),
            ("pos_orders", Priority::Critical),
            ("pricing", Priority::High),
            ("pricing_approvals", Priority::High),
            ("sms_templates", Priority::Normal),
            ("sms_log", Priority::Normal),
            ("qr_codes", Priority::Normal),
        ]
        .into_iter()
        .map(|(key, priority)| (key.to_string(), priority))
        .collect();

        Self {
            critical: TierTiming {
                wave_delay_ms: 0,
                stale_after_seconds: 30,
            },
            high: TierTiming {
                wave_delay_ms: 500,
                stale_after_seconds: 60,
            },
            normal: TierTiming {
                wave_delay_ms: 1500,
                stale_after_seconds: 120,
            },
            priorities,
            default_priority: Priority::Normal,
        }
    }
}

impl CacheConfig {
    pub fn timing(&self, priority: Priority) -> TierTiming {
        match priority {
            Priority::Critical => self.critical,
            Priority::High => self.high,
            Priority::Normal => self.normal,
        }
    }

    pub fn wave_delay(&self, priority: Priority) -> Duration {
        Duration::from_millis(self.timing(priority).wave_delay_ms)
    }

    pub fn stale_after(&self, priority: Priority) -> Duration {
        Duration::from_secs(self.timing(priority).stale_after_seconds)
    }

    /// Classify a query key segment into a tier
    pub fn priority_for(&self, segment: &str) -> Priority {
        self.priorities
            .get(segment)
            .copied()
            .unwrap_or(self.default_priority)
    }
}

/// Circuit breaker configuration from YAML
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures before the breaker opens
    pub failure_threshold: u32,
    /// Time since the last failure before an open breaker admits a trial call
    pub cooldown_seconds: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_seconds: 30,
        }
    }
}

impl CircuitBreakerSettings {
    /// Convert to resilience module's format
    pub fn to_resilience_config(&self) -> crate::resilience::CircuitBreakerConfig {
        crate::resilience::CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            cooldown: Duration::from_secs(self.cooldown_seconds),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GuardConfig {
    pub precheck_timeout_ms: u64,
    pub precheck_retries: u32,
    /// Wait after a force-reconnect triggered by an uncertain pre-check
    pub stabilization_wait_ms: u64,
    pub channel_ready_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub operation_timeout_ms: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            precheck_timeout_ms: 3000,
            precheck_retries: 2,
            stabilization_wait_ms: 500,
            channel_ready_timeout_ms: 5000,
            max_retries: 2,
            retry_delay_ms: 1000,
            operation_timeout_ms: 10_000,
        }
    }
}

impl GuardConfig {
    pub fn precheck_timeout(&self) -> Duration {
        Duration::from_millis(self.precheck_timeout_ms)
    }

    pub fn stabilization_wait(&self) -> Duration {
        Duration::from_millis(self.stabilization_wait_ms)
    }

    pub fn channel_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.channel_ready_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LeaderConfig {
    /// When disabled every instance probes
    pub enabled: bool,
    pub heartbeat_interval_ms: u64,
    /// Peers silent for longer than this are dropped from the election
    pub heartbeat_timeout_ms: u64,
    /// Let a foreground follower probe too
    pub foreground_fallback: bool,
}

impl Default for LeaderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            heartbeat_interval_ms: 2000,
            heartbeat_timeout_ms: 6000,
            foreground_fallback: true,
        }
    }
}

impl LeaderConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub max_monitor_duration_seconds: u64,
    pub sample_interval_ms: u64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            max_monitor_duration_seconds: 300,
            sample_interval_ms: 1000,
        }
    }
}

impl DiagnosticsConfig {
    pub fn max_monitor_duration(&self) -> Duration {
        Duration::from_secs(self.max_monitor_duration_seconds)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

impl SyncConfig {
    /// Validate configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "backend.base_url",
                "backend configuration",
            ));
        }

        if !(self.backend.base_url.starts_with("http://")
            || self.backend.base_url.starts_with("https://"))
        {
            return Err(ConfigurationError::invalid_value(
                "backend.base_url",
                self.backend.base_url.clone(),
                "base URL must use http or https",
            ));
        }

        if self.health.baseline_interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "health.baseline_interval_seconds",
                "0",
                "baseline interval must be greater than 0",
            ));
        }

        if self.health.failure_interval_floor_seconds == 0
            || self.health.failure_interval_floor_seconds > self.health.baseline_interval_seconds
        {
            return Err(ConfigurationError::invalid_value(
                "health.failure_interval_floor_seconds",
                self.health.failure_interval_floor_seconds.to_string(),
                "failure interval floor must be between 1 and the baseline interval",
            ));
        }

        if self.health.reachability_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "health.reachability_attempts",
                "0",
                "at least one reachability attempt is required",
            ));
        }

        if self.health.foreground_session_timeout_ms > self.health.background_session_timeout_ms {
            return Err(ConfigurationError::invalid_value(
                "health.foreground_session_timeout_ms",
                self.health.foreground_session_timeout_ms.to_string(),
                "foreground session timeout must not exceed the background timeout",
            ));
        }

        if self.channels.subscribe_timeout_ms <= self.health.reachability_timeout_ms {
            return Err(ConfigurationError::invalid_value(
                "channels.subscribe_timeout_ms",
                self.channels.subscribe_timeout_ms.to_string(),
                "resubscription timeout must be longer than the probe timeout",
            ));
        }

        if self.channels.default_retry_limit == 0 {
            return Err(ConfigurationError::invalid_value(
                "channels.default_retry_limit",
                "0",
                "retry limit must be greater than 0",
            ));
        }

        let critical = self.cache.critical;
        let high = self.cache.high;
        let normal = self.cache.normal;
        if !(critical.wave_delay_ms <= high.wave_delay_ms
            && high.wave_delay_ms <= normal.wave_delay_ms)
        {
            return Err(ConfigurationError::invalid_value(
                "cache.*.wave_delay_ms",
                format!(
                    "{}/{}/{}",
                    critical.wave_delay_ms, high.wave_delay_ms, normal.wave_delay_ms
                ),
                "wave delays must be non-decreasing from critical to normal",
            ));
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigurationError::invalid_value(
                "circuit_breaker.failure_threshold",
                "0",
                "failure threshold must be greater than 0",
            ));
        }

        if self.circuit_breaker.cooldown_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "circuit_breaker.cooldown_seconds",
                "0",
                "cooldown must be greater than 0",
            ));
        }

        if self.guard.operation_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "guard.operation_timeout_ms",
                "0",
                "operation timeout must be greater than 0",
            ));
        }

        if self.leader.heartbeat_timeout_ms <= self.leader.heartbeat_interval_ms {
            return Err(ConfigurationError::invalid_value(
                "leader.heartbeat_timeout_ms",
                self.leader.heartbeat_timeout_ms.to_string(),
                "heartbeat timeout must exceed the heartbeat interval",
            ));
        }

        if self.diagnostics.sample_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "diagnostics.sample_interval_ms",
                "0",
                "sample interval must be greater than 0",
            ));
        }

        Ok(())
    }

    pub fn is_test_environment(&self) -> bool {
        self.environment == "test"
    }

    pub fn is_production_environment(&self) -> bool {
        self.environment == "production"
    }
}
