//! Shared names used in logs, events and diagnostics.

/// Component names attached to structured log records
pub mod components {
    pub const LEADER_COORDINATOR: &str = "leader_coordinator";
    pub const HEALTH_MONITOR: &str = "health_monitor";
    pub const CHANNEL_MANAGER: &str = "channel_manager";
    pub const CONNECTION_ORCHESTRATOR: &str = "connection_orchestrator";
    pub const PREFLIGHT_GUARD: &str = "preflight_guard";
    pub const DIAGNOSTICS: &str = "diagnostics";
}

/// Event names emitted for UI banners
pub mod events {
    pub const CONNECTION_STATUS_CHANGED: &str = "connection-status-changed";
    pub const CIRCUIT_BREAKER_OPENED: &str = "circuit-breaker-opened";
    pub const CIRCUIT_BREAKER_CLOSED: &str = "circuit-breaker-closed";
    pub const RECONNECTION_ATTEMPTED: &str = "reconnection-attempted";
    pub const HEALTH_CHANGED: &str = "health-changed";
    pub const CHANNEL_EVICTED: &str = "channel-evicted";
}

/// Reasons a recovery cycle was started
pub mod triggers {
    pub const TAB_VISIBLE: &str = "tab_visible";
    pub const CONNECTION_RESTORED: &str = "connection_restored";
    pub const MANUAL_TEST: &str = "manual_test";
}

/// Name of the breaker shared by every guarded call site
pub const SHARED_BREAKER_NAME: &str = "critical_operations";
