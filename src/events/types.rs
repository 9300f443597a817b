//! Typed events broadcast to external UI banners and diagnostics consumers.

use serde::Serialize;

use crate::constants::events as names;
use crate::status::ConnectionStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectionEvent {
    /// Debounced connected/disconnected transition
    StatusChanged { status: ConnectionStatus },
    /// Breaker tripped; carries a human-readable recovery estimate
    CircuitBreakerOpened { cooldown_secs: u64, message: String },
    CircuitBreakerClosed,
    ReconnectionAttempted { trigger: String, succeeded: bool },
    HealthChanged { healthy: bool },
    ChannelEvicted { channel_id: String, attempts: u32 },
}

impl ConnectionEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionEvent::StatusChanged { .. } => names::CONNECTION_STATUS_CHANGED,
            ConnectionEvent::CircuitBreakerOpened { .. } => names::CIRCUIT_BREAKER_OPENED,
            ConnectionEvent::CircuitBreakerClosed => names::CIRCUIT_BREAKER_CLOSED,
            ConnectionEvent::ReconnectionAttempted { .. } => names::RECONNECTION_ATTEMPTED,
            ConnectionEvent::HealthChanged { .. } => names::HEALTH_CHANGED,
            ConnectionEvent::ChannelEvicted { .. } => names::CHANNEL_EVICTED,
        }
    }
}
