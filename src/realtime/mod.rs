//! # Realtime Channels
//!
//! Types shared between the realtime transport seam and the
//! [`ChannelManager`], which owns the registry of live subscriptions and
//! performs prioritized, staged reconnection.

pub mod manager;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::BackendResult;
use crate::priority::Priority;

pub use manager::{ChannelManager, ChannelStats, ReconnectSummary};

/// Lifecycle state exposed by a realtime channel handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Joining,
    Joined,
    Closed,
    Errored,
}

impl ChannelState {
    /// Joined or on its way there; a refresh would be redundant
    pub fn is_live(&self) -> bool {
        matches!(self, ChannelState::Joining | ChannelState::Joined)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, ChannelState::Closed | ChannelState::Errored)
    }
}

/// Invoked by the transport on every channel state change
pub type StatusCallback = Arc<dyn Fn(ChannelState) + Send + Sync>;

/// A live publish/subscribe subscription for one data topic
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Start (or restart) the subscription. State changes, including the
    /// final `Joined` / `Errored`, are reported through `on_status`.
    async fn subscribe(&self, on_status: StatusCallback) -> BackendResult<()>;

    async fn unsubscribe(&self) -> BackendResult<()>;

    fn state(&self) -> ChannelState;
}

/// Options supplied by a consumer when registering a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Domain tag such as "rooms" or "pos_orders"
    pub channel_type: String,
    pub priority: Priority,
    /// Falls back to `channels.default_retry_limit` when `None`
    pub retry_limit: Option<u32>,
}

impl ChannelOptions {
    pub fn new(channel_type: impl Into<String>, priority: Priority) -> Self {
        Self {
            channel_type: channel_type.into(),
            priority,
            retry_limit: None,
        }
    }

    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = Some(retry_limit);
        self
    }
}

/// Registry record for one channel id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelRegistration {
    pub id: String,
    pub channel_type: String,
    pub priority: Priority,
    pub state: ChannelState,
    pub reconnect_attempts: u32,
    pub retry_limit: u32,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}
