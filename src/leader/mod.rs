//! # Leader Election
//!
//! Sibling instances of one client session (several tabs, several windows)
//! elect a single instance to run health probes. Election is a deterministic
//! tie-break over a broadcast bus: every instance heartbeats, silent peers are
//! pruned, and the lowest live instance id leads. Mis-election only causes
//! redundant probing, so no consensus protocol is involved.

pub mod coordinator;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::BackendResult;

pub use coordinator::{LeaderCoordinator, LeaderStatus};

/// Messages exchanged between sibling instances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerMessage {
    Heartbeat { instance_id: Uuid, foreground: bool },
    /// Health verdict fanned out by whichever instance probed
    HealthStatus { instance_id: Uuid, healthy: bool },
    /// Graceful shutdown; peers drop the sender immediately
    Resign { instance_id: Uuid },
}

impl PeerMessage {
    pub fn instance_id(&self) -> Uuid {
        match self {
            PeerMessage::Heartbeat { instance_id, .. }
            | PeerMessage::HealthStatus { instance_id, .. }
            | PeerMessage::Resign { instance_id } => *instance_id,
        }
    }
}

/// Cross-instance broadcast channel
pub trait PeerBus: Send + Sync {
    fn broadcast(&self, message: PeerMessage) -> BackendResult<()>;

    fn subscribe(&self) -> broadcast::Receiver<PeerMessage>;
}

/// In-process bus for instances sharing one runtime
#[derive(Debug, Clone)]
pub struct LocalPeerBus {
    sender: broadcast::Sender<PeerMessage>,
}

impl LocalPeerBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for LocalPeerBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl PeerBus for LocalPeerBus {
    fn broadcast(&self, message: PeerMessage) -> BackendResult<()> {
        // No receivers just means no siblings are listening yet
        let _ = self.sender.send(message);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<PeerMessage> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_message_wire_format() {
        let id = Uuid::new_v4();
        let message = PeerMessage::HealthStatus {
            instance_id: id,
            healthy: false,
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "health_status");
        assert_eq!(json["healthy"], false);
        assert_eq!(message.instance_id(), id);
    }

    #[tokio::test]
    async fn test_local_bus_fans_out() {
        let bus = LocalPeerBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        let message = PeerMessage::Resign {
            instance_id: Uuid::new_v4(),
        };

        bus.broadcast(message.clone()).unwrap();

        assert_eq!(first.recv().await.unwrap(), message);
        assert_eq!(second.recv().await.unwrap(), message);
    }
}
