//! Heartbeat-based leader coordinator.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{PeerBus, PeerMessage};
use crate::config::LeaderConfig;
use crate::constants::components;
use crate::events::{ListenerRegistry, Subscription};
use crate::visibility::VisibilityTracker;

/// Serializable view of the election for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderStatus {
    pub instance_id: Uuid,
    pub is_leader: bool,
    pub live_peers: Vec<Uuid>,
}

pub struct LeaderCoordinator {
    instance_id: Uuid,
    config: LeaderConfig,
    bus: Arc<dyn PeerBus>,
    visibility: Arc<VisibilityTracker>,
    /// Peer id → last time we heard from it
    peers: Mutex<HashMap<Uuid, Instant>>,
    peer_health: ListenerRegistry<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    was_leader: Mutex<Option<bool>>,
}

impl LeaderCoordinator {
    pub fn new(
        config: LeaderConfig,
        bus: Arc<dyn PeerBus>,
        visibility: Arc<VisibilityTracker>,
    ) -> Arc<Self> {
        Self::with_instance_id(Uuid::new_v4(), config, bus, visibility)
    }

    pub fn with_instance_id(
        instance_id: Uuid,
        config: LeaderConfig,
        bus: Arc<dyn PeerBus>,
        visibility: Arc<VisibilityTracker>,
    ) -> Arc<Self> {
        debug!(
            component = components::LEADER_COORDINATOR,
            instance_id = %instance_id,
            enabled = config.enabled,
            "Leader coordinator created"
        );

        Arc::new(Self {
            instance_id,
            config,
            bus,
            visibility,
            peers: Mutex::new(HashMap::new()),
            peer_health: ListenerRegistry::new(),
            tasks: Mutex::new(Vec::new()),
            was_leader: Mutex::new(None),
        })
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Ids of peers heard from within the heartbeat timeout, sorted
    pub fn live_peers(&self) -> Vec<Uuid> {
        let timeout = self.config.heartbeat_timeout();
        let mut peers = self.peers.lock();
        peers.retain(|_, last_seen| last_seen.elapsed() <= timeout);

        let mut live: Vec<Uuid> = peers.keys().copied().collect();
        live.sort();
        live
    }

    /// Lowest live instance id leads; always true when election is disabled
    pub fn is_leader(&self) -> bool {
        if !self.config.enabled {
            return true;
        }

        let leader = self
            .live_peers()
            .first()
            .map_or(true, |lowest_peer| self.instance_id < *lowest_peer);

        let mut was_leader = self.was_leader.lock();
        if *was_leader != Some(leader) {
            *was_leader = Some(leader);
            info!(
                component = components::LEADER_COORDINATOR,
                instance_id = %self.instance_id,
                leader,
                "👑 Leadership changed"
            );
        }
        leader
    }

    /// Whether this instance should run the next health probe
    pub fn should_run_health_check(&self) -> bool {
        self.is_leader() || (self.config.foreground_fallback && self.visibility.is_foreground())
    }

    /// Fan a health verdict out to sibling instances
    pub fn broadcast_health_status(&self, healthy: bool) {
        let message = PeerMessage::HealthStatus {
            instance_id: self.instance_id,
            healthy,
        };
        if let Err(e) = self.bus.broadcast(message) {
            warn!(
                component = components::LEADER_COORDINATOR,
                error = %e,
                "Failed to broadcast health status"
            );
        }
    }

    /// Listen for health verdicts broadcast by other instances
    pub fn on_peer_health<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.peer_health.subscribe(listener)
    }

    /// Apply one message received from the bus
    pub fn handle_message(&self, message: PeerMessage) {
        let sender = message.instance_id();
        if sender == self.instance_id {
            return;
        }

        match message {
            PeerMessage::Heartbeat { .. } => {
                self.peers.lock().insert(sender, Instant::now());
            }
            PeerMessage::HealthStatus { healthy, .. } => {
                self.peers.lock().insert(sender, Instant::now());
                debug!(from = %sender, healthy, "Peer health status received");
                self.peer_health.notify(&healthy);
            }
            PeerMessage::Resign { .. } => {
                self.peers.lock().remove(&sender);
                debug!(from = %sender, "Peer resigned");
            }
        }
    }

    fn heartbeat(&self) {
        let message = PeerMessage::Heartbeat {
            instance_id: self.instance_id,
            foreground: self.visibility.is_foreground(),
        };
        if let Err(e) = self.bus.broadcast(message) {
            debug!(error = %e, "Heartbeat broadcast failed");
        }
    }

    /// Start heartbeating and listening to peers
    pub fn start(self: &Arc<Self>) {
        if !self.config.enabled {
            return;
        }

        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }

        let mut receiver = self.bus.subscribe();
        let listener = Arc::downgrade(self);
        tasks.push(tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => {
                        let Some(coordinator) = listener.upgrade() else {
                            break;
                        };
                        coordinator.handle_message(message);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Peer bus lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));

        let heartbeat = Arc::downgrade(self);
        let period = self.config.heartbeat_interval();
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Some(coordinator) = heartbeat.upgrade() else {
                    break;
                };
                coordinator.heartbeat();
            }
        }));

        info!(
            component = components::LEADER_COORDINATOR,
            instance_id = %self.instance_id,
            heartbeat_ms = self.config.heartbeat_interval_ms,
            "✅ Leader coordinator started"
        );
    }

    /// Stop background tasks and resign so peers re-elect immediately
    pub fn stop(&self) {
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        if tasks.is_empty() {
            return;
        }
        for task in tasks {
            task.abort();
        }

        let _ = self.bus.broadcast(PeerMessage::Resign {
            instance_id: self.instance_id,
        });
        info!(
            component = components::LEADER_COORDINATOR,
            instance_id = %self.instance_id,
            "🛑 Leader coordinator stopped"
        );
    }

    pub fn status(&self) -> LeaderStatus {
        LeaderStatus {
            instance_id: self.instance_id,
            is_leader: self.is_leader(),
            live_peers: self.live_peers(),
        }
    }
}

impl fmt::Debug for LeaderCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaderCoordinator")
            .field("instance_id", &self.instance_id)
            .field("enabled", &self.config.enabled)
            .finish()
    }
}

impl Drop for LeaderCoordinator {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}
