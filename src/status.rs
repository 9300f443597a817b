//! # Connection Status
//!
//! Debounced `connected | disconnected` value broadcast to listeners.
//! Transitions to `Connected` apply immediately; a `Disconnected` observation
//! must persist for the stabilization window before it is broadcast, so
//! momentary blips never flicker the banner.
//!
//! ```rust
//! use hotelops_sync::events::EventPublisher;
//! use hotelops_sync::status::{ConnectionStatus, ConnectionStatusTracker};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let tracker = ConnectionStatusTracker::new(Duration::from_secs(3), EventPublisher::default());
//! let changes = tracker.watch();
//!
//! tracker.report(ConnectionStatus::Connected);
//! assert!(tracker.current().is_connected());
//! assert!(!changes.has_changed().unwrap());
//! # });
//! ```

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::events::{ConnectionEvent, EventPublisher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

#[derive(Debug)]
struct PendingState {
    /// Bumped on every observation; a pending disconnect commits only if unchanged
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

#[derive(Debug)]
pub struct ConnectionStatusTracker {
    stabilization: Duration,
    publisher: EventPublisher,
    sender: watch::Sender<ConnectionStatus>,
    state: Mutex<PendingState>,
}

impl ConnectionStatusTracker {
    pub fn new(stabilization: Duration, publisher: EventPublisher) -> Arc<Self> {
        let (sender, _) = watch::channel(ConnectionStatus::Connected);
        Arc::new(Self {
            stabilization,
            publisher,
            sender,
            state: Mutex::new(PendingState {
                generation: 0,
                pending: None,
            }),
        })
    }

    /// Current debounced status
    pub fn current(&self) -> ConnectionStatus {
        *self.sender.borrow()
    }

    /// Receiver that observes every committed status change
    pub fn watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.sender.subscribe()
    }

    /// Feed a raw observation into the debouncer
    pub fn report(self: &Arc<Self>, observed: ConnectionStatus) {
        let mut state = self.state.lock();

        match observed {
            ConnectionStatus::Connected => {
                state.generation += 1;
                if let Some(pending) = state.pending.take() {
                    pending.abort();
                    debug!("Pending disconnect cancelled by reconnect");
                }
                drop(state);
                self.commit(ConnectionStatus::Connected);
            }
            ConnectionStatus::Disconnected => {
                if self.current() == ConnectionStatus::Disconnected {
                    return;
                }
                if state.pending.as_ref().is_some_and(|task| !task.is_finished()) {
                    return;
                }

                state.generation += 1;
                let generation = state.generation;
                let tracker = Arc::clone(self);
                state.pending = Some(tokio::spawn(async move {
                    tokio::time::sleep(tracker.stabilization).await;
                    let mut state = tracker.state.lock();
                    // Any later observation supersedes this one
                    if state.generation != generation {
                        return;
                    }
                    state.pending = None;
                    drop(state);
                    tracker.commit(ConnectionStatus::Disconnected);
                }));
            }
        }
    }

    fn commit(&self, status: ConnectionStatus) {
        let changed = self.sender.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });

        if changed {
            info!(status = ?status, "🔌 Connection status changed");
            self.publisher
                .publish(ConnectionEvent::StatusChanged { status });
        }
    }
}
