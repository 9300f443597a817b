//! Shared mocks for integration tests.
//!
//! Every mock records its calls into a shared [`CallLog`] so tests can
//! assert cross-component ordering (channels before cache, tier order).

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use hotelops_sync::backend::{
    BackendServices, LivenessQuery, ReachabilityProbe, Session, SessionProvider,
};
use hotelops_sync::cache::{QueryCache, QueryKey, QueryPredicate, QuerySnapshot};
use hotelops_sync::config::SyncConfig;
use hotelops_sync::error::{BackendError, BackendResult};
use hotelops_sync::leader::LocalPeerBus;
use hotelops_sync::realtime::{ChannelState, RealtimeChannel, StatusCallback};
use hotelops_sync::system::ConnectionSystem;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Probe,
    Subscribe(String),
    Unsubscribe(String),
    Invalidate(Vec<QueryKey>),
    Refetch(Vec<QueryKey>),
}

#[derive(Debug, Clone)]
pub struct LoggedCall {
    pub call: Call,
    pub at: Instant,
}

/// Ordered record of calls across all mocks
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<LoggedCall>>>,
}

impl CallLog {
    pub fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(LoggedCall {
            call,
            at: Instant::now(),
        });
    }

    pub fn calls(&self) -> Vec<LoggedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn subscribes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|logged| match logged.call {
                Call::Subscribe(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn invalidations(&self) -> Vec<LoggedCall> {
        self.calls()
            .into_iter()
            .filter(|logged| matches!(logged.call, Call::Invalidate(_)))
            .collect()
    }

    pub fn probes(&self) -> usize {
        self.calls()
            .iter()
            .filter(|logged| logged.call == Call::Probe)
            .count()
    }
}

/// Reachability probe returning a scripted status
pub struct MockProbe {
    /// `None` simulates a network error
    status: Mutex<Option<u16>>,
    delay: Mutex<Option<Duration>>,
    log: CallLog,
}

impl MockProbe {
    pub fn new(log: CallLog) -> Arc<Self> {
        Arc::new(Self {
            status: Mutex::new(Some(200)),
            delay: Mutex::new(None),
            log,
        })
    }

    pub fn respond_with(&self, status: u16) {
        *self.status.lock().unwrap() = Some(status);
    }

    pub fn fail_network(&self) {
        *self.status.lock().unwrap() = None;
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl ReachabilityProbe for MockProbe {
    async fn probe(&self) -> BackendResult<u16> {
        self.log.record(Call::Probe);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let status = *self.status.lock().unwrap();
        status.ok_or_else(|| BackendError::Network("connection refused".to_string()))
    }
}

pub struct MockSession {
    session: Mutex<Option<Session>>,
    lookup_delay: Mutex<Option<Duration>>,
    refresh_fails: Mutex<bool>,
    pub refreshes: AtomicU32,
}

impl MockSession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            session: Mutex::new(Some(Session {
                user_id: "front-desk".to_string(),
                expires_at: Utc::now() + chrono::Duration::hours(1),
            })),
            lookup_delay: Mutex::new(None),
            refresh_fails: Mutex::new(false),
            refreshes: AtomicU32::new(0),
        })
    }

    pub fn expire_at(&self, expires_at: DateTime<Utc>) {
        if let Some(session) = self.session.lock().unwrap().as_mut() {
            session.expires_at = expires_at;
        }
    }

    pub fn set_lookup_delay(&self, delay: Option<Duration>) {
        *self.lookup_delay.lock().unwrap() = delay;
    }

    pub fn fail_refresh(&self, fails: bool) {
        *self.refresh_fails.lock().unwrap() = fails;
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.session.lock().unwrap().as_ref().map(|s| s.expires_at)
    }
}

#[async_trait]
impl SessionProvider for MockSession {
    async fn get_session(&self) -> BackendResult<Option<Session>> {
        let delay = *self.lookup_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.session.lock().unwrap().clone())
    }

    async fn refresh_session(&self) -> BackendResult<Session> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if *self.refresh_fails.lock().unwrap() {
            return Err(BackendError::Session("refresh token revoked".to_string()));
        }
        let mut session = self.session.lock().unwrap();
        let renewed = Session {
            user_id: "front-desk".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        };
        *session = Some(renewed.clone());
        Ok(renewed)
    }
}

pub struct MockLiveness {
    healthy: Mutex<bool>,
    pub pings: AtomicU32,
}

impl MockLiveness {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            healthy: Mutex::new(true),
            pings: AtomicU32::new(0),
        })
    }

    pub fn set_healthy(&self, healthy: bool) {
        *self.healthy.lock().unwrap() = healthy;
    }
}

#[async_trait]
impl LivenessQuery for MockLiveness {
    async fn ping(&self) -> BackendResult<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if *self.healthy.lock().unwrap() {
            Ok(())
        } else {
            Err(BackendError::Query("relation unavailable".to_string()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinBehavior {
    Join,
    Fail,
    /// Never reports a final state
    Hang,
}

/// Realtime channel whose subscribe outcome is scripted
pub struct MockChannel {
    id: String,
    state: Mutex<ChannelState>,
    behavior: Mutex<JoinBehavior>,
    join_delay: Mutex<Duration>,
    /// Held while hanging so the manager keeps waiting
    parked_callback: Mutex<Option<StatusCallback>>,
    log: CallLog,
    pub subscribe_calls: AtomicU32,
}

impl MockChannel {
    pub fn new(id: &str, initial: ChannelState, log: CallLog) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            state: Mutex::new(initial),
            behavior: Mutex::new(JoinBehavior::Join),
            join_delay: Mutex::new(Duration::ZERO),
            parked_callback: Mutex::new(None),
            log,
            subscribe_calls: AtomicU32::new(0),
        })
    }

    pub fn set_behavior(&self, behavior: JoinBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn set_join_delay(&self, delay: Duration) {
        *self.join_delay.lock().unwrap() = delay;
    }

    pub fn set_state(&self, state: ChannelState) {
        *self.state.lock().unwrap() = state;
    }
}

#[async_trait]
impl RealtimeChannel for MockChannel {
    async fn subscribe(&self, on_status: StatusCallback) -> BackendResult<()> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.log.record(Call::Subscribe(self.id.clone()));
        *self.state.lock().unwrap() = ChannelState::Joining;

        let behavior = *self.behavior.lock().unwrap();
        let delay = *self.join_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let next = match behavior {
            JoinBehavior::Join => ChannelState::Joined,
            JoinBehavior::Fail => ChannelState::Errored,
            JoinBehavior::Hang => {
                *self.parked_callback.lock().unwrap() = Some(on_status);
                return Ok(());
            }
        };
        *self.state.lock().unwrap() = next;
        on_status(next);
        Ok(())
    }

    async fn unsubscribe(&self) -> BackendResult<()> {
        self.log.record(Call::Unsubscribe(self.id.clone()));
        *self.state.lock().unwrap() = ChannelState::Closed;
        Ok(())
    }

    fn state(&self) -> ChannelState {
        *self.state.lock().unwrap()
    }
}

/// Query cache over a fixed set of snapshots
pub struct MockQueryCache {
    snapshots: Mutex<Vec<QuerySnapshot>>,
    log: CallLog,
}

impl MockQueryCache {
    pub fn new(log: CallLog) -> Arc<Self> {
        Arc::new(Self {
            snapshots: Mutex::new(Vec::new()),
            log,
        })
    }

    /// Add a query last updated `age` ago (`None` = never loaded)
    pub fn add_query(&self, key: &[&str], age: Option<Duration>, active: bool) {
        let now = Utc::now();
        self.snapshots.lock().unwrap().push(QuerySnapshot {
            key: QueryKey::new(key.iter().copied()),
            data_updated_at: age.map(|age| now - chrono::Duration::from_std(age).unwrap()),
            active,
        });
    }

    fn matching(&self, predicate: &QueryPredicate<'_>, active_only: bool) -> Vec<QueryKey> {
        self.snapshots
            .lock()
            .unwrap()
            .iter()
            .filter(|snapshot| !active_only || snapshot.active)
            .filter(|snapshot| predicate(&snapshot.key))
            .map(|snapshot| snapshot.key.clone())
            .collect()
    }
}

#[async_trait]
impl QueryCache for MockQueryCache {
    fn queries(&self) -> Vec<QuerySnapshot> {
        self.snapshots.lock().unwrap().clone()
    }

    async fn invalidate_queries(&self, predicate: &QueryPredicate<'_>) -> BackendResult<()> {
        let keys = self.matching(predicate, false);
        self.log.record(Call::Invalidate(keys));
        Ok(())
    }

    async fn refetch_active_queries(&self, predicate: &QueryPredicate<'_>) -> BackendResult<()> {
        let keys = self.matching(predicate, true);
        self.log.record(Call::Refetch(keys));
        Ok(())
    }
}

/// Configuration with short backoffs so failing probes finish quickly
pub fn test_config() -> SyncConfig {
    let mut config = SyncConfig::default();
    config.environment = "test".to_string();
    config.health.reachability_backoff_ms = 10;
    config
}

/// A fully wired system over mocks
pub struct TestHarness {
    pub system: ConnectionSystem,
    pub log: CallLog,
    pub probe: Arc<MockProbe>,
    pub session: Arc<MockSession>,
    pub liveness: Arc<MockLiveness>,
    pub cache: Arc<MockQueryCache>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: SyncConfig) -> Self {
        let log = CallLog::default();
        let probe = MockProbe::new(log.clone());
        let session = MockSession::new();
        let liveness = MockLiveness::new();
        let cache = MockQueryCache::new(log.clone());

        let services = BackendServices {
            reachability: probe.clone(),
            session: session.clone(),
            liveness: liveness.clone(),
        };
        let system = ConnectionSystem::bootstrap(
            config,
            services,
            cache.clone(),
            Arc::new(LocalPeerBus::default()),
        )
        .expect("test configuration is valid");

        Self {
            system,
            log,
            probe,
            session,
            liveness,
            cache,
        }
    }

    /// Register a mock channel and return its handle
    pub fn add_channel(
        &self,
        id: &str,
        priority: hotelops_sync::Priority,
        state: ChannelState,
    ) -> Arc<MockChannel> {
        let channel = MockChannel::new(id, state, self.log.clone());
        self.system.channels().register_channel(
            id,
            channel.clone(),
            hotelops_sync::ChannelOptions::new(id, priority),
        );
        channel
    }
}
