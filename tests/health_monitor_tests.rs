//! Health monitor probing, backoff and reconnect tests

mod common;

use chrono::Utc;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{test_config, CallLog, MockLiveness, MockQueryCache, MockSession, TestHarness};
use hotelops_sync::backend::BackendServices;
use hotelops_sync::leader::LocalPeerBus;
use hotelops_sync::system::ConnectionSystem;
use hotelops_sync::events::ConnectionEvent;
use hotelops_sync::{ChannelState, Priority, ProbeVerdict, ReconnectOutcome};

#[tokio::test(start_paused = true)]
async fn test_interval_backs_off_from_floor_to_baseline() {
    let harness = TestHarness::new();
    let health = harness.system.health();
    harness.probe.fail_network();

    let mut intervals = Vec::new();
    for _ in 0..6 {
        assert!(!health.check_health().await);
        intervals.push(health.state().current_interval().as_secs());
    }
    assert_eq!(intervals, vec![15, 30, 60, 120, 240, 300]);
    assert_eq!(health.state().consecutive_failures, 6);

    harness.probe.respond_with(200);
    assert!(health.check_health().await);
    let state = health.state();
    assert_eq!(state.consecutive_failures, 0);
    assert_eq!(state.current_interval(), Duration::from_secs(300));
}

#[tokio::test(start_paused = true)]
async fn test_reachability_retries_before_failing() {
    let harness = TestHarness::new();
    harness.probe.respond_with(502);

    let verdict = harness.system.health().probe().await;

    assert!(matches!(verdict, ProbeVerdict::Unhealthy { .. }));
    assert!(verdict.reason().unwrap().contains("3 attempt(s)"));
    assert_eq!(harness.log.probes(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_response_counts_as_reachable() {
    let harness = TestHarness::new();
    harness.probe.respond_with(401);

    assert_eq!(harness.system.health().probe().await, ProbeVerdict::Healthy);
    assert_eq!(harness.log.probes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_check_assumes_healthy() {
    let harness = TestHarness::new();
    harness.probe.fail_network();
    harness.probe.set_delay(Some(Duration::from_secs(1)));
    let health = harness.system.health();

    let (first, second) = tokio::join!(health.check_health(), health.check_health());

    let mut results = vec![first, second];
    results.sort();
    assert_eq!(results, vec![false, true]);
    let stats = health.stats();
    assert_eq!(stats.checks_run, 1);
    assert_eq!(stats.checks_collapsed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_session_renewed_when_close_to_expiry() {
    let harness = TestHarness::new();
    harness
        .session
        .expire_at(Utc::now() + chrono::Duration::minutes(10));

    assert_eq!(harness.system.health().probe().await, ProbeVerdict::Healthy);

    assert_eq!(harness.session.refreshes.load(Ordering::SeqCst), 1);
    let renewed = harness.session.expires_at().unwrap();
    assert!(renewed > Utc::now() + chrono::Duration::minutes(50));
    assert_eq!(harness.system.health().stats().session_refreshes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_fresh_session_is_not_renewed() {
    let harness = TestHarness::new();

    harness.system.health().probe().await;

    assert_eq!(harness.session.refreshes.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_renewal_before_expiry_stays_healthy() {
    let harness = TestHarness::new();
    harness
        .session
        .expire_at(Utc::now() + chrono::Duration::minutes(5));
    harness.session.fail_refresh(true);

    assert_eq!(harness.system.health().probe().await, ProbeVerdict::Healthy);
    assert_eq!(harness.system.health().stats().session_refresh_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_renewal_after_expiry_is_unhealthy() {
    let harness = TestHarness::new();
    harness
        .session
        .expire_at(Utc::now() - chrono::Duration::seconds(5));
    harness.session.fail_refresh(true);

    let verdict = harness.system.health().probe().await;

    assert!(matches!(verdict, ProbeVerdict::Unhealthy { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_slow_session_lookup_in_foreground_is_uncertain() {
    let harness = TestHarness::new();
    harness.session.set_lookup_delay(Some(Duration::from_secs(5)));
    let health = harness.system.health();

    let verdict = health.probe().await;
    assert!(matches!(verdict, ProbeVerdict::Uncertain { .. }));
    assert!(verdict.counts_as_healthy());

    assert!(health.check_health().await);
    assert!(health.is_healthy());
}

#[tokio::test(start_paused = true)]
async fn test_background_session_lookup_gets_longer_bound() {
    let harness = TestHarness::new();
    harness.session.set_lookup_delay(Some(Duration::from_secs(5)));
    harness.system.visibility().set_foreground(false);

    assert_eq!(harness.system.health().probe().await, ProbeVerdict::Healthy);
}

#[tokio::test(start_paused = true)]
async fn test_liveness_failure_is_unhealthy() {
    let harness = TestHarness::new();
    harness.liveness.set_healthy(false);

    let verdict = harness.system.health().probe().await;

    assert!(matches!(verdict, ProbeVerdict::Unhealthy { .. }));
    assert!(verdict.reason().unwrap().contains("liveness"));
    assert_eq!(harness.liveness.pings.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transitions_notify_and_healthy_flaps_are_debounced() {
    let harness = TestHarness::new();
    let health = harness.system.health();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _subscription = health.on_health_change(move |healthy| {
        sink.lock().unwrap().push(*healthy);
    });

    // Already healthy: no transition, no notification
    health.check_health().await;

    harness.probe.fail_network();
    health.check_health().await;
    harness.probe.respond_with(200);
    health.check_health().await;
    harness.probe.fail_network();
    health.check_health().await;
    harness.probe.respond_with(200);
    health.check_health().await;

    // The second recovery lands inside the debounce window and is held back
    assert!(health.is_healthy());
    assert_eq!(*seen.lock().unwrap(), vec![false, true, false]);

    // ...but listeners still hear it once the window closes
    tokio::time::advance(Duration::from_secs(6)).await;
    tokio::task::yield_now().await;
    assert_eq!(*seen.lock().unwrap(), vec![false, true, false, true]);

    harness.probe.fail_network();
    health.check_health().await;
    harness.probe.respond_with(200);
    health.check_health().await;
    assert_eq!(*seen.lock().unwrap(), vec![false, true, false, true, false]);

    tokio::time::advance(Duration::from_secs(5)).await;
    tokio::task::yield_now().await;
    assert_eq!(
        *seen.lock().unwrap(),
        vec![false, true, false, true, false, true]
    );
}

#[tokio::test(start_paused = true)]
async fn test_deferred_healthy_notification_dropped_when_health_fails_again() {
    let harness = TestHarness::new();
    let health = harness.system.health();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _subscription = health.on_health_change(move |healthy| {
        sink.lock().unwrap().push(*healthy);
    });

    harness.probe.fail_network();
    health.check_health().await;
    harness.probe.respond_with(200);
    health.check_health().await;
    harness.probe.fail_network();
    health.check_health().await;
    harness.probe.respond_with(200);
    health.check_health().await;
    harness.probe.fail_network();
    health.check_health().await;

    tokio::time::advance(Duration::from_secs(10)).await;
    tokio::task::yield_now().await;

    assert!(!health.is_healthy());
    assert_eq!(*seen.lock().unwrap(), vec![false, true, false]);
}

#[tokio::test(start_paused = true)]
async fn test_health_transitions_are_published() {
    let harness = TestHarness::new();
    let mut events = harness.system.subscribe_events();
    harness.probe.fail_network();

    harness.system.health().check_health().await;

    let published = events.recv().await.unwrap();
    assert_eq!(
        published.event,
        ConnectionEvent::HealthChanged { healthy: false }
    );
}

#[tokio::test(start_paused = true)]
async fn test_force_reconnect_renews_session_and_rejoins_channels() {
    let harness = TestHarness::new();
    let rooms = harness.add_channel("rooms", Priority::Critical, ChannelState::Errored);
    harness.probe.fail_network();
    harness.system.health().check_health().await;
    harness.probe.respond_with(200);

    let outcome = harness.system.health().force_reconnect().await;

    assert_eq!(outcome, ReconnectOutcome::Reconnected);
    assert_eq!(harness.session.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(rooms.subscribe_calls.load(Ordering::SeqCst), 1);
    assert!(harness.system.health().is_healthy());
}

#[tokio::test(start_paused = true)]
async fn test_force_reconnect_fails_when_backend_down() {
    let harness = TestHarness::new();
    let rooms = harness.add_channel("rooms", Priority::Critical, ChannelState::Errored);
    harness.probe.fail_network();

    let outcome = harness.system.health().force_reconnect().await;

    assert_eq!(outcome, ReconnectOutcome::Failed);
    assert_eq!(rooms.subscribe_calls.load(Ordering::SeqCst), 0);
    assert!(!harness.system.health().is_healthy());
    assert_eq!(harness.system.health().stats().force_reconnect_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_force_reconnect_is_reentrancy_guarded() {
    let harness = TestHarness::new();
    harness.probe.set_delay(Some(Duration::from_secs(1)));
    let health = harness.system.health();

    let (first, second) = tokio::join!(health.force_reconnect(), health.force_reconnect());

    let outcomes = [first, second];
    assert!(outcomes.contains(&ReconnectOutcome::Reconnected));
    assert!(outcomes.contains(&ReconnectOutcome::AlreadyInProgress));
    assert!(!health.is_reconnecting());
}

#[tokio::test(start_paused = true)]
async fn test_force_reconnect_is_time_boxed() {
    let mut config = test_config();
    config.health.reachability_timeout_ms = 60_000;
    config.channels.subscribe_timeout_ms = 120_000;
    let harness = TestHarness::with_config(config);
    harness.probe.set_delay(Some(Duration::from_secs(30)));

    let started = tokio::time::Instant::now();
    let outcome = harness.system.health().force_reconnect().await;

    assert_eq!(outcome, ReconnectOutcome::TimedOut);
    assert!(started.elapsed() <= Duration::from_secs(16));
    assert!(!harness.system.health().is_reconnecting());
}

#[tokio::test(start_paused = true)]
async fn test_periodic_loop_probes_on_schedule() {
    let harness = TestHarness::new();
    let health = harness.system.health();

    health.start();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.log.probes(), 1);
    assert!(health.next_check_in() <= Duration::from_secs(300));

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(harness.log.probes(), 2);

    health.stop();
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(harness.log.probes(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_follower_adopts_peer_verdict() {
    let harness = TestHarness::new();
    let health = harness.system.health();

    health.apply_peer_status(false);
    assert!(!health.is_healthy());

    health.apply_peer_status(true);
    let state = health.state();
    assert!(state.healthy);
    assert_eq!(state.consecutive_failures, 0);
}

#[tokio::test]
async fn test_http_services_target_the_configured_base_url() {
    let mut config = test_config();
    config.backend.base_url = "http://127.0.0.1:9".to_string();
    config.health.reachability_timeout_ms = 200;

    let services =
        BackendServices::over_http(&config, MockSession::new(), MockLiveness::new()).unwrap();
    let system = ConnectionSystem::bootstrap(
        config,
        services,
        MockQueryCache::new(CallLog::default()),
        Arc::new(LocalPeerBus::default()),
    )
    .unwrap();

    assert!(!system.health().check_health().await);
    assert!(!system.health().is_healthy());
}
