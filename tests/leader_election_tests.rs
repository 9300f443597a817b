//! Leader election across sibling instances sharing a peer bus

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hotelops_sync::config::LeaderConfig;
use hotelops_sync::leader::{LeaderCoordinator, LocalPeerBus, PeerBus, PeerMessage};
use hotelops_sync::visibility::VisibilityTracker;
use uuid::Uuid;

fn config() -> LeaderConfig {
    LeaderConfig {
        enabled: true,
        heartbeat_interval_ms: 1000,
        heartbeat_timeout_ms: 3000,
        foreground_fallback: false,
    }
}

fn instance(id: u128, bus: &Arc<LocalPeerBus>, foreground: bool) -> Arc<LeaderCoordinator> {
    let bus: Arc<dyn PeerBus> = bus.clone();
    LeaderCoordinator::with_instance_id(
        Uuid::from_u128(id),
        config(),
        bus,
        VisibilityTracker::new(foreground),
    )
}

#[tokio::test(start_paused = true)]
async fn test_lowest_instance_id_leads() {
    let bus = Arc::new(LocalPeerBus::default());
    let first = instance(1, &bus, true);
    let second = instance(2, &bus, true);
    let third = instance(3, &bus, false);
    for coordinator in [&first, &second, &third] {
        coordinator.start();
    }

    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(first.is_leader());
    assert!(!second.is_leader());
    assert!(!third.is_leader());
    assert_eq!(
        third.status().live_peers,
        vec![Uuid::from_u128(1), Uuid::from_u128(2)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_resignation_hands_over_immediately() {
    let bus = Arc::new(LocalPeerBus::default());
    let first = instance(1, &bus, true);
    let second = instance(2, &bus, true);
    first.start();
    second.start();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!second.is_leader());

    first.stop();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(second.is_leader());
}

#[tokio::test(start_paused = true)]
async fn test_silent_leader_is_pruned_after_timeout() {
    let bus = Arc::new(LocalPeerBus::default());
    let follower = instance(5, &bus, false);

    follower.handle_message(PeerMessage::Heartbeat {
        instance_id: Uuid::from_u128(1),
        foreground: true,
    });
    assert!(!follower.is_leader());
    assert!(!follower.should_run_health_check());

    tokio::time::advance(Duration::from_secs(4)).await;

    assert!(follower.is_leader());
    assert!(follower.live_peers().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_foreground_fallback_lets_follower_probe() {
    let bus: Arc<dyn PeerBus> = Arc::new(LocalPeerBus::default());
    let follower = LeaderCoordinator::with_instance_id(
        Uuid::from_u128(9),
        LeaderConfig {
            foreground_fallback: true,
            ..config()
        },
        bus,
        VisibilityTracker::new(true),
    );
    follower.handle_message(PeerMessage::Heartbeat {
        instance_id: Uuid::from_u128(1),
        foreground: false,
    });

    assert!(!follower.is_leader());
    assert!(follower.should_run_health_check());
}

#[tokio::test(start_paused = true)]
async fn test_disabled_election_makes_everyone_leader() {
    let bus: Arc<dyn PeerBus> = Arc::new(LocalPeerBus::default());
    let coordinator = LeaderCoordinator::with_instance_id(
        Uuid::from_u128(7),
        LeaderConfig {
            enabled: false,
            ..config()
        },
        bus,
        VisibilityTracker::new(false),
    );
    coordinator.handle_message(PeerMessage::Heartbeat {
        instance_id: Uuid::from_u128(1),
        foreground: true,
    });

    assert!(coordinator.is_leader());
}

#[tokio::test(start_paused = true)]
async fn test_leader_verdict_reaches_followers() {
    let bus = Arc::new(LocalPeerBus::default());
    let leader = instance(1, &bus, true);
    let follower = instance(2, &bus, false);
    leader.start();
    follower.start();

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let _subscription = follower.on_peer_health(move |healthy| {
        sink.lock().unwrap().push(*healthy);
    });
    let own = Arc::new(AtomicUsize::new(0));
    let own_count = Arc::clone(&own);
    let _own_subscription = leader.on_peer_health(move |_| {
        own_count.fetch_add(1, Ordering::SeqCst);
    });

    leader.broadcast_health_status(false);
    leader.broadcast_health_status(true);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(*received.lock().unwrap(), vec![false, true]);
    // An instance ignores its own broadcasts
    assert_eq!(own.load(Ordering::SeqCst), 0);
}
