//! Staleness-aware, tiered cache invalidation.
//!
//! Only queries older than their tier's staleness threshold are selected.
//! Each wave's delay is an offset from the start of the invalidation phase,
//! so the normal tier begins no earlier than `normal.wave_delay_ms` after the
//! critical tier regardless of how long earlier waves took.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{QueryCache, QueryKey, QuerySnapshot};
use crate::config::CacheConfig;
use crate::priority::{group_into_waves, Priority, PriorityWave};

/// Result of running the invalidation waves
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationSummary {
    pub tiers: Vec<Priority>,
    pub invalidated: usize,
    pub failed_waves: usize,
}

/// Whether a query is past its tier's staleness threshold at `now`
pub fn is_stale(snapshot: &QuerySnapshot, priority: Priority, now: DateTime<Utc>, config: &CacheConfig) -> bool {
    match snapshot.data_updated_at {
        None => true,
        Some(updated_at) => {
            let age = (now - updated_at).to_std().unwrap_or(Duration::ZERO);
            age > config.stale_after(priority)
        }
    }
}

/// Select stale queries and group them into ordered invalidation waves
pub fn plan_invalidation(
    snapshots: &[QuerySnapshot],
    now: DateTime<Utc>,
    config: &CacheConfig,
) -> Vec<PriorityWave<QueryKey>> {
    let stale = snapshots.iter().filter_map(|snapshot| {
        let priority = snapshot
            .key
            .root()
            .map(|root| config.priority_for(root))
            .unwrap_or(config.default_priority);

        is_stale(snapshot, priority, now, config).then(|| (priority, snapshot.key.clone()))
    });

    group_into_waves(stale, |priority| config.wave_delay(priority))
}

/// Run planned waves against the cache. Each wave invalidates, then refetches
/// the active queries it selected.
pub async fn run_invalidation_waves(
    cache: &dyn QueryCache,
    waves: Vec<PriorityWave<QueryKey>>,
) -> InvalidationSummary {
    let phase_start = Instant::now();
    let mut summary = InvalidationSummary::default();

    for wave in waves {
        tokio::time::sleep_until(phase_start + wave.delay).await;

        let selected: HashSet<QueryKey> = wave.items.into_iter().collect();
        let predicate = |key: &QueryKey| selected.contains(key);

        debug!(
            priority = %wave.priority,
            queries = selected.len(),
            offset_ms = wave.delay.as_millis() as u64,
            "Invalidating cache wave"
        );

        let result = match cache.invalidate_queries(&predicate).await {
            Ok(()) => cache.refetch_active_queries(&predicate).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => summary.invalidated += selected.len(),
            Err(e) => {
                summary.failed_waves += 1;
                warn!(priority = %wave.priority, error = %e, "Cache invalidation wave failed");
            }
        }
        summary.tiers.push(wave.priority);
    }

    summary
}
