//! # Query Cache Seam
//!
//! The resilience layer never owns cached data. It reads query metadata from
//! the host application's cache, decides which entries are stale, and asks
//! the cache to invalidate and refetch them in priority waves.

pub mod invalidation;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::BackendResult;

pub use invalidation::{plan_invalidation, run_invalidation_waves, InvalidationSummary};

/// Stable, segmented query key such as `["rooms", "floor", "3"]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// First segment, used to classify the key into a priority tier
    pub fn root(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

impl<S: Into<String>> From<Vec<S>> for QueryKey {
    fn from(segments: Vec<S>) -> Self {
        Self::new(segments)
    }
}

/// Metadata for one cached query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuerySnapshot {
    pub key: QueryKey,
    /// `None` when the query has never successfully loaded
    pub data_updated_at: Option<DateTime<Utc>>,
    /// Currently observed by a mounted consumer
    pub active: bool,
}

/// Predicate selecting queries by key
pub type QueryPredicate<'a> = dyn Fn(&QueryKey) -> bool + Send + Sync + 'a;

#[async_trait]
pub trait QueryCache: Send + Sync {
    fn queries(&self) -> Vec<QuerySnapshot>;

    /// Mark every matching query stale
    async fn invalidate_queries(&self, predicate: &QueryPredicate<'_>) -> BackendResult<()>;

    /// Refetch matching queries that are currently active
    async fn refetch_active_queries(&self, predicate: &QueryPredicate<'_>) -> BackendResult<()>;
}
