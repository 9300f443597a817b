//! # Backend Seams
//!
//! The resilience layer orchestrates reconnection on top of an existing
//! request/response and publish/subscribe transport. These traits are the
//! only points where it touches that transport; concrete clients live in the
//! host application (and in test mocks).

pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SyncConfig;
use crate::error::BackendResult;

pub use http::HttpReachabilityProbe;

/// Authenticated session as reported by the session API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Lifetime left at `now`; zero once expired
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Bare GET against the service's base URL
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// HTTP status of the response; network failures are errors
    async fn probe(&self) -> BackendResult<u16>;
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn get_session(&self) -> BackendResult<Option<Session>>;
    async fn refresh_session(&self) -> BackendResult<Session>;
}

/// Single-row read against a low-cost table, the last-mile liveness check
#[async_trait]
pub trait LivenessQuery: Send + Sync {
    async fn ping(&self) -> BackendResult<()>;
}

/// Bundle of the request/response seams used by health probing
#[derive(Clone)]
pub struct BackendServices {
    pub reachability: Arc<dyn ReachabilityProbe>,
    pub session: Arc<dyn SessionProvider>,
    pub liveness: Arc<dyn LivenessQuery>,
}

impl BackendServices {
    /// Reachability over HTTP against the configured base URL
    pub fn over_http(
        config: &SyncConfig,
        session: Arc<dyn SessionProvider>,
        liveness: Arc<dyn LivenessQuery>,
    ) -> BackendResult<Self> {
        Ok(Self {
            reachability: Arc::new(HttpReachabilityProbe::from_config(config)?),
            session,
            liveness,
        })
    }
}

impl fmt::Debug for BackendServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendServices")
            .field("reachability", &"dyn ReachabilityProbe")
            .field("session", &"dyn SessionProvider")
            .field("liveness", &"dyn LivenessQuery")
            .finish()
    }
}

/// 2xx, and 401 (the service answered but wants auth), both count as reachable
pub fn is_reachable_status(status: u16) -> bool {
    (200..300).contains(&status) || status == 401
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reachable_statuses() {
        assert!(is_reachable_status(200));
        assert!(is_reachable_status(204));
        assert!(is_reachable_status(401));
        assert!(!is_reachable_status(403));
        assert!(!is_reachable_status(502));
    }

    #[test]
    fn test_session_remaining() {
        let now = Utc::now();
        let session = Session {
            user_id: "front-desk".to_string(),
            expires_at: now + chrono::Duration::minutes(10),
        };
        assert_eq!(session.remaining(now), Duration::from_secs(600));
        assert!(!session.is_expired(now));

        let expired = Session {
            expires_at: now - chrono::Duration::seconds(1),
            ..session
        };
        assert_eq!(expired.remaining(now), Duration::ZERO);
        assert!(expired.is_expired(now));
    }
}
