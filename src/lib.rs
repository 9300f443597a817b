#![allow(clippy::doc_markdown)] // Allow technical terms in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # HotelOps Sync Core
//!
//! Connection resilience and recovery layer for hotel-operations client
//! sessions. Keeps a long-lived session synchronized with the remote data
//! service across network drops, device sleep/wake, backgrounding and
//! transient backend outages.
//!
//! ## Architecture
//!
//! Components, leaf-first:
//!
//! - [`leader`] - elects one sibling instance to run health probes
//! - [`health`] - adaptive health probing and proactive session renewal
//! - [`realtime`] - channel registry with prioritized, staged reconnection
//! - [`orchestration`] - sequences channel reconnection before cache invalidation
//! - [`resilience`] - circuit breaker and pre-flight guard for critical operations
//! - [`diagnostics`] - read-only metrics plus operator test affordances
//!
//! Supporting modules: [`config`] (YAML with environment overrides),
//! [`events`] (typed event bus and listener handles), [`status`] (debounced
//! connection status), [`cache`] (query cache seam and staleness planning),
//! [`backend`] (request/response seams) and [`system`] (bootstrap).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hotelops_sync::backend::BackendServices;
//! use hotelops_sync::cache::QueryCache;
//! use hotelops_sync::config::SyncConfig;
//! use hotelops_sync::leader::LocalPeerBus;
//! use hotelops_sync::system::ConnectionSystem;
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     services: BackendServices,
//! #     cache: Arc<dyn QueryCache>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! hotelops_sync::logging::init_structured_logging();
//!
//! let system = ConnectionSystem::bootstrap(
//!     SyncConfig::default(),
//!     services,
//!     cache,
//!     Arc::new(LocalPeerBus::default()),
//! )?;
//! system.start();
//!
//! let approved = system
//!     .guard()
//!     .guard(
//!         "approve_rate_change",
//!         || async { Ok::<_, String>("approved") },
//!         system.guard().default_options(),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod constants;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod health;
pub mod leader;
pub mod logging;
pub mod orchestration;
pub mod priority;
pub mod realtime;
pub mod resilience;
pub mod status;
pub mod system;
pub mod utils;
pub mod visibility;

pub use config::{ConfigManager, SyncConfig};
pub use error::{BackendError, ResilienceError, Result};
pub use events::{ConnectionEvent, EventPublisher};
pub use health::{HealthMonitor, ProbeVerdict, ReconnectOutcome};
pub use orchestration::{ConnectionOrchestrator, RecoveryOutcome};
pub use priority::Priority;
pub use realtime::{ChannelManager, ChannelOptions, ChannelState, RealtimeChannel};
pub use resilience::{CircuitBreaker, CircuitState, GuardOptions, PreflightGuard};
pub use status::ConnectionStatus;
pub use system::ConnectionSystem;
