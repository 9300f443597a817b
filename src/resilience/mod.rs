//! # Resilience Module
//!
//! Failure containment for individual critical operations. A single shared
//! [`CircuitBreaker`] is fed by every [`PreflightGuard`] call site, so a
//! burst of failing critical calls trips it even while background health
//! probing still reports healthy.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hotelops_sync::resilience::{CircuitBreaker, CircuitBreakerConfig};
//! use hotelops_sync::events::EventPublisher;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CircuitBreakerConfig {
//!     failure_threshold: 3,
//!     cooldown: Duration::from_secs(30),
//! };
//!
//! let breaker = CircuitBreaker::new("critical_operations", config, EventPublisher::default());
//!
//! let result = breaker
//!     .call("approve_rate", || async { Ok::<_, String>("approved") })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod guard;
pub mod metrics;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use config::CircuitBreakerConfig;
pub use guard::{GuardOptions, PreflightGuard};
pub use metrics::CircuitBreakerSnapshot;
