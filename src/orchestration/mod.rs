//! # Connection Orchestration
//!
//! Top-level coordinator of recovery. Visibility signals and health
//! transitions are turned into recovery cycles that always run in the same
//! order: channel reconnection (critical → high → normal), a short
//! stabilization pause, then staleness-aware cache invalidation in the same
//! tier order with growing offsets.
//!
//! Signal storms are absorbed by two debounces: visibility signals within
//! the visibility window of the previous one are discarded, and a restore
//! signal only triggers recovery after a quiet period with no newer signal.

pub mod connection_orchestrator;
pub mod metrics;

pub use connection_orchestrator::{
    ConnectionOrchestrator, OrchestratorSignal, RecoveryOutcome, RecoveryReport,
};
pub use metrics::RecoveryMetrics;
