//! # Logging
//!
//! Console logging for the sync layer through `tracing-subscriber`. The
//! default directive depends on the environment; `HOTELOPS_LOG` overrides it
//! with any `EnvFilter` syntax. ANSI colour is used only on a terminal, and
//! `HOTELOPS_LOG_FORMAT=json` switches to JSON lines for log shippers.
//!
//! The `log_*` helpers emit the recurring channel, recovery and error records
//! with a fixed field set so dashboards can key on them.

use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static SUBSCRIBER_INSTALLED: OnceLock<()> = OnceLock::new();

/// Install the console subscriber once per process
///
/// If the embedding application already installed a global subscriber, that
/// one is kept and this call only records the fact at debug level.
pub fn init_structured_logging() {
    SUBSCRIBER_INSTALLED.get_or_init(|| {
        let environment = active_environment();
        let directive = default_directive(&environment);
        let filter = || {
            EnvFilter::try_from_env("HOTELOPS_LOG").unwrap_or_else(|_| EnvFilter::new(directive))
        };

        let layer = match json_output_requested() {
            true => fmt::layer().with_target(true).json().with_filter(filter()).boxed(),
            false => fmt::layer()
                .with_target(true)
                .with_ansi(std::io::stdout().is_terminal())
                .with_filter(filter())
                .boxed(),
        };

        if let Err(e) = tracing_subscriber::registry().with(layer).try_init() {
            tracing::debug!(error = %e, "Keeping the host application's tracing subscriber");
        }

        tracing::info!(environment = %environment, directive, "🔧 Sync logging ready");
    });
}

fn active_environment() -> String {
    std::env::var("HOTELOPS_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Production stays at info; every other environment logs at debug
fn default_directive(environment: &str) -> &'static str {
    if environment.eq_ignore_ascii_case("production") {
        "info"
    } else {
        "debug"
    }
}

fn json_output_requested() -> bool {
    std::env::var("HOTELOPS_LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"))
}

/// One realtime channel lifecycle step (register, refresh, evict...)
pub fn log_channel_operation(
    operation: &str,
    channel_id: &str,
    priority: Option<&str>,
    status: &str,
    attempts: Option<u32>,
    details: Option<&str>,
) {
    tracing::info!(
        operation,
        channel_id,
        priority,
        status,
        attempts,
        details,
        "📡 Channel operation"
    );
}

/// One phase of a recovery cycle
pub fn log_recovery_operation(
    trigger: &str,
    phase: &str,
    status: &str,
    duration_ms: Option<u64>,
    details: Option<&str>,
) {
    tracing::info!(trigger, phase, status, duration_ms, details, "🔄 Recovery phase");
}

pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(component, operation, error, context, "❌ Sync operation failed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_production_defaults_to_info() {
        assert_eq!(default_directive("production"), "info");
        assert_eq!(default_directive("PRODUCTION"), "info");
        assert_eq!(default_directive("test"), "debug");
        assert_eq!(default_directive("staging"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_structured_logging();
        init_structured_logging();
        log_recovery_operation("test", "channels", "completed", Some(12), None);
        log_channel_operation("refresh", "rooms", Some("critical"), "joined", Some(0), None);
    }
}
