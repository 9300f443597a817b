//! The shipped configuration file loads and validates for every environment

use std::path::PathBuf;
use std::time::Duration;

use hotelops_sync::config::ConfigManager;
use hotelops_sync::Priority;

fn shipped_config_dir() -> Option<PathBuf> {
    Some(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config"))
}

#[test]
fn test_shipped_config_is_valid_for_all_environments() {
    for environment in ["development", "test", "production"] {
        let manager = ConfigManager::load_from_directory_with_env(shipped_config_dir(), environment)
            .unwrap_or_else(|e| panic!("{environment} configuration failed to load: {e}"));
        assert_eq!(manager.environment(), environment);
    }
}

#[test]
fn test_test_environment_shortens_timers() {
    let manager = ConfigManager::load_from_directory_with_env(shipped_config_dir(), "test").unwrap();
    let config = manager.config();

    assert_eq!(config.health.baseline_interval(), Duration::from_secs(60));
    assert_eq!(config.health.reachability_backoff(), Duration::from_millis(10));
    assert_eq!(config.circuit_breaker.cooldown_seconds, 5);
    assert!(config.is_test_environment());
}

#[test]
fn test_production_keeps_base_thresholds() {
    let manager =
        ConfigManager::load_from_directory_with_env(shipped_config_dir(), "production").unwrap();
    let config = manager.config();

    assert!(config.backend.base_url.starts_with("https://"));
    assert_eq!(config.circuit_breaker.failure_threshold, 3);
    assert_eq!(config.circuit_breaker.cooldown_seconds, 45);
    assert_eq!(config.cache.priority_for("pos_orders"), Priority::Critical);
    assert_eq!(config.cache.stale_after(Priority::High), Duration::from_secs(60));
}

#[test]
fn test_debug_config_is_json() {
    let manager = ConfigManager::load_from_directory_with_env(shipped_config_dir(), "development")
        .unwrap();

    let json = manager.debug_config();
    assert_eq!(json["health"]["baseline_interval_seconds"], 120);
    assert_eq!(json["cache"]["priorities"]["rooms"], "critical");
}
