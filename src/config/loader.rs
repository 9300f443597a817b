//! YAML configuration loading.
//!
//! One file, `hotelops-sync.yaml`, holds the base values and per-environment
//! override sections. The active section is overlaid on the base, every
//! environment section is then dropped, and the remainder is deserialized
//! into [`SyncConfig`] and validated.

use super::error::{ConfigResult, ConfigurationError};
use super::SyncConfig;
use serde_yaml::{Mapping, Value as YamlValue};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const CONFIG_FILE_NAMES: [&str; 2] = ["hotelops-sync.yaml", "hotelops-sync.yml"];
const ENVIRONMENT_SECTIONS: [&str; 3] = ["development", "test", "production"];
const MAX_CONFIG_BYTES: u64 = 1024 * 1024;
const REDACTED_KEY_FRAGMENTS: [&str; 5] = ["password", "secret", "key", "token", "credential"];

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: SyncConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load from the default directory for the detected environment
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory_with_env(config_dir, &current_environment())
    }

    /// Load with an explicit environment name, leaving process env untouched
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let directory = config_dir.unwrap_or_else(default_directory);
        let path = locate_config_file(&directory)?;
        debug!(path = %path.display(), environment, "Reading sync configuration");

        let raw = read_bounded(&path)?;
        let display_path = path.display().to_string();
        let document = serde_yaml::from_str::<YamlValue>(&raw)
            .map_err(|e| ConfigurationError::invalid_yaml(&display_path, e))?;
        let layered = select_environment(document, environment)?;

        let mut config: SyncConfig = serde_yaml::from_value(layered).map_err(|e| {
            ConfigurationError::invalid_yaml(&display_path, format!("does not match the schema: {e}"))
        })?;
        config.environment = environment.to_string();
        config.validate()?;

        debug!(config = %redacted_json(&config), "Effective sync configuration");
        info!(
            environment,
            base_url = %config.backend.base_url,
            failure_threshold = config.circuit_breaker.failure_threshold,
            "⚙️ Sync configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: directory,
        }))
    }

    /// Wrap an in-memory configuration, validating it first
    pub fn from_config(mut config: SyncConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.environment = environment.to_string();
        config.validate()?;

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("config"),
        }))
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Configuration as JSON with credential-looking fields masked
    pub fn debug_config(&self) -> serde_json::Value {
        redacted_json(&self.config)
    }
}

/// `HOTELOPS_ENV`, then `APP_ENV`, then `development`
fn current_environment() -> String {
    env::var("HOTELOPS_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .map(|name| name.to_lowercase())
        .unwrap_or_else(|_| "development".to_string())
}

fn default_directory() -> PathBuf {
    if let Ok(dir) = env::var("HOTELOPS_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    env::var("CARGO_MANIFEST_DIR")
        .map(|root| PathBuf::from(root).join("config"))
        .ok()
        .filter(|candidate| candidate.is_dir())
        .unwrap_or_else(|| PathBuf::from("config"))
}

fn locate_config_file(directory: &Path) -> ConfigResult<PathBuf> {
    let candidates: Vec<PathBuf> = CONFIG_FILE_NAMES
        .iter()
        .map(|name| directory.join(name))
        .collect();

    match candidates.iter().find(|candidate| candidate.is_file()) {
        Some(found) => Ok(found.clone()),
        None => Err(ConfigurationError::config_file_not_found(candidates)),
    }
}

fn read_bounded(path: &Path) -> ConfigResult<String> {
    let display = path.display().to_string();
    let size = std::fs::metadata(path)
        .map_err(|e| ConfigurationError::file_read_error(&display, e))?
        .len();

    if size > MAX_CONFIG_BYTES {
        return Err(ConfigurationError::invalid_value(
            "file_size",
            size.to_string(),
            format!("{display} is larger than {MAX_CONFIG_BYTES} bytes"),
        ));
    }

    std::fs::read_to_string(path).map_err(|e| ConfigurationError::file_read_error(&display, e))
}

/// Overlay the `environment` section on the base and strip every environment section
fn select_environment(document: YamlValue, environment: &str) -> ConfigResult<YamlValue> {
    let mut base = match document {
        YamlValue::Mapping(map) => map,
        YamlValue::Null => Mapping::new(),
        other => {
            return Err(ConfigurationError::ConfigMergeError {
                error: format!("top level must be a mapping, found {other:?}"),
            })
        }
    };

    let overrides = base.get(environment).cloned();
    for section in ENVIRONMENT_SECTIONS {
        base.remove(section);
    }

    let mut merged = YamlValue::Mapping(base);
    if let Some(overrides) = overrides {
        debug!(environment, "Applying environment overrides");
        overlay(&mut merged, overrides)?;
    }
    Ok(merged)
}

fn overlay(target: &mut YamlValue, overrides: YamlValue) -> ConfigResult<()> {
    match (target, overrides) {
        (YamlValue::Mapping(target), YamlValue::Mapping(overrides)) => {
            for (key, value) in overrides {
                match target.get_mut(&key) {
                    Some(slot) => overlay(slot, value)?,
                    None => {
                        target.insert(key, value);
                    }
                }
            }
            Ok(())
        }
        (YamlValue::Mapping(_), other) => Err(ConfigurationError::ConfigMergeError {
            error: format!("cannot replace a section with scalar override {other:?}"),
        }),
        (slot, value) => {
            *slot = value;
            Ok(())
        }
    }
}

fn redacted_json(config: &SyncConfig) -> serde_json::Value {
    let mut json = serde_json::json!(config);
    redact(&mut json);
    json
}

fn redact(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                let key = key.to_lowercase();
                // Priority entries are keyed by query segment
                let masked = key != "priorities"
                    && REDACTED_KEY_FRAGMENTS.iter().any(|fragment| key.contains(fragment));
                if masked {
                    *child = serde_json::Value::String("[MASKED]".to_string());
                } else {
                    redact(child);
                }
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(redact),
        _ => {}
    }
}
