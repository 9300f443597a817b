//! Runtime configuration for a single circuit breaker.
//!
//! Built from the YAML `circuit_breaker` section through
//! [`crate::config::CircuitBreakerSettings::to_resilience_config`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive recorded failures before the breaker opens
    pub failure_threshold: u32,

    /// Time since the last failure before a trial call is allowed
    pub cooldown: Duration,
}

impl CircuitBreakerConfig {
    /// Breaker guarding user-initiated critical writes
    pub fn for_critical_operations() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(30),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }

        if self.cooldown.is_zero() {
            return Err("cooldown must be greater than 0".to_string());
        }

        if self.cooldown > Duration::from_secs(600) {
            return Err("cooldown should not exceed 10 minutes".to_string());
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::for_critical_operations()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        assert!(CircuitBreakerConfig::default().validate().is_ok());

        let zero_threshold = CircuitBreakerConfig {
            failure_threshold: 0,
            ..Default::default()
        };
        assert!(zero_threshold.validate().is_err());

        let long_cooldown = CircuitBreakerConfig {
            cooldown: Duration::from_secs(3600),
            ..Default::default()
        };
        assert!(long_cooldown.validate().is_err());
    }
}
