//! Reachability probe over HTTP.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::ReachabilityProbe;
use crate::config::SyncConfig;
use crate::error::{BackendError, BackendResult};

/// Issues a bare GET to the service base URL
#[derive(Debug, Clone)]
pub struct HttpReachabilityProbe {
    client: Client,
    base_url: String,
}

impl HttpReachabilityProbe {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> BackendResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Probe `backend.base_url`, bounded by `health.reachability_timeout_ms`
    pub fn from_config(config: &SyncConfig) -> BackendResult<Self> {
        Self::new(
            config.backend.base_url.clone(),
            config.health.reachability_timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ReachabilityProbe for HttpReachabilityProbe {
    async fn probe(&self) -> BackendResult<u16> {
        let response = self
            .client
            .get(&self.base_url)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        debug!(base_url = %self.base_url, status, "Reachability probe answered");
        Ok(status)
    }
}
