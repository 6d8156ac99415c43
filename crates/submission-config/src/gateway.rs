// ============================================================================
// API Gateway Configuration
// ============================================================================

use crate::constants::*;
use crate::{env_parse, env_string};
use std::time::Duration;

/// Where and how events are forwarded
#[derive(Clone)]
pub struct GatewayConfig {
    /// Artifact collection URL, e.g. `http://api-gateway:3000/api/artifacts`
    pub base_url: String,
    /// HTTP verb used for the status update
    pub method: String,
    /// Appended after `/{artifactId}`
    pub path_suffix: String,
    pub timeout_secs: u64,
    pub api_key: String,
    pub service_role: String,
}

impl GatewayConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            base_url: env_string("API_GATEWAY_URL", DEFAULT_API_GATEWAY_URL),
            method: env_string("API_GATEWAY_METHOD", DEFAULT_API_GATEWAY_METHOD).to_uppercase(),
            path_suffix: env_string("API_GATEWAY_PATH_SUFFIX", DEFAULT_API_GATEWAY_PATH_SUFFIX),
            timeout_secs: env_parse("API_GATEWAY_TIMEOUT_SECS", DEFAULT_API_GATEWAY_TIMEOUT_SECS),
            api_key: std::env::var("API_KEY").unwrap_or_default(),
            service_role: env_string("SERVICE_ROLE", DEFAULT_SERVICE_ROLE),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url)
            .field("method", &self.method)
            .field("path_suffix", &self.path_suffix)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_key", &"***")
            .field("service_role", &self.service_role)
            .finish()
    }
}
