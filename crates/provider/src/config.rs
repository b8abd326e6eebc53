//! Provider configuration

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

use crate::client::{Credential, ExecutionContext, HttpTransport, JobGateway};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Connection settings for the backup server
#[derive(Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the REST API, e.g. `https://vbr.example.com:9419`
    pub endpoint: String,

    /// Bearer token
    pub token: String,

    /// Value of the `x-api-version` header
    pub api_version: String,

    /// Per-request timeout
    pub timeout_secs: u64,

    /// Skip TLS certificate verification (self-signed lab servers)
    pub accept_invalid_certs: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            token: String::new(),
            api_version: veeam_common::DEFAULT_API_VERSION.to_string(),
            timeout_secs: 30,
            accept_invalid_certs: false,
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &"***")
            .field("api_version", &self.api_version)
            .field("timeout_secs", &self.timeout_secs)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

/// Values that take precedence over the config file, typically from flags or
/// the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub api_version: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl ProviderConfig {
    /// Load configuration from file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn apply(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(endpoint) = overrides.endpoint {
            self.endpoint = endpoint;
        }
        if let Some(token) = overrides.token {
            self.token = token;
        }
        if let Some(api_version) = overrides.api_version {
            self.api_version = api_version;
        }
        if let Some(timeout_secs) = overrides.timeout_secs {
            self.timeout_secs = timeout_secs;
        }
        self
    }

    /// Check the settings and build the request context
    pub fn execution_context(&self) -> Result<ExecutionContext, ConfigError> {
        if self.endpoint.is_empty() {
            return Err(ConfigError::Invalid("endpoint is not set".to_string()));
        }
        let endpoint = Url::parse(&self.endpoint)
            .map_err(|e| ConfigError::Invalid(format!("endpoint {:?}: {}", self.endpoint, e)))?;
        if !matches!(endpoint.scheme(), "http" | "https") || endpoint.cannot_be_a_base() {
            return Err(ConfigError::Invalid(format!(
                "endpoint {:?} must be an http(s) URL",
                self.endpoint
            )));
        }
        if self.token.trim().is_empty() {
            return Err(ConfigError::Invalid("token is not set".to_string()));
        }
        if self.api_version.trim().is_empty() {
            return Err(ConfigError::Invalid("api_version must not be empty".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be positive".to_string()));
        }

        Ok(ExecutionContext::new(
            endpoint,
            Credential::new(self.token.clone()),
            self.api_version.clone(),
        ))
    }

    /// Build a gateway using the reqwest transport
    pub fn gateway(&self) -> Result<JobGateway, ConfigError> {
        let context = self.execution_context()?;
        let transport = HttpTransport::new(
            Duration::from_secs(self.timeout_secs),
            self.accept_invalid_certs,
        )?;
        Ok(JobGateway::new(Arc::new(transport), context))
    }
}
