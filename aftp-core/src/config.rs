//! Service configuration and endpoint resolution.
//!
//! The endpoint is never cached: every call resolves it again from the
//! explicit [`ServiceConfig`], then the host-override environment variable,
//! then the built-in default, so configuration changes apply immediately.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default service host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default service port.
pub const DEFAULT_PORT: u16 = 11434;

/// Environment variable consulted when no host is configured.
pub const DEFAULT_HOST_ENV: &str = "OLLAMA_HOST";

/// Host and port of the model service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub host: String,
    pub port: u16,
}

impl ServiceEndpoint {
    /// Create a new endpoint
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Base URL (`http://host:port`)
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Full URL for an API path such as `/api/tags`
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }
}

impl Default for ServiceEndpoint {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Explicit configuration for talking to the model service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Host override (`host` or `host:port`, scheme optional)
    pub host: Option<String>,
    /// Port applied when `host` carries none
    pub port: Option<u16>,
    /// Name of the host-override environment variable
    pub host_env: String,
    /// Timeout for the reachability check
    pub status_timeout: Duration,
    /// Timeout for listing models
    pub list_timeout: Duration,
    /// Timeout for pulling a model (covers draining the progress stream)
    pub pull_timeout: Duration,
    /// Timeout for deleting a model
    pub delete_timeout: Duration,
    /// Timeout for generation requests
    pub generate_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            host_env: DEFAULT_HOST_ENV.to_string(),
            status_timeout: Duration::from_secs(2),
            list_timeout: Duration::from_secs(10),
            pull_timeout: Duration::from_secs(600),
            delete_timeout: Duration::from_secs(30),
            generate_timeout: Duration::from_secs(600),
        }
    }
}

impl ServiceConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host override
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the port used when the host carries none
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the environment variable consulted for the host
    pub fn with_host_env(mut self, name: impl Into<String>) -> Self {
        self.host_env = name.into();
        self
    }

    /// Set the reachability check timeout
    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    /// Set the listing timeout
    pub fn with_list_timeout(mut self, timeout: Duration) -> Self {
        self.list_timeout = timeout;
        self
    }

    /// Set the pull timeout
    pub fn with_pull_timeout(mut self, timeout: Duration) -> Self {
        self.pull_timeout = timeout;
        self
    }

    /// Set the delete timeout
    pub fn with_delete_timeout(mut self, timeout: Duration) -> Self {
        self.delete_timeout = timeout;
        self
    }

    /// Set the generation timeout
    pub fn with_generate_timeout(mut self, timeout: Duration) -> Self {
        self.generate_timeout = timeout;
        self
    }

    /// Resolve the endpoint for this call
    pub fn endpoint(&self) -> ServiceEndpoint {
        resolve_endpoint(self)
    }
}

/// Resolve the service endpoint, reading the environment now.
pub fn resolve_endpoint(config: &ServiceConfig) -> ServiceEndpoint {
    let env = std::env::var(&config.host_env).ok();
    resolve_endpoint_with(config, env.as_deref())
}

/// Resolve the service endpoint against an explicit environment value.
///
/// Precedence: configured host, then `env`, then `127.0.0.1:11434`.
pub fn resolve_endpoint_with(config: &ServiceConfig, env: Option<&str>) -> ServiceEndpoint {
    if let Some(endpoint) = config
        .host
        .as_deref()
        .and_then(|host| parse_authority(host, config.port))
    {
        return endpoint;
    }

    if let Some(endpoint) = env.and_then(|value| parse_authority(value, None)) {
        return endpoint;
    }

    ServiceEndpoint::default()
}

/// Parse `[scheme://]host[:port][/]`. Returns `None` for an empty host.
fn parse_authority(raw: &str, fallback_port: Option<u16>) -> Option<ServiceEndpoint> {
    let trimmed = raw.trim();
    let stripped = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .unwrap_or(trimmed)
        .trim_end_matches('/');

    let default_port = fallback_port.unwrap_or(DEFAULT_PORT);

    let (host, port) = match stripped.rsplit_once(':') {
        Some((host, port)) => (host, port.parse::<u16>().unwrap_or(default_port)),
        None => (stripped, default_port),
    };

    if host.is_empty() {
        return None;
    }

    Some(ServiceEndpoint::new(host, port))
}
