//! User settings file (`config.json`).
//!
//! Values missing from the file take their defaults, so older or partial
//! files keep working. An unreadable file loads as the defaults.

use crate::config::ServiceConfig;
use crate::error::AftpError;
use crate::store::{read_json, write_json_atomic};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Persisted user settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Model service host (`host` or `host:port`)
    pub ollama_host: Option<String>,
    /// Model service port used when the host has none
    pub ollama_port: Option<u16>,
    /// Directory holding the runtimes
    pub runtimes_root: Option<PathBuf>,
    /// Per-runtime directory overrides
    pub runtimes: BTreeMap<String, PathBuf>,
    /// Seconds before a probe subprocess is killed
    pub probe_timeout_secs: u64,
    /// Maximum probe subprocesses running at once
    pub probe_concurrency: usize,
    /// Seconds before an installer script is killed
    pub installer_timeout_secs: u64,
    pub show_model_license_notice: bool,
    pub show_licenses_on_start: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ollama_host: None,
            ollama_port: None,
            runtimes_root: None,
            runtimes: BTreeMap::new(),
            probe_timeout_secs: 20,
            probe_concurrency: 4,
            installer_timeout_secs: 3600,
            show_model_license_notice: true,
            show_licenses_on_start: true,
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults
    pub fn load(path: &Path) -> Self {
        read_json(path).unwrap_or_default()
    }

    /// Persist settings atomically
    pub fn save(&self, path: &Path) -> Result<(), AftpError> {
        write_json_atomic(path, self)
    }

    /// Service configuration derived from these settings
    pub fn service_config(&self) -> ServiceConfig {
        let mut config = ServiceConfig::new();
        if let Some(host) = &self.ollama_host {
            config = config.with_host(host.clone());
        }
        if let Some(port) = self.ollama_port {
            config = config.with_port(port);
        }
        config
    }

    /// Probe timeout as a duration
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }

    /// Installer timeout as a duration
    pub fn installer_timeout(&self) -> Duration {
        Duration::from_secs(self.installer_timeout_secs.max(1))
    }
}
