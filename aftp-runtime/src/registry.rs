//! Durable cache of which runtimes and tools exist.
//!
//! The document is rebuilt from scratch on every rescan and written
//! atomically with sorted keys, so an unchanged machine yields a
//! byte-identical file.
//!
//! [`RuntimeRegistry::rescan_and_update`] only records which runtimes exist
//! and spawns nothing. [`RuntimeRegistry::rescan_with_states`] also validates
//! every runtime's capabilities through the probe and is the path to use
//! when usability matters. Both write the same document, which carries no
//! validity.

use crate::catalog::RuntimeCatalog;
use crate::probe::{CapabilityProbe, RuntimeState};
use crate::tools::{scan_tools, ToolStatus};
use aftp_core::error::AftpError;
use aftp_core::store::{read_json, write_json_atomic};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Current schema version of the registry file.
pub const REGISTRY_SCHEMA: u32 = 1;

/// Default number of probe subprocesses run at once
pub const DEFAULT_PROBE_CONCURRENCY: usize = 4;

/// Produces the `tools` section of the document
pub type ToolScanner = fn() -> BTreeMap<String, ToolStatus>;

/// A created runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeEntry {
    pub path: String,
}

/// On-disk document:
/// `{"schema": 1, "venvs": {name: {"path": ..}}, "tools": {name: {"found": .., "path": ..}}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryDocument {
    #[serde(rename = "schema", default = "default_schema")]
    pub schema_version: u32,
    /// Present only for created runtimes
    #[serde(rename = "venvs", default)]
    pub runtimes: BTreeMap<String, RuntimeEntry>,
    #[serde(default)]
    pub tools: BTreeMap<String, ToolStatus>,
}

fn default_schema() -> u32 {
    REGISTRY_SCHEMA
}

impl Default for RegistryDocument {
    fn default() -> Self {
        Self {
            schema_version: REGISTRY_SCHEMA,
            runtimes: BTreeMap::new(),
            tools: BTreeMap::new(),
        }
    }
}

/// File-backed runtime registry.
#[derive(Debug)]
pub struct RuntimeRegistry {
    path: PathBuf,
    probe: Arc<dyn CapabilityProbe>,
    concurrency: usize,
    tool_scanner: ToolScanner,
    write_lock: Mutex<()>,
}

impl RuntimeRegistry {
    pub fn new(path: impl Into<PathBuf>, probe: Arc<dyn CapabilityProbe>) -> Self {
        Self {
            path: path.into(),
            probe,
            concurrency: DEFAULT_PROBE_CONCURRENCY,
            tool_scanner: scan_tools,
            write_lock: Mutex::new(()),
        }
    }

    /// Bound the number of probe subprocesses run at once
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Replace the tool lookup
    pub fn with_tool_scanner(mut self, scanner: ToolScanner) -> Self {
        self.tool_scanner = scanner;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn probe(&self) -> &Arc<dyn CapabilityProbe> {
        &self.probe
    }

    /// Load the document; missing or malformed files read as empty.
    pub fn read(&self) -> RegistryDocument {
        read_json(&self.path).unwrap_or_default()
    }

    /// Record which catalog runtimes exist and where the tools are.
    ///
    /// Only checks for interpreters on disk, so it is cheap enough to run
    /// on every start. Use [`Self::rescan_with_states`] to validate too.
    pub fn rescan_and_update(&self, catalog: &RuntimeCatalog) -> Result<RegistryDocument, AftpError> {
        let doc = self.snapshot(catalog);
        self.write(&doc)?;
        tracing::info!(
            "runtime registry updated: {} of {} runtimes created",
            doc.runtimes.len(),
            catalog.len()
        );
        Ok(doc)
    }

    /// Rescan and also probe every runtime, at most `concurrency` at a time.
    ///
    /// States come back in catalog order.
    pub async fn rescan_with_states(
        &self,
        catalog: &RuntimeCatalog,
    ) -> Result<(RegistryDocument, Vec<RuntimeState>), AftpError> {
        let states: Vec<RuntimeState> = stream::iter(catalog.iter())
            .map(|spec| self.probe.probe(spec))
            .buffered(self.concurrency)
            .collect()
            .await;

        let doc = self.rescan_and_update(catalog)?;
        Ok((doc, states))
    }

    fn snapshot(&self, catalog: &RuntimeCatalog) -> RegistryDocument {
        let runtimes = catalog
            .names()
            .filter(|name| self.probe.is_materialized(name))
            .map(|name| {
                let dir = self.probe.runtime_dir(name);
                let dir = std::fs::canonicalize(&dir).unwrap_or(dir);
                (
                    name.to_string(),
                    RuntimeEntry {
                        path: dir.display().to_string(),
                    },
                )
            })
            .collect();

        RegistryDocument {
            schema_version: REGISTRY_SCHEMA,
            runtimes,
            tools: (self.tool_scanner)(),
        }
    }

    fn write(&self, doc: &RegistryDocument) -> Result<(), AftpError> {
        let _guard = self.write_lock.lock();
        write_json_atomic(&self.path, doc)
    }
}
