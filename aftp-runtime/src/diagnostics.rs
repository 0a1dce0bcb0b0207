//! Plain-text diagnostics report.

use crate::probe::RuntimeState;
use crate::registry::RegistryDocument;
use std::fmt;

/// What was observed about the model service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSnapshot {
    pub endpoint: String,
    pub reachable: bool,
    pub models: Vec<String>,
}

/// Report built from the registry plus optional probe and service results.
#[derive(Debug, Clone)]
pub struct DiagnosticsReport {
    registry: RegistryDocument,
    states: Vec<RuntimeState>,
    service: Option<ServiceSnapshot>,
}

impl DiagnosticsReport {
    pub fn new(registry: RegistryDocument) -> Self {
        Self {
            registry,
            states: Vec::new(),
            service: None,
        }
    }

    pub fn with_states(mut self, states: Vec<RuntimeState>) -> Self {
        self.states = states;
        self
    }

    pub fn with_service(mut self, service: ServiceSnapshot) -> Self {
        self.service = Some(service);
        self
    }
}

impl fmt::Display for DiagnosticsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "AFTP Hub diagnostics")?;
        writeln!(f)?;

        writeln!(f, "Runtimes in registry:")?;
        if self.registry.runtimes.is_empty() {
            writeln!(f, "  (none)")?;
        }
        for (name, entry) in &self.registry.runtimes {
            writeln!(f, "  - {}: {}", name, entry.path)?;
        }

        writeln!(f)?;
        writeln!(f, "Tools:")?;
        if self.registry.tools.is_empty() {
            writeln!(f, "  (not scanned)")?;
        }
        for (name, tool) in &self.registry.tools {
            if tool.found {
                writeln!(f, "  - {}: {}", name, tool.path)?;
            } else {
                writeln!(f, "  - {}: not found", name)?;
            }
        }

        if !self.states.is_empty() {
            writeln!(f)?;
            writeln!(f, "Runtime checks:")?;
            for state in &self.states {
                writeln!(f, "  - {}: {}", state.name, state.status_label())?;
                if !state.created {
                    continue;
                }
                for (capability, status) in &state.capabilities {
                    if status.ok {
                        let version = status.version.as_deref().unwrap_or("version unknown");
                        writeln!(f, "      ok    {} ({})", capability, version)?;
                    } else {
                        let error = status.error.as_deref().unwrap_or("import failed");
                        writeln!(f, "      FAIL  {} ({})", capability, error)?;
                    }
                }
            }
        }

        if let Some(service) = &self.service {
            writeln!(f)?;
            if service.reachable {
                writeln!(
                    f,
                    "Model service ({}): reachable, {} models",
                    service.endpoint,
                    service.models.len()
                )?;
            } else {
                writeln!(f, "Model service ({}): not reachable", service.endpoint)?;
            }
        }

        Ok(())
    }
}
