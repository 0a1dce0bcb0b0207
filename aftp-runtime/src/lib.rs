//! # AFTP Runtimes
//!
//! Isolated runtime environments: which exist, what each can import, and
//! the scripts that create them.
//!
//! - [`RuntimeCatalog`]: static table of runtimes and their capabilities
//! - [`RuntimeProbe`]: checks a runtime by running its own interpreter
//! - [`RuntimeRegistry`]: durable JSON cache of runtime and tool presence
//! - [`Installer`]: runs the setup scripts as opaque subprocesses

pub mod catalog;
pub mod diagnostics;
pub mod installer;
pub mod layout;
pub mod probe;
pub mod registry;
pub mod tools;

#[cfg(all(test, unix))]
mod testing;

// Re-exports
pub use catalog::{RuntimeCatalog, RuntimeSpec};
pub use diagnostics::{DiagnosticsReport, ServiceSnapshot};
pub use installer::{backends_for, Backend, InstallOutcome, Installer};
pub use layout::RuntimeLayout;
pub use probe::{
    CapabilityProbe, CapabilityStatus, RuntimeProbe, RuntimeState, Validation, NOT_MATERIALIZED,
};
pub use registry::{RegistryDocument, RuntimeEntry, RuntimeRegistry};
pub use tools::ToolStatus;
