//! # AFTP Providers
//!
//! Clients for the locally running model service.

pub mod ndjson;
pub mod ollama;

// Re-exports
pub use ollama::{parse_model_list, OllamaBuilder, OllamaService};

use aftp_core::config::ServiceConfig;
use aftp_core::error::AftpError;

/// Create an Ollama client from a service configuration
///
/// # Example
///
/// ```ignore
/// use aftp_provider::ollama;
///
/// let service = ollama(settings.service_config())?;
/// ```
pub fn ollama(config: ServiceConfig) -> Result<OllamaService, AftpError> {
    OllamaService::builder().config(config).build()
}
