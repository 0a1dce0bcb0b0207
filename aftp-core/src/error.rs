//! Error types for AFTP Hub operations.

/// The main error type for hub operations.
#[derive(Debug, thiserror::Error)]
pub enum AftpError {
    /// The model service could not be reached at all
    #[error("Service not reachable at {0}")]
    Unreachable(String),

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The service answered with a non-success status or an error object
    #[error("Service error: {0}")]
    Service(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout errors
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Stream errors
    #[error("Stream error: {0}")]
    Stream(String),

    /// The caller cancelled the operation
    #[error("Cancelled")]
    Cancelled,

    /// The runtime has no interpreter on disk
    #[error("Runtime not materialized: {0}")]
    NotMaterialized(String),

    /// Probe subprocess errors
    #[error("Probe error ({runtime}): {message}")]
    Probe { runtime: String, message: String },

    /// Installer script errors
    #[error("Installer error: {0}")]
    Installer(String),

    /// Layer errors
    #[error("Layer error ({layer}): {message}")]
    Layer { layer: String, message: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic errors
    #[error("Error: {0}")]
    Other(String),
}

impl AftpError {
    /// Create an unreachable-service error
    pub fn unreachable(endpoint: impl Into<String>) -> Self {
        Self::Unreachable(endpoint.into())
    }

    /// Create a service error
    pub fn service(msg: impl Into<String>) -> Self {
        Self::Service(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream(msg.into())
    }

    /// Create a not-materialized error
    pub fn not_materialized(runtime: impl Into<String>) -> Self {
        Self::NotMaterialized(runtime.into())
    }

    /// Create a probe error
    pub fn probe(runtime: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Probe {
            runtime: runtime.into(),
            message: message.into(),
        }
    }

    /// Create an installer error
    pub fn installer(msg: impl Into<String>) -> Self {
        Self::Installer(msg.into())
    }

    /// Create a layer error
    pub fn layer(layer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Layer {
            layer: layer.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Map a transport error, keeping connection and timeout failures distinct
    pub fn from_transport(err: reqwest::Error, endpoint: &str) -> Self {
        if err.is_connect() {
            Self::Unreachable(endpoint.to_string())
        } else if err.is_timeout() {
            Self::Timeout(format!("{}: {}", endpoint, err))
        } else {
            Self::Network(err)
        }
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AftpError::Network(_) | AftpError::Timeout(_) | AftpError::Unreachable(_)
        )
    }

    /// Check if this error signals caller cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AftpError::Cancelled)
    }
}

impl From<String> for AftpError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

impl From<&str> for AftpError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}
