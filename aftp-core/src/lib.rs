//! # AFTP Core
//!
//! Core abstractions, configuration and persistent stores for AFTP Hub.
//!
//! This crate provides the [`ModelService`] trait implemented by service
//! clients, the [`Layer`] machinery used to wrap them, the [`ChatExecutor`]
//! that ties generation to durable conversations, and the JSON stores the
//! hub owns on disk.

pub mod chat;
pub mod config;
pub mod error;
pub mod layer;
pub mod paths;
pub mod service;
pub mod settings;
pub mod store;
pub mod types;

// Re-exports
pub use chat::{ChatExecutor, ChatExecutorBuilder};
pub use config::{resolve_endpoint, resolve_endpoint_with, ServiceConfig, ServiceEndpoint};
pub use error::AftpError;
pub use layer::{Layer, LayeredService};
pub use paths::AppPaths;
pub use service::{collect_text_stream, ModelService, TextStream};
pub use settings::Settings;
pub use store::{ConversationStore, ModelHandle, ModelHandleRegistry};
pub use tokio_util::sync::CancellationToken;
pub use types::*;

/// Result type alias for hub operations
pub type Result<T> = std::result::Result<T, AftpError>;
