//! # AFTP Hub
//!
//! Local management of isolated AI runtimes and a client for the locally
//! running model service.
//!
//! ## Features
//!
//! - **Runtime registry**: which runtimes exist and what each can import,
//!   probed out of process and cached in a JSON registry
//! - **Model service client**: list, pull, delete and generate against
//!   Ollama, including the streaming protocol with cancellation
//! - **Composable layers**: logging and retry around any service
//! - **Durable chats**: one JSON file per conversation
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! aftp = { version = "0.1", default-features = false, features = ["ollama", "layers"] }
//! ```
//!
//! ```ignore
//! use aftp::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<()> {
//! let paths = AppPaths::discover();
//! let settings = Settings::load(&paths.settings_path);
//!
//! let executor = ChatExecutor::builder(ollama(settings.service_config())?)
//!     .layer(RetryLayer::new())
//!     .layer(LoggingLayer::new())
//!     .conversations(Arc::new(ConversationStore::new(&paths.conversations_dir)))
//!     .default_model("llama3:8b")
//!     .finish();
//!
//! let result = executor
//!     .chat("default", "What is Rust?", None, CancellationToken::new())
//!     .await?;
//! println!("{}", result.content);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `ollama`: Ollama service client
//! - `providers`: All available service clients
//! - `layers`: Built-in layers (logging, retry)
//! - `runtimes`: Runtime catalog, probe, registry and installer
//! - `cli`: The `aftp` binary
//! - `full`: All features enabled

// Re-export core types and traits
pub use aftp_core::*;

// Re-export service clients under `provider` module
#[cfg(feature = "aftp-provider")]
pub mod provider {
    //! Model service clients.
    pub use aftp_provider::*;
}

// Re-export layers under `layer` module
#[cfg(feature = "aftp-layer")]
pub mod layer {
    //! Built-in middleware layers.
    pub use aftp_core::layer::*;
    pub use aftp_layer::*;
}

// Re-export runtime management under `runtime` module
#[cfg(feature = "aftp-runtime")]
pub mod runtime {
    //! Runtime catalog, probing, registry and installer.
    pub use aftp_runtime::*;
}

/// Prelude module for convenient imports
pub mod prelude {
    //! Prelude module containing the most commonly used types and traits.
    //!
    //! ```
    //! use aftp::prelude::*;
    //! ```

    pub use crate::{
        AftpError, AppPaths, CancellationToken, ChatExecutor, ChatMessage, Conversation,
        ConversationStore, FinishReason, GenerateRequest, Layer, ModelService, Result, Role,
        ServiceConfig, Settings, TextChunk, TextResult,
    };

    #[cfg(feature = "aftp-provider")]
    pub use crate::provider::{ollama, OllamaService};

    #[cfg(feature = "aftp-layer")]
    pub use crate::layer::{LoggingLayer, RetryLayer};

    #[cfg(feature = "aftp-runtime")]
    pub use crate::runtime::{RuntimeCatalog, RuntimeProbe, RuntimeRegistry};
}
