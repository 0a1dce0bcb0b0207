//! Chat execution layer.
//!
//! Sits between callers (UI, CLI) and the model service:
//! - composing the service with layers (logging, retry)
//! - running streams on worker tasks so the caller's loop stays free
//! - persisting completed exchanges to the conversation store

pub mod executor;

pub use executor::{ChatExecutor, ChatExecutorBuilder};
