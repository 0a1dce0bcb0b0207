//! # AFTP Layers
//!
//! Built-in layers for model services.
//!
//! Currently implemented layers:
//! - `LoggingLayer`: Logs every service operation with a request id and timing
//! - `RetryLayer`: Automatic retry with exponential backoff for transport errors
//!
//! ## Usage
//!
//! ```ignore
//! use aftp_core::ChatExecutor;
//! use aftp_layer::{LoggingLayer, RetryLayer};
//!
//! let executor = ChatExecutor::builder(service)
//!     .layer(LoggingLayer::new())
//!     .layer(RetryLayer::new().with_max_retries(3))
//!     .finish();
//! ```

pub mod logging;
pub mod retry;

#[cfg(test)]
mod testing;

// Re-exports
pub use logging::{LoggingLayer, LoggingService};
pub use retry::{RetryLayer, RetryService};
