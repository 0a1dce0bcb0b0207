//! Model service trait and core abstractions.

use crate::config::ServiceEndpoint;
use crate::error::AftpError;
use crate::types::*;
use async_trait::async_trait;
use futures::Stream;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Stream type alias for generated text chunks
pub type TextStream = dyn Stream<Item = Result<TextChunk, AftpError>> + Send + Unpin;

/// Core trait for the locally running model service.
///
/// Implementations hide endpoint resolution and protocol parsing. Layers wrap
/// a service to add cross-cutting behavior (logging, retry).
#[async_trait]
pub trait ModelService: Send + Sync + Debug + 'static {
    /// Get service information
    fn info(&self) -> Arc<ServiceInfo>;

    /// The endpoint the next call would use
    fn endpoint(&self) -> ServiceEndpoint;

    /// Lightweight status check. Any network failure yields `false`.
    async fn server_reachable(&self, timeout: Option<Duration>) -> bool;

    /// Available models, first-seen order, de-duplicated.
    ///
    /// Any failure yields an empty list, which means "unknown", not "none".
    async fn list_models(&self) -> Vec<String>;

    /// Pull a model, draining the progress stream before returning
    async fn pull_model(&self, name: &str, timeout: Option<Duration>) -> Result<String, AftpError>;

    /// Delete a model
    async fn delete_model(&self, name: &str, timeout: Option<Duration>)
        -> Result<String, AftpError>;

    /// Generate text.
    ///
    /// With `req.stream == false` this is a single buffered request; otherwise
    /// the streaming protocol is consumed and concatenated.
    async fn generate(&self, req: GenerateRequest) -> Result<TextResult, AftpError>;

    /// Stream generated text.
    ///
    /// The returned stream yields fragments in service order and ends with a
    /// chunk carrying a [`FinishReason`]. Cancelling `cancel` closes the
    /// connection and ends the stream with [`FinishReason::Cancelled`].
    async fn generate_stream(
        &self,
        req: GenerateRequest,
        cancel: CancellationToken,
    ) -> Result<Box<TextStream>, AftpError>;
}

/// Helper function to collect a text stream into a result.
///
/// A stream that ends without a finish chunk is reported as
/// [`FinishReason::Closed`]. Cancellation is not an error: the text received
/// so far is returned with [`FinishReason::Cancelled`].
pub async fn collect_text_stream(
    model: impl Into<String>,
    mut stream: Box<TextStream>,
) -> Result<TextResult, AftpError> {
    use futures::StreamExt;

    let mut content = String::new();
    let mut finish_reason = None;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        content.push_str(&chunk.delta);

        if let Some(reason) = chunk.finish_reason {
            finish_reason = Some(reason);
            break;
        }
    }

    Ok(TextResult {
        content,
        finish_reason: finish_reason.unwrap_or(FinishReason::Closed),
        model: model.into(),
    })
}
