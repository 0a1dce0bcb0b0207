//! ChatExecutor implementation.
//!
//! The executor owns a type-erased, layered [`ModelService`] and an optional
//! [`ConversationStore`]. Generation output is written to a conversation only
//! after the generation completed; a cancelled generation leaves the store
//! untouched.

use crate::error::AftpError;
use crate::layer::Layer;
use crate::service::{collect_text_stream, ModelService, TextStream};
use crate::store::ConversationStore;
use crate::types::*;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// Type-erased service that can be shared across tasks
type BoxedService = Arc<dyn ModelService>;

/// Buffered fragments between a stream worker and its consumer
const STREAM_CHANNEL_CAPACITY: usize = 64;

/// Builder for composing a model service with layers and storage.
///
/// # Example
///
/// ```ignore
/// let executor = ChatExecutor::builder(OllamaService::new(config))
///     .layer(LoggingLayer::new())
///     .layer(RetryLayer::new())
///     .conversations(Arc::new(ConversationStore::new(dir)))
///     .default_model("llama3:8b")
///     .finish();
/// ```
pub struct ChatExecutorBuilder<S> {
    service: S,
    conversations: Option<Arc<ConversationStore>>,
    default_model: Option<String>,
}

impl<S: ModelService> ChatExecutorBuilder<S> {
    /// Create a new builder with a service
    pub fn new(service: S) -> Self {
        Self {
            service,
            conversations: None,
            default_model: None,
        }
    }

    /// Add a layer to wrap the service
    ///
    /// Each call wraps the previous service in a new concrete type.
    pub fn layer<L>(self, layer: L) -> ChatExecutorBuilder<L::LayeredService>
    where
        L: Layer<S>,
    {
        ChatExecutorBuilder {
            service: layer.layer(self.service),
            conversations: self.conversations,
            default_model: self.default_model,
        }
    }

    /// Persist chats to this store
    pub fn conversations(mut self, store: Arc<ConversationStore>) -> Self {
        self.conversations = Some(store);
        self
    }

    /// Model used by conversations that have none bound
    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// Finish building and create a ChatExecutor
    pub fn finish(self) -> ChatExecutor {
        ChatExecutor {
            service: Arc::new(self.service),
            conversations: self.conversations,
            default_model: self.default_model,
        }
    }
}

/// Entry point for model service calls and chats.
#[derive(Clone)]
pub struct ChatExecutor {
    service: BoxedService,
    conversations: Option<Arc<ConversationStore>>,
    default_model: Option<String>,
}

impl std::fmt::Debug for ChatExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatExecutor")
            .field("service", &self.service.info().id)
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl ChatExecutor {
    /// Create a new builder
    pub fn builder<S: ModelService>(service: S) -> ChatExecutorBuilder<S> {
        ChatExecutorBuilder::new(service)
    }

    /// Get service information
    pub fn info(&self) -> Arc<ServiceInfo> {
        self.service.info()
    }

    /// The layered service
    pub fn service(&self) -> &Arc<dyn ModelService> {
        &self.service
    }

    /// The conversation store, if configured
    pub fn conversations(&self) -> Option<&Arc<ConversationStore>> {
        self.conversations.as_ref()
    }

    pub async fn server_reachable(&self, timeout: Option<Duration>) -> bool {
        self.service.server_reachable(timeout).await
    }

    pub async fn list_models(&self) -> Vec<String> {
        self.service.list_models().await
    }

    pub async fn pull_model(&self, name: &str, timeout: Option<Duration>) -> Result<String, AftpError> {
        self.service.pull_model(name, timeout).await
    }

    pub async fn delete_model(
        &self,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<String, AftpError> {
        self.service.delete_model(name, timeout).await
    }

    /// Generate text (buffered, or collected from the stream when
    /// `req.stream` is set)
    pub async fn generate_text(&self, req: GenerateRequest) -> Result<TextResult, AftpError> {
        self.service.generate(req).await
    }

    /// Stream text on the caller's task
    pub async fn stream_text(
        &self,
        req: GenerateRequest,
        cancel: CancellationToken,
    ) -> Result<Box<TextStream>, AftpError> {
        self.service.generate_stream(req, cancel).await
    }

    /// Stream text from a worker task.
    ///
    /// Fragments arrive on the returned stream in service order. Dropping
    /// the receiver cancels the generation and closes the connection, also
    /// while the service is connecting or stalled between fragments.
    pub fn spawn_stream(
        &self,
        req: GenerateRequest,
        cancel: CancellationToken,
    ) -> ReceiverStream<Result<TextChunk, AftpError>> {
        let (tx, rx) = tokio::sync::mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let service = self.service.clone();

        tokio::spawn(async move {
            let connected = tokio::select! {
                biased;
                _ = tx.closed() => {
                    tracing::debug!("stream consumer went away before the service answered");
                    cancel.cancel();
                    return;
                }
                connected = service.generate_stream(req, cancel.clone()) => connected,
            };

            let mut stream = match connected {
                Ok(stream) => stream,
                Err(err) => {
                    let _ = tx.send(Err(err)).await;
                    return;
                }
            };

            loop {
                let item = tokio::select! {
                    biased;
                    _ = tx.closed() => break,
                    item = stream.next() => item,
                };
                match item {
                    Some(item) => {
                        if tx.send(item).await.is_err() {
                            break;
                        }
                    }
                    None => return,
                }
            }

            // Consumer is gone; dropping the stream closes the connection.
            tracing::debug!("stream consumer went away, cancelling generation");
            cancel.cancel();
        });

        ReceiverStream::new(rx)
    }

    /// Send `prompt` in conversation `id` and record the exchange.
    ///
    /// Uses the conversation's bound model, or the default model. The user
    /// and assistant messages are appended together once the generation
    /// finished; a cancelled generation returns its partial text and
    /// persists nothing.
    pub async fn chat(
        &self,
        id: &str,
        prompt: impl Into<String>,
        options: Option<serde_json::Map<String, serde_json::Value>>,
        cancel: CancellationToken,
    ) -> Result<TextResult, AftpError> {
        let store = self.store()?;
        let conversation = store.load(id)?;
        let model = conversation
            .model
            .clone()
            .or_else(|| self.default_model.clone())
            .ok_or_else(|| {
                AftpError::configuration(format!("conversation '{}' has no bound model", id))
            })?;

        let prompt = prompt.into();
        let mut req = GenerateRequest::new(model.clone(), prompt.clone()).with_stream(true);
        if let Some(options) = options {
            req = req.with_options(options);
        }

        let stream = self.service.generate_stream(req, cancel).await?;
        let result = collect_text_stream(model, stream).await?;

        if result.is_cancelled() {
            tracing::debug!("chat in '{}' cancelled, nothing persisted", id);
            return Ok(result);
        }

        store.append_messages(
            id,
            vec![
                ChatMessage::user(prompt),
                ChatMessage::assistant(result.content.clone()),
            ],
        )?;
        Ok(result)
    }

    /// Bind a model to a conversation
    pub fn bind_model(&self, id: &str, model: impl Into<String>) -> Result<Conversation, AftpError> {
        let store = self.store()?;
        let mut conversation = store.load(id)?;
        conversation.model = Some(model.into());
        store.save(id, &conversation)?;
        Ok(conversation)
    }

    fn store(&self) -> Result<&Arc<ConversationStore>, AftpError> {
        self.conversations
            .as_ref()
            .ok_or_else(|| AftpError::configuration("no conversation store configured"))
    }
}
