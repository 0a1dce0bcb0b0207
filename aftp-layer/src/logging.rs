//! Logging layer for model service operations.

use aftp_core::error::AftpError;
use aftp_core::impl_layered_service;
use aftp_core::layer::{Layer, LayeredService};
use aftp_core::service::{ModelService, TextStream};
use aftp_core::types::*;
use aftp_core::CancellationToken;
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::{Duration, Instant};

/// Logging layer that logs service operations.
#[derive(Debug, Clone)]
pub struct LoggingLayer {
    prefix: String,
}

impl LoggingLayer {
    /// Create a new logging layer
    pub fn new() -> Self {
        Self {
            prefix: "[AFTP]".to_string(),
        }
    }

    /// Create a logging layer with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for LoggingLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ModelService> Layer<S> for LoggingLayer {
    type LayeredService = LoggingService<S>;

    fn layer(&self, inner: S) -> Self::LayeredService {
        LoggingService {
            inner,
            prefix: self.prefix.clone(),
        }
    }
}

/// Service wrapped with logging
#[derive(Debug)]
pub struct LoggingService<S> {
    inner: S,
    prefix: String,
}

impl<S: ModelService> LoggingService<S> {
    fn begin(&self, operation: &'static str, detail: &str) -> (RequestContext, Instant) {
        let ctx = RequestContext::new(&self.inner.info(), operation);
        tracing::debug!(
            "{} {} request: id={}, service={}, endpoint={}, {}",
            self.prefix,
            ctx.operation,
            ctx.request_id,
            ctx.service_id,
            self.inner.endpoint(),
            detail
        );
        (ctx, Instant::now())
    }

    fn finish<T>(&self, ctx: &RequestContext, start: Instant, result: &Result<T, AftpError>) {
        let elapsed = start.elapsed();
        match result {
            Ok(_) => {
                tracing::debug!(
                    "{} {} success: id={}, elapsed={:?}",
                    self.prefix,
                    ctx.operation,
                    ctx.request_id,
                    elapsed
                );
            }
            Err(e) => {
                tracing::error!(
                    "{} {} error: id={}, {:?}, elapsed={:?}",
                    self.prefix,
                    ctx.operation,
                    ctx.request_id,
                    e,
                    elapsed
                );
            }
        }
    }
}

#[async_trait]
impl<S: ModelService> LayeredService for LoggingService<S> {
    type Inner = S;

    fn inner(&self) -> &Self::Inner {
        &self.inner
    }

    async fn layered_server_reachable(&self, timeout: Option<Duration>) -> bool {
        let (ctx, start) = self.begin("server_reachable", "");
        let reachable = self.inner.server_reachable(timeout).await;
        tracing::debug!(
            "{} {}: id={}, reachable={}, elapsed={:?}",
            self.prefix,
            ctx.operation,
            ctx.request_id,
            reachable,
            start.elapsed()
        );
        reachable
    }

    async fn layered_list_models(&self) -> Vec<String> {
        let (ctx, start) = self.begin("list_models", "");
        let models = self.inner.list_models().await;
        tracing::debug!(
            "{} {}: id={}, models={}, elapsed={:?}",
            self.prefix,
            ctx.operation,
            ctx.request_id,
            models.len(),
            start.elapsed()
        );
        models
    }

    async fn layered_pull_model(
        &self,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<String, AftpError> {
        let (ctx, start) = self.begin("pull_model", &format!("model={}", name));
        let result = self.inner.pull_model(name, timeout).await;
        self.finish(&ctx, start, &result);
        result
    }

    async fn layered_delete_model(
        &self,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<String, AftpError> {
        let (ctx, start) = self.begin("delete_model", &format!("model={}", name));
        let result = self.inner.delete_model(name, timeout).await;
        self.finish(&ctx, start, &result);
        result
    }

    async fn layered_generate(&self, req: GenerateRequest) -> Result<TextResult, AftpError> {
        let detail = format!("model={}, prompt_chars={}", req.model, req.prompt.chars().count());
        let (ctx, start) = self.begin("generate", &detail);
        let result = self.inner.generate(req).await;
        if let Ok(text) = &result {
            tracing::debug!(
                "{} {}: id={}, finish={:?}, chars={}",
                self.prefix,
                ctx.operation,
                ctx.request_id,
                text.finish_reason,
                text.content.chars().count()
            );
        }
        self.finish(&ctx, start, &result);
        result
    }

    async fn layered_generate_stream(
        &self,
        req: GenerateRequest,
        cancel: CancellationToken,
    ) -> Result<Box<TextStream>, AftpError> {
        let detail = format!("model={}, prompt_chars={}", req.model, req.prompt.chars().count());
        let (ctx, start) = self.begin("generate_stream", &detail);
        let result = self.inner.generate_stream(req, cancel).await;
        self.finish(&ctx, start, &result);
        result
    }
}

impl_layered_service!(LoggingService<S>);
