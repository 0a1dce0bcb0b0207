//! Retry layer with exponential backoff.
//!
//! Only transport failures are retried (see [`AftpError::is_retryable`]).
//! Streams are retried while connecting, never mid-stream.

use aftp_core::error::AftpError;
use aftp_core::impl_layered_service;
use aftp_core::layer::{Layer, LayeredService};
use aftp_core::service::{ModelService, TextStream};
use aftp_core::types::*;
use aftp_core::CancellationToken;
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;

/// Retry layer configuration
#[derive(Debug, Clone)]
pub struct RetryLayer {
    max_retries: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
}

impl RetryLayer {
    /// Create a new retry layer with default settings
    pub fn new() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }

    /// Set maximum number of retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set initial delay
    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    /// Set maximum delay
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let delay = Duration::from_millis(delay_ms as u64);
        delay.min(self.max_delay)
    }
}

impl Default for RetryLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ModelService> Layer<S> for RetryLayer {
    type LayeredService = RetryService<S>;

    fn layer(&self, inner: S) -> Self::LayeredService {
        RetryService {
            inner,
            config: self.clone(),
        }
    }
}

/// Service wrapped with retry logic
#[derive(Debug)]
pub struct RetryService<S> {
    inner: S,
    config: RetryLayer,
}

impl<S: ModelService> RetryService<S> {
    async fn execute_with_retry<T, F, Fut>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> Result<T, AftpError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, AftpError>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !e.is_retryable() || attempt >= self.config.max_retries {
                        return Err(e);
                    }

                    let delay = self.config.calculate_delay(attempt);
                    tracing::debug!(
                        "{} retry attempt {}/{} after {}, waiting {:?}",
                        operation_name,
                        attempt + 1,
                        self.config.max_retries,
                        e,
                        delay
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[async_trait]
impl<S: ModelService> LayeredService for RetryService<S> {
    type Inner = S;

    fn inner(&self) -> &Self::Inner {
        &self.inner
    }

    async fn layered_pull_model(
        &self,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<String, AftpError> {
        self.execute_with_retry("pull_model", || self.inner.pull_model(name, timeout))
            .await
    }

    async fn layered_delete_model(
        &self,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<String, AftpError> {
        self.execute_with_retry("delete_model", || self.inner.delete_model(name, timeout))
            .await
    }

    async fn layered_generate(&self, req: GenerateRequest) -> Result<TextResult, AftpError> {
        self.execute_with_retry("generate", || {
            let req = req.clone();
            async move { self.inner.generate(req).await }
        })
        .await
    }

    async fn layered_generate_stream(
        &self,
        req: GenerateRequest,
        cancel: CancellationToken,
    ) -> Result<Box<TextStream>, AftpError> {
        self.execute_with_retry("generate_stream", || {
            let req = req.clone();
            let cancel = cancel.clone();
            async move { self.inner.generate_stream(req, cancel).await }
        })
        .await
    }
}

impl_layered_service!(RetryService<S>);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FlakyService;
    use futures::StreamExt;

    fn fast_retry(max_retries: u32) -> RetryLayer {
        RetryLayer::new()
            .with_max_retries(max_retries)
            .with_initial_delay(Duration::from_millis(1))
    }

    #[test]
    fn test_delay_is_capped() {
        let layer = RetryLayer::new().with_max_delay(Duration::from_millis(250));
        assert_eq!(layer.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(layer.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(layer.calculate_delay(5), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_retries_transport_failures() {
        let service = fast_retry(3).layer(FlakyService::new(2));
        let message = service.pull_model("m", None).await.unwrap();
        assert_eq!(message, "pulled m");
        assert_eq!(service.inner().calls(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let service = fast_retry(1).layer(FlakyService::new(5));
        let err = service.generate(GenerateRequest::new("m", "p")).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(service.inner().calls(), 2);
    }

    #[tokio::test]
    async fn test_service_errors_are_not_retried() {
        let service = fast_retry(3).layer(FlakyService::rejecting());
        let err = service.delete_model("m", None).await.unwrap_err();
        assert!(matches!(err, AftpError::Service(_)));
        assert_eq!(service.inner().calls(), 1);
    }

    #[tokio::test]
    async fn test_stream_connect_is_retried() {
        let service = fast_retry(2).layer(FlakyService::new(1));
        let mut stream = service
            .generate_stream(GenerateRequest::new("m", "p"), CancellationToken::new())
            .await
            .unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.delta, "ok");
        assert_eq!(service.inner().calls(), 2);
    }
}
