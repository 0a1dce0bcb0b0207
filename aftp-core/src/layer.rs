//! Layer trait and abstractions.
//!
//! Layers wrap a model service with cross-cutting concerns like logging and
//! retry. Each layer wraps an inner service and returns a new service.

use crate::config::ServiceEndpoint;
use crate::error::AftpError;
use crate::service::{ModelService, TextStream};
use crate::types::*;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Layer trait for wrapping services.
pub trait Layer<S: ModelService> {
    /// The type of the layered service
    type LayeredService: ModelService;

    /// Wrap the inner service with this layer
    fn layer(&self, inner: S) -> Self::LayeredService;
}

/// Helper trait for layered services.
///
/// Provides forwarding implementations for every service method.
/// Implementers only override the methods they want to intercept.
#[async_trait]
pub trait LayeredService: Sized + ModelService {
    /// The inner service type
    type Inner: ModelService;

    /// Get a reference to the inner service
    fn inner(&self) -> &Self::Inner;

    fn layered_info(&self) -> Arc<ServiceInfo> {
        self.inner().info()
    }

    fn layered_endpoint(&self) -> ServiceEndpoint {
        self.inner().endpoint()
    }

    async fn layered_server_reachable(&self, timeout: Option<Duration>) -> bool {
        self.inner().server_reachable(timeout).await
    }

    async fn layered_list_models(&self) -> Vec<String> {
        self.inner().list_models().await
    }

    async fn layered_pull_model(
        &self,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<String, AftpError> {
        self.inner().pull_model(name, timeout).await
    }

    async fn layered_delete_model(
        &self,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<String, AftpError> {
        self.inner().delete_model(name, timeout).await
    }

    async fn layered_generate(&self, req: GenerateRequest) -> Result<TextResult, AftpError> {
        self.inner().generate(req).await
    }

    async fn layered_generate_stream(
        &self,
        req: GenerateRequest,
        cancel: CancellationToken,
    ) -> Result<Box<TextStream>, AftpError> {
        self.inner().generate_stream(req, cancel).await
    }
}

/// Implement `ModelService` for a type by forwarding to its
/// `LayeredService` methods.
///
/// The wrapped type must be generic over its inner service as `S`,
/// e.g. `impl_layered_service!(LoggingService<S>);`.
#[macro_export]
macro_rules! impl_layered_service {
    ($type:ty) => {
        #[async_trait::async_trait]
        impl<S: $crate::service::ModelService> $crate::service::ModelService for $type {
            fn info(&self) -> std::sync::Arc<$crate::types::ServiceInfo> {
                $crate::layer::LayeredService::layered_info(self)
            }

            fn endpoint(&self) -> $crate::config::ServiceEndpoint {
                $crate::layer::LayeredService::layered_endpoint(self)
            }

            async fn server_reachable(&self, timeout: Option<std::time::Duration>) -> bool {
                $crate::layer::LayeredService::layered_server_reachable(self, timeout).await
            }

            async fn list_models(&self) -> Vec<String> {
                $crate::layer::LayeredService::layered_list_models(self).await
            }

            async fn pull_model(
                &self,
                name: &str,
                timeout: Option<std::time::Duration>,
            ) -> ::std::result::Result<String, $crate::error::AftpError> {
                $crate::layer::LayeredService::layered_pull_model(self, name, timeout).await
            }

            async fn delete_model(
                &self,
                name: &str,
                timeout: Option<std::time::Duration>,
            ) -> ::std::result::Result<String, $crate::error::AftpError> {
                $crate::layer::LayeredService::layered_delete_model(self, name, timeout).await
            }

            async fn generate(
                &self,
                req: $crate::types::GenerateRequest,
            ) -> ::std::result::Result<$crate::types::TextResult, $crate::error::AftpError> {
                $crate::layer::LayeredService::layered_generate(self, req).await
            }

            async fn generate_stream(
                &self,
                req: $crate::types::GenerateRequest,
                cancel: $crate::CancellationToken,
            ) -> ::std::result::Result<Box<$crate::service::TextStream>, $crate::error::AftpError> {
                $crate::layer::LayeredService::layered_generate_stream(self, req, cancel).await
            }
        }
    };
}
