//! Scripted service used by the layer tests.

use aftp_core::config::ServiceEndpoint;
use aftp_core::error::AftpError;
use aftp_core::service::{ModelService, TextStream};
use aftp_core::types::*;
use aftp_core::CancellationToken;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Fails the first `failures` fallible calls with a transport error.
#[derive(Debug)]
pub struct FlakyService {
    failures: u32,
    reject: bool,
    calls: AtomicU32,
}

impl FlakyService {
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            reject: false,
            calls: AtomicU32::new(0),
        }
    }

    /// Always answers with a service error
    pub fn rejecting() -> Self {
        Self {
            failures: 0,
            reject: true,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn attempt(&self) -> Result<(), AftpError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            Err(AftpError::service("rejected"))
        } else if call < self.failures {
            Err(AftpError::unreachable("127.0.0.1:11434"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ModelService for FlakyService {
    fn info(&self) -> Arc<ServiceInfo> {
        Arc::new(ServiceInfo {
            id: "flaky".to_string(),
            name: "Flaky".to_string(),
        })
    }

    fn endpoint(&self) -> ServiceEndpoint {
        ServiceEndpoint::default()
    }

    async fn server_reachable(&self, _timeout: Option<Duration>) -> bool {
        true
    }

    async fn list_models(&self) -> Vec<String> {
        vec!["m".to_string()]
    }

    async fn pull_model(&self, name: &str, _timeout: Option<Duration>) -> Result<String, AftpError> {
        self.attempt()?;
        Ok(format!("pulled {}", name))
    }

    async fn delete_model(
        &self,
        name: &str,
        _timeout: Option<Duration>,
    ) -> Result<String, AftpError> {
        self.attempt()?;
        Ok(format!("deleted {}", name))
    }

    async fn generate(&self, req: GenerateRequest) -> Result<TextResult, AftpError> {
        self.attempt()?;
        Ok(TextResult {
            content: "ok".to_string(),
            finish_reason: FinishReason::Done,
            model: req.model,
        })
    }

    async fn generate_stream(
        &self,
        _req: GenerateRequest,
        _cancel: CancellationToken,
    ) -> Result<Box<TextStream>, AftpError> {
        self.attempt()?;
        Ok(Box::new(futures::stream::iter(vec![
            Ok(TextChunk::fragment("ok")),
            Ok(TextChunk::finish(FinishReason::Done)),
        ])))
    }
}
