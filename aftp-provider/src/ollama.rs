//! Ollama model service client built on reqwest.
//!
//! Every call resolves the endpoint afresh from the [`ServiceConfig`], so a
//! changed `OLLAMA_HOST` or settings file takes effect on the next call.

use crate::ndjson::{GenerateDecoder, LineBuffer, PullProgress, StreamEvent};
use aftp_core::config::{ServiceConfig, ServiceEndpoint};
use aftp_core::error::AftpError;
use aftp_core::service::{collect_text_stream, ModelService, TextStream};
use aftp_core::types::*;
use aftp_core::CancellationToken;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Client for a locally running Ollama server
#[derive(Clone)]
pub struct OllamaService {
    client: reqwest::Client,
    config: ServiceConfig,
    info: Arc<ServiceInfo>,
}

impl std::fmt::Debug for OllamaService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaService")
            .field("info", &self.info)
            .field("config", &self.config)
            .finish()
    }
}

impl OllamaService {
    /// Create a client with default configuration
    pub fn new() -> Result<Self, AftpError> {
        Self::builder().build()
    }

    /// Create a builder for more configuration options
    pub fn builder() -> OllamaBuilder {
        OllamaBuilder::default()
    }

    /// Current configuration
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn timeout_or(&self, timeout: Option<Duration>, default: Duration) -> Duration {
        timeout.unwrap_or(default)
    }

    async fn error_from_response(response: reqwest::Response) -> AftpError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(body);

        if detail.trim().is_empty() {
            AftpError::service(status.to_string())
        } else {
            AftpError::service(format!("{}: {}", status, detail.trim()))
        }
    }

    fn generate_payload(req: &GenerateRequest, stream: bool) -> Value {
        let mut payload = json!({
            "model": req.model,
            "prompt": req.prompt,
            "stream": stream,
        });
        if let Some(options) = &req.options {
            payload["options"] = Value::Object(options.clone());
        }
        payload
    }

    async fn generate_buffered(&self, req: &GenerateRequest) -> Result<TextResult, AftpError> {
        let endpoint = self.endpoint();
        let timeout = self.timeout_or(req.timeout, self.config.generate_timeout);

        let response = self
            .client
            .post(endpoint.url("/api/generate"))
            .json(&Self::generate_payload(req, false))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| AftpError::from_transport(e, &endpoint.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AftpError::from_transport(e, &endpoint.to_string()))?;

        if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
            let message = error
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(AftpError::service(message));
        }

        Ok(TextResult {
            content: body
                .get("response")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            finish_reason: FinishReason::Done,
            model: req.model.clone(),
        })
    }
}

/// Pull model names out of a listing response.
///
/// Accepts `{"models": [..]}` or `{"data": [..]}` (or a bare array), where
/// each entry is a string or an object with `name` or `model`. First-seen
/// order is kept and duplicates are dropped.
pub fn parse_model_list(body: &Value) -> Vec<String> {
    let entries = body
        .get("models")
        .or_else(|| body.get("data"))
        .unwrap_or(body)
        .as_array();

    let Some(entries) = entries else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(name) => Some(name.clone()),
            Value::Object(obj) => obj
                .get("name")
                .or_else(|| obj.get("model"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .filter(|name| !name.is_empty() && seen.insert(name.clone()))
        .collect()
}

#[async_trait]
impl ModelService for OllamaService {
    fn info(&self) -> Arc<ServiceInfo> {
        self.info.clone()
    }

    fn endpoint(&self) -> ServiceEndpoint {
        self.config.endpoint()
    }

    async fn server_reachable(&self, timeout: Option<Duration>) -> bool {
        let endpoint = self.endpoint();
        let timeout = self.timeout_or(timeout, self.config.status_timeout);

        match self
            .client
            .get(endpoint.url("/api/tags"))
            .timeout(timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("service at {} not reachable: {}", endpoint, e);
                false
            }
        }
    }

    async fn list_models(&self) -> Vec<String> {
        let endpoint = self.endpoint();

        let response = match self
            .client
            .get(endpoint.url("/api/tags"))
            .timeout(self.config.list_timeout)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::debug!("model listing returned {}", response.status());
                return Vec::new();
            }
            Err(e) => {
                tracing::debug!("model listing failed at {}: {}", endpoint, e);
                return Vec::new();
            }
        };

        match response.json::<Value>().await {
            Ok(body) => parse_model_list(&body),
            Err(e) => {
                tracing::debug!("model listing was not JSON: {}", e);
                Vec::new()
            }
        }
    }

    async fn pull_model(&self, name: &str, timeout: Option<Duration>) -> Result<String, AftpError> {
        let endpoint = self.endpoint();
        let timeout = self.timeout_or(timeout, self.config.pull_timeout);

        let response = self
            .client
            .post(endpoint.url("/api/pull"))
            .json(&json!({ "name": name, "model": name, "stream": true }))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| AftpError::from_transport(e, &endpoint.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        // The pull only completes server side once the progress stream is read to the end.
        let mut body = response.bytes_stream();
        let mut lines = LineBuffer::new();
        let mut progress = PullProgress::default();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| AftpError::from_transport(e, &endpoint.to_string()))?;
            for line in lines.push(&chunk) {
                progress.observe_line(&line);
            }
        }
        if let Some(line) = lines.finish() {
            progress.observe_line(&line);
        }

        if let Some(error) = progress.error {
            return Err(AftpError::service(error));
        }

        tracing::debug!(
            "pulled {} after {} progress objects (last status: {:?})",
            name,
            progress.objects,
            progress.last_status
        );
        Ok(format!("pulled {}", name))
    }

    async fn delete_model(
        &self,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<String, AftpError> {
        let endpoint = self.endpoint();
        let timeout = self.timeout_or(timeout, self.config.delete_timeout);
        let payload = json!({ "name": name, "model": name });

        let response = self
            .client
            .delete(endpoint.url("/api/delete"))
            .json(&payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| AftpError::from_transport(e, &endpoint.to_string()))?;

        if response.status().is_success() {
            return Ok(format!("deleted {}", name));
        }

        tracing::debug!(
            "DELETE /api/delete returned {}, retrying as POST",
            response.status()
        );

        let response = self
            .client
            .post(endpoint.url("/api/delete"))
            .json(&payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| AftpError::from_transport(e, &endpoint.to_string()))?;

        if response.status().is_success() {
            Ok(format!("deleted {}", name))
        } else {
            Err(Self::error_from_response(response).await)
        }
    }

    async fn generate(&self, req: GenerateRequest) -> Result<TextResult, AftpError> {
        if !req.stream {
            return self.generate_buffered(&req).await;
        }

        let model = req.model.clone();
        let stream = self
            .generate_stream(req, CancellationToken::new())
            .await?;
        collect_text_stream(model, stream).await
    }

    async fn generate_stream(
        &self,
        req: GenerateRequest,
        cancel: CancellationToken,
    ) -> Result<Box<TextStream>, AftpError> {
        let endpoint = self.endpoint();
        let timeout = self.timeout_or(req.timeout, self.config.generate_timeout);

        let send = self
            .client
            .post(endpoint.url("/api/generate"))
            .json(&Self::generate_payload(&req, true))
            .timeout(timeout)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            response = send => Some(response),
        };

        let response = match response {
            None => {
                let stream = futures::stream::iter(vec![Ok(TextChunk::finish(
                    FinishReason::Cancelled,
                ))]);
                return Ok(Box::new(stream));
            }
            Some(response) => {
                response.map_err(|e| AftpError::from_transport(e, &endpoint.to_string()))?
            }
        };

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let label = endpoint.to_string();
        let stream = async_stream::stream! {
            let mut body = response.bytes_stream();
            let mut decoder = GenerateDecoder::new();

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Next::Cancelled,
                    item = body.next() => Next::Item(item),
                };

                let (events, eof) = match next {
                    Next::Cancelled => {
                        tracing::debug!("generation stream from {} cancelled", label);
                        yield Ok(TextChunk::finish(FinishReason::Cancelled));
                        return;
                    }
                    Next::Item(Some(Ok(bytes))) => (decoder.push(&bytes), false),
                    Next::Item(Some(Err(e))) => {
                        yield Err(AftpError::stream(format!("{}: {}", label, e)));
                        return;
                    }
                    Next::Item(None) => (decoder.finish(), true),
                };

                for event in events {
                    let terminal = event.is_terminal();
                    yield event_chunk(event);
                    if terminal {
                        return;
                    }
                }

                if eof {
                    yield Ok(TextChunk::finish(FinishReason::Closed));
                    return;
                }
            }
        };

        Ok(Box::new(Box::pin(stream)))
    }
}

enum Next<T> {
    Cancelled,
    Item(Option<T>),
}

fn event_chunk(event: StreamEvent) -> Result<TextChunk, AftpError> {
    match event {
        StreamEvent::Fragment(text) => Ok(TextChunk::fragment(text)),
        StreamEvent::Error(message) => Err(AftpError::service(message)),
        StreamEvent::Done => Ok(TextChunk::finish(FinishReason::Done)),
    }
}

/// Builder for [`OllamaService`]
#[derive(Debug, Default)]
pub struct OllamaBuilder {
    config: ServiceConfig,
    client: Option<reqwest::Client>,
}

impl OllamaBuilder {
    /// Set the host (`host` or `host:port`, optionally with a scheme)
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config = self.config.with_host(host);
        self
    }

    /// Set the port used when the host carries none
    pub fn port(mut self, port: u16) -> Self {
        self.config = self.config.with_port(port);
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a preconfigured HTTP client
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Build the service
    pub fn build(self) -> Result<OllamaService, AftpError> {
        self.build_with_id("ollama", "Ollama")
    }

    /// Build with a custom service id and name
    pub fn build_with_id(
        self,
        id: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<OllamaService, AftpError> {
        let client = match self.client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .build()
                .map_err(|e| AftpError::configuration(format!("HTTP client: {}", e)))?,
        };

        Ok(OllamaService {
            client,
            config: self.config,
            info: Arc::new(ServiceInfo {
                id: id.into(),
                name: name.into(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aftp_core::ChatExecutor;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service_for(server: &MockServer) -> OllamaService {
        OllamaService::builder()
            .host(server.address().to_string())
            .build()
            .unwrap()
    }

    fn closed_port_service() -> OllamaService {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        OllamaService::builder()
            .host(format!("127.0.0.1:{}", port))
            .build()
            .unwrap()
    }

    fn ndjson(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "application/x-ndjson")
    }

    #[test]
    fn test_parse_model_list_shapes() {
        let body = json!({"models": [{"model": "a"}, {"name": "a"}, {"name": "b"}]});
        assert_eq!(parse_model_list(&body), vec!["a", "b"]);

        let body = json!({"data": ["x", {"model": "y"}, 3, "x"]});
        assert_eq!(parse_model_list(&body), vec!["x", "y"]);

        assert!(parse_model_list(&json!({"unexpected": true})).is_empty());
    }

    #[test]
    fn test_endpoint_follows_config() {
        let service = OllamaService::builder().host("gpu-box").port(8080).build().unwrap();
        assert_eq!(service.endpoint().base_url(), "http://gpu-box:8080");
    }

    #[tokio::test]
    async fn test_reachable_and_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"models": [{"name": "llama3:8b"}, {"name": "llama3:8b"}, {"model": "phi3"}]}),
            ))
            .mount(&server)
            .await;

        let service = service_for(&server);
        assert!(service.server_reachable(None).await);
        assert_eq!(service.list_models().await, vec!["llama3:8b", "phi3"]);
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        let service = closed_port_service();
        assert!(!service.server_reachable(Some(Duration::from_millis(500))).await);
        assert!(service.list_models().await.is_empty());

        let err = service.pull_model("m", None).await.unwrap_err();
        assert!(matches!(err, AftpError::Unreachable(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_pull_drains_progress_stream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pull"))
            .and(body_partial_json(json!({"name": "phi3", "stream": true})))
            .respond_with(ndjson(
                "{\"status\":\"pulling manifest\"}\n{\"status\":\"downloading\",\"completed\":10}\n{\"status\":\"success\"}\n",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let message = service_for(&server).pull_model("phi3", None).await.unwrap();
        assert_eq!(message, "pulled phi3");
    }

    #[tokio::test]
    async fn test_pull_reports_streamed_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pull"))
            .respond_with(ndjson(
                "{\"status\":\"pulling manifest\"}\n{\"error\":\"pull model manifest: file does not exist\"}\n",
            ))
            .mount(&server)
            .await;

        let err = service_for(&server).pull_model("nope", None).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Service error: pull model manifest: file does not exist"
        );
    }

    #[tokio::test]
    async fn test_delete_falls_back_to_post() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/delete"))
            .respond_with(ResponseTemplate::new(405))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/delete"))
            .and(body_partial_json(json!({"name": "phi3"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let message = service_for(&server).delete_model("phi3", None).await.unwrap();
        assert_eq!(message, "deleted phi3");
    }

    #[tokio::test]
    async fn test_delete_fallback_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/delete"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/delete"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"error": "model 'x' not found"})),
            )
            .mount(&server)
            .await;

        let err = service_for(&server).delete_model("x", None).await.unwrap_err();
        assert!(err.to_string().contains("model 'x' not found"), "{err}");
    }

    #[tokio::test]
    async fn test_generate_buffered() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({
                "model": "m",
                "prompt": "hi",
                "stream": false,
                "options": {"temperature": 0.2}
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"response": "hello", "done": true})),
            )
            .mount(&server)
            .await;

        let req = GenerateRequest::new("m", "hi").with_option("temperature", json!(0.2));
        let result = service_for(&server).generate(req).await.unwrap();
        assert_eq!(result.content, "hello");
        assert_eq!(result.finish_reason, FinishReason::Done);
    }

    #[tokio::test]
    async fn test_generate_stream_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(ndjson(
                "data: {\"response\":\"Hi\"}\n\n{\"response\":\" there\"}\n{\"done\":true}\n",
            ))
            .mount(&server)
            .await;

        let service = service_for(&server);
        let mut stream = service
            .generate_stream(GenerateRequest::new("m", "p"), CancellationToken::new())
            .await
            .unwrap();

        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next().await {
            chunks.push(chunk.unwrap());
        }
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].delta, "Hi");
        assert_eq!(chunks[1].delta, " there");
        assert_eq!(chunks[2].finish_reason, Some(FinishReason::Done));

        let collected = service
            .generate(GenerateRequest::new("m", "p").with_stream(true))
            .await
            .unwrap();
        assert_eq!(collected.content, "Hi there");
    }

    #[tokio::test]
    async fn test_generate_stream_error_object() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ndjson("{\"response\":\"a\"}\n{\"error\":\"model not found\"}\n"))
            .mount(&server)
            .await;

        let err = service_for(&server)
            .generate(GenerateRequest::new("m", "p").with_stream(true))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Service error: model not found");
    }

    #[tokio::test]
    async fn test_generate_stream_without_done_is_closed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ndjson("{\"response\":\"partial\"}"))
            .mount(&server)
            .await;

        let result = service_for(&server)
            .generate(GenerateRequest::new("m", "p").with_stream(true))
            .await
            .unwrap();
        assert_eq!(result.content, "partial");
        assert_eq!(result.finish_reason, FinishReason::Closed);
    }

    #[tokio::test]
    async fn test_cancelled_stream_ends_with_cancelled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ndjson("{\"response\":\"x\"}\n{\"done\":true}\n"))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let stream = service_for(&server)
            .generate_stream(GenerateRequest::new("m", "p"), cancel)
            .await
            .unwrap();
        let result = collect_text_stream("m", stream).await.unwrap();
        assert!(result.is_cancelled());
        assert!(result.content.is_empty());
    }

    /// Answers one request with chunked headers and `first`, then stalls.
    /// The receiver fires once the client closes the connection.
    async fn stalling_server(first: &'static str) -> (OllamaService, oneshot::Receiver<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (closed_tx, closed_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let mut head = String::from(
                "HTTP/1.1 200 OK\r\ncontent-type: application/x-ndjson\r\ntransfer-encoding: chunked\r\n\r\n",
            );
            if !first.is_empty() {
                head.push_str(&format!("{:x}\r\n{}\r\n", first.len(), first));
            }
            socket.write_all(head.as_bytes()).await.unwrap();

            while let Ok(n) = socket.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
            let _ = closed_tx.send(());
        });

        let service = OllamaService::builder()
            .host(addr.to_string())
            .build()
            .unwrap();
        (service, closed_rx)
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_keeps_partial_text() {
        let (service, closed) = stalling_server("{\"response\":\"Hel\"}\n").await;
        let cancel = CancellationToken::new();
        let mut stream = service
            .generate_stream(GenerateRequest::new("m", "p"), cancel.clone())
            .await
            .unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.delta, "Hel");

        cancel.cancel();
        let rest = tokio::time::timeout(Duration::from_secs(3), collect_text_stream("m", stream))
            .await
            .unwrap()
            .unwrap();
        assert!(rest.is_cancelled());
        assert_eq!(format!("{}{}", first.delta, rest.content), "Hel");

        tokio::time::timeout(Duration::from_secs(3), closed)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropping_spawned_stream_closes_connection() {
        let (service, closed) = stalling_server("").await;
        let executor = ChatExecutor::builder(service).finish();

        let stream = executor.spawn_stream(
            GenerateRequest::new("m", "p").with_stream(true),
            CancellationToken::new(),
        );
        tokio::time::sleep(Duration::from_millis(300)).await;
        drop(stream);

        tokio::time::timeout(Duration::from_secs(3), closed)
            .await
            .unwrap()
            .unwrap();
    }
}
