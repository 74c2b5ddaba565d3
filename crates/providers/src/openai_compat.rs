//! OpenAI-compatible provider implementation.
//!
//! Works with: Ollama, vLLM, llama.cpp server, OpenAI, OpenRouter, and any
//! endpoint exposing `/chat/completions` and `/embeddings`.
//!
//! Supports:
//! - Streaming chat completions (SSE)
//! - Embeddings
//! - Health checks

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use medchat_core::error::ProviderError;
use medchat_core::message::PromptMessage;
use medchat_core::provider::*;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Upper bound for the non-streaming calls (`/embeddings`, `/models`).
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    request_timeout: Duration,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        // No client-wide timeout: a streamed reply may legitimately run for
        // minutes. Non-streaming calls set `request_timeout` per request.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
            request_timeout: REQUEST_TIMEOUT,
        }
    }

    /// Override the timeout applied to embedding and health-check calls.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    /// Convert prompt messages to OpenAI API format.
    fn to_api_messages(messages: &[PromptMessage]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role().as_str().into(),
                content: m.content().to_string(),
            })
            .collect()
    }

    /// Map a non-success HTTP status onto a provider error.
    async fn status_error(response: reqwest::Response, model: &str) -> ProviderError {
        let status = response.status().as_u16();
        match status {
            429 => ProviderError::RateLimited {
                retry_after_secs: 5,
            },
            401 | 403 => ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ),
            404 => ProviderError::ModelNotFound(model.to_string()),
            _ => {
                let error_body = response.text().await.unwrap_or_default();
                warn!(status, body = %error_body, "Provider returned error");
                ProviderError::ApiError {
                    status_code: status,
                    message: error_body,
                }
            }
        }
    }
}

#[async_trait]
impl medchat_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(transport_error)?;

        Ok(response.status().is_success())
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        let url = format!("{}/embeddings", self.base_url);

        let body = serde_json::json!({
            "model": request.model,
            "input": request.inputs,
            "encoding_format": "float",
        });

        debug!(
            provider = %self.name,
            model = %request.model,
            count = request.inputs.len(),
            "Sending embedding request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(Self::status_error(response, &request.model).await);
        }

        let api_resp: EmbeddingApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse embedding response: {e}"),
            })?;

        if api_resp.data.len() != request.inputs.len() {
            return Err(ProviderError::ApiError {
                status_code: 200,
                message: format!(
                    "Expected {} embeddings, got {}",
                    request.inputs.len(),
                    api_resp.data.len()
                ),
            });
        }

        let mut data = api_resp.data;
        data.sort_by_key(|d| d.index);
        let embeddings = data.into_iter().map(|d| d.embedding).collect();

        let usage = api_resp.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: 0,
            total_tokens: u.total_tokens,
        });

        Ok(EmbeddingResponse {
            embeddings,
            model: api_resp.model,
            usage,
        })
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<FragmentStream, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": true,
            "stream_options": { "include_usage": true },
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.stop.is_empty() {
            body["stop"] = serde_json::json!(request.stop);
        }

        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            "Sending streaming request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(Self::status_error(response, &request.model).await);
        }

        let (tx, rx) = mpsc::channel(64);
        let provider_name = self.name.clone();

        // Read the SSE byte stream on its own task; the receiver pulls one
        // chunk at a time and dropping it ends this task at the next send.
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.extend_from_slice(&bytes);

                while let Some(line) = next_line(&mut buffer) {
                    match parse_stream_line(&line) {
                        StreamLine::Skip => {}
                        StreamLine::Done => {
                            let _ = tx.send(Ok(final_chunk(None))).await;
                            return;
                        }
                        StreamLine::Failed(message) => {
                            let _ = tx
                                .send(Err(ProviderError::StreamInterrupted(message)))
                                .await;
                            return;
                        }
                        StreamLine::Unparseable { data, error } => {
                            trace!(
                                provider = %provider_name,
                                data = %data,
                                error = %error,
                                "Ignoring unparseable SSE chunk"
                            );
                        }
                        StreamLine::Chunk(stream_resp) => {
                            let content = stream_resp
                                .choices
                                .first()
                                .and_then(|c| c.delta.content.clone())
                                .filter(|c| !c.is_empty());

                            if let Some(content) = content
                                && tx.send(Ok(StreamChunk::text(content))).await.is_err()
                            {
                                return; // receiver dropped
                            }

                            if let Some(usage) = stream_resp.usage {
                                let usage = Usage {
                                    prompt_tokens: usage.prompt_tokens,
                                    completion_tokens: usage.completion_tokens,
                                    total_tokens: usage.total_tokens,
                                };
                                let _ = tx.send(Ok(final_chunk(Some(usage)))).await;
                                return;
                            }
                        }
                    }
                }
            }

            // Stream ended without [DONE]
            let _ = tx.send(Ok(final_chunk(None))).await;
        });

        Ok(rx)
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// Pop the next complete line from `buffer`, without its terminator.
///
/// Bytes after the last `\n` stay buffered, so a UTF-8 sequence split
/// across network chunks is only decoded once it is whole.
fn next_line(buffer: &mut Vec<u8>) -> Option<String> {
    let end = buffer.iter().position(|&b| b == b'\n')?;
    let line: Vec<u8> = buffer.drain(..=end).collect();
    let text = String::from_utf8_lossy(&line[..end]);
    Some(text.trim_end_matches('\r').to_string())
}

fn final_chunk(usage: Option<Usage>) -> StreamChunk {
    StreamChunk {
        content: None,
        done: true,
        usage,
    }
}

/// One decoded line of an upstream SSE response.
#[derive(Debug)]
enum StreamLine {
    /// Blank line, comment, or a field we do not use
    Skip,
    /// The `[DONE]` sentinel
    Done,
    /// An error object sent in place of a chunk
    Failed(String),
    Unparseable { data: String, error: String },
    Chunk(StreamResponse),
}

fn parse_stream_line(line: &str) -> StreamLine {
    if line.is_empty() || line.starts_with(':') {
        return StreamLine::Skip;
    }

    let Some(data) = line.strip_prefix("data:") else {
        return StreamLine::Skip;
    };
    let data = data.trim();

    if data == "[DONE]" {
        return StreamLine::Done;
    }

    match serde_json::from_str::<StreamResponse>(data) {
        Ok(resp) => match resp.error {
            Some(err) => StreamLine::Failed(err.message),
            None => StreamLine::Chunk(resp),
        },
        Err(e) => StreamLine::Unparseable {
            data: data.to_string(),
            error: e.to_string(),
        },
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

// --- Embedding API types ---

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
    model: String,
    usage: Option<EmbeddingApiUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiUsage {
    prompt_tokens: u32,
    total_tokens: u32,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use medchat_core::Provider;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[test]
    fn ollama_constructor() {
        let provider = OpenAiCompatProvider::ollama(None);
        assert_eq!(provider.name(), "ollama");
        assert!(provider.base_url.contains("localhost:11434"));
    }

    #[test]
    fn trailing_slash_trimmed() {
        let provider = OpenAiCompatProvider::new("vllm", "http://localhost:8000/v1/", "");
        assert_eq!(provider.base_url, "http://localhost:8000/v1");
    }

    #[test]
    fn message_conversion_preserves_order_and_roles() {
        let messages = vec![
            PromptMessage::System("rules".into()),
            PromptMessage::User("I have a rash".into()),
            PromptMessage::Assistant("Where is it?".into()),
            PromptMessage::User("On my arm".into()),
        ];
        let api = OpenAiCompatProvider::to_api_messages(&messages);
        let roles: Vec<&str> = api.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["system", "user", "assistant", "user"]);
        assert_eq!(api[3].content, "On my arm");
    }

    #[test]
    fn parse_content_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        match parse_stream_line(line) {
            StreamLine::Chunk(resp) => {
                assert_eq!(resp.choices[0].delta.content.as_deref(), Some("Hello"));
            }
            other => panic!("expected chunk, got {other:?}"),
        }
    }

    #[test]
    fn parse_done_sentinel_and_skips() {
        assert!(matches!(parse_stream_line("data: [DONE]"), StreamLine::Done));
        assert!(matches!(parse_stream_line("data:[DONE]"), StreamLine::Done));
        assert!(matches!(parse_stream_line(""), StreamLine::Skip));
        assert!(matches!(parse_stream_line(": keep-alive"), StreamLine::Skip));
        assert!(matches!(parse_stream_line("event: message"), StreamLine::Skip));
    }

    #[test]
    fn parse_usage_chunk() {
        let line = r#"data: {"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#;
        match parse_stream_line(line) {
            StreamLine::Chunk(resp) => {
                let usage = resp.usage.unwrap();
                assert_eq!(usage.prompt_tokens, 10);
                assert_eq!(usage.total_tokens, 15);
            }
            other => panic!("expected chunk, got {other:?}"),
        }
    }

    #[test]
    fn parse_inline_error() {
        let line = r#"data: {"error":{"message":"model crashed"}}"#;
        match parse_stream_line(line) {
            StreamLine::Failed(message) => assert_eq!(message, "model crashed"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn parse_garbage_is_unparseable() {
        assert!(matches!(
            parse_stream_line("data: {not json"),
            StreamLine::Unparseable { .. }
        ));
    }

    #[test]
    fn parse_embedding_response() {
        let data = r#"{
            "data": [
                {"embedding": [0.4, 0.5, 0.6], "index": 1},
                {"embedding": [0.1, 0.2, 0.3], "index": 0}
            ],
            "model": "mxbai-embed-large",
            "usage": {"prompt_tokens": 8, "total_tokens": 8}
        }"#;
        let parsed: EmbeddingApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.data.len(), 2);
        assert_eq!(parsed.data[1].index, 0);
        assert_eq!(parsed.model, "mxbai-embed-large");
        assert_eq!(parsed.usage.unwrap().prompt_tokens, 8);
    }

    #[test]
    fn next_line_waits_for_whole_utf8_sequences() {
        let line = "data: café\r\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut buffer = line[..split].to_vec();
        assert_eq!(next_line(&mut buffer), None);

        buffer.extend_from_slice(&line[split..]);
        assert_eq!(next_line(&mut buffer).as_deref(), Some("data: café"));
        assert!(buffer.is_empty());
    }

    // --- Local HTTP server driving `stream()` / `embed()` end to end ---

    /// Read one HTTP request (headers plus `Content-Length` body).
    async fn read_request(socket: &mut TcpStream) {
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);

            let Some(head_end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&request[..head_end]).to_ascii_lowercase();
            let body_len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if request.len() >= head_end + 4 + body_len {
                return;
            }
        }
    }

    /// Answer a single request with `chunks` as a chunked SSE body, flushing
    /// each chunk separately. Returns the base URL.
    async fn serve_chunked(chunks: Vec<Vec<u8>>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\n\
                      content-type: text/event-stream\r\n\
                      transfer-encoding: chunked\r\n\
                      connection: close\r\n\r\n",
                )
                .await
                .unwrap();
            for chunk in chunks {
                let mut frame = format!("{:x}\r\n", chunk.len()).into_bytes();
                frame.extend_from_slice(&chunk);
                frame.extend_from_slice(b"\r\n");
                if socket.write_all(&frame).await.is_err() {
                    return;
                }
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            let _ = socket.write_all(b"0\r\n\r\n").await;
        });

        format!("http://{addr}/v1")
    }

    fn delta(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": content}, "finish_reason": null}]})
        )
    }

    fn chat_request() -> ProviderRequest {
        ProviderRequest {
            model: "llama3".into(),
            messages: vec![PromptMessage::User("I have a rash".into())],
            temperature: 0.4,
            max_tokens: None,
            stream: true,
            stop: Vec::new(),
        }
    }

    async fn collect(mut rx: FragmentStream) -> Vec<std::result::Result<StreamChunk, ProviderError>> {
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        items
    }

    fn texts(items: &[std::result::Result<StreamChunk, ProviderError>]) -> String {
        items
            .iter()
            .filter_map(|i| i.as_ref().ok().and_then(|c| c.content.clone()))
            .collect()
    }

    #[tokio::test]
    async fn stream_reassembles_split_lines_and_characters() {
        let first = delta("Hello");
        let second = format!("{}{}data: [DONE]\n\n", delta(" café"), delta("!"));

        // Cut `first` mid-line and `second` between the two bytes of 'é'.
        let cut = second.as_bytes().iter().position(|&b| b == 0xC3).unwrap() + 1;
        let chunks = vec![
            first.as_bytes()[..10].to_vec(),
            first.as_bytes()[10..].to_vec(),
            second.as_bytes()[..cut].to_vec(),
            second.as_bytes()[cut..].to_vec(),
        ];

        let provider = OpenAiCompatProvider::new("local", serve_chunked(chunks).await, "");
        let items = collect(provider.stream(chat_request()).await.unwrap()).await;

        assert_eq!(texts(&items), "Hello café!");
        assert!(items.iter().all(|i| i.is_ok()));
        let last = items.last().unwrap().as_ref().unwrap();
        assert!(last.done);
        assert_eq!(items.iter().filter(|i| matches!(i, Ok(c) if c.done)).count(), 1);
    }

    #[tokio::test]
    async fn inline_error_object_ends_stream_with_err() {
        let chunks = vec![
            delta("Some").into_bytes(),
            b"data: {\"error\":{\"message\":\"model overloaded\"}}\n\n".to_vec(),
            delta(" never delivered").into_bytes(),
        ];

        let provider = OpenAiCompatProvider::new("local", serve_chunked(chunks).await, "");
        let items = collect(provider.stream(chat_request()).await.unwrap()).await;

        assert_eq!(items.len(), 2);
        assert_eq!(texts(&items), "Some");
        match &items[1] {
            Err(ProviderError::StreamInterrupted(message)) => {
                assert_eq!(message, "model overloaded")
            }
            other => panic!("expected stream interruption, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_without_done_sentinel_still_finishes() {
        let chunks = vec![delta("Rest").into_bytes(), delta(" and fluids.").into_bytes()];

        let provider = OpenAiCompatProvider::new("local", serve_chunked(chunks).await, "");
        let items = collect(provider.stream(chat_request()).await.unwrap()).await;

        assert_eq!(texts(&items), "Rest and fluids.");
        assert!(items.last().unwrap().as_ref().unwrap().done);
    }

    #[tokio::test]
    async fn stalled_embedding_call_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            // Never answer.
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let provider = OpenAiCompatProvider::new("local", format!("http://{addr}/v1"), "")
            .with_request_timeout(Duration::from_millis(200));
        let err = provider
            .embed(EmbeddingRequest {
                model: "mxbai-embed-large".into(),
                inputs: vec!["rash".into()],
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Timeout(_)), "{err:?}");
    }
}
