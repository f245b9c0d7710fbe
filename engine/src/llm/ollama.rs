//! Ollama Chat Transport
//!
//! This module implements the ChatBackend trait against an Ollama-compatible
//! HTTP chat endpoint, typically running at http://localhost:11434.
//!
//! Key features:
//! - Buffered mode: single JSON reply per request
//! - Streaming mode: newline-delimited JSON, one fragment object per line
//! - Partial lines are buffered across network chunks and flushed at
//!   end-of-stream, so fragment boundaries never depend on chunk boundaries
//! - Every request is bound to a configurable deadline

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;

use super::{ChatBackend, ChatError, FragmentHandler, Message, Result};
use crate::config::BackendConfig;

/// HTTP client for an Ollama-compatible chat backend
#[derive(Debug, Clone)]
pub struct OllamaChatClient {
    /// Base URL for the chat API (typically http://localhost:11434)
    base_url: String,

    /// Deadline applied to every request, buffered or streaming
    timeout: Duration,

    /// Log raw request and response payloads at debug level
    debug_payloads: bool,

    /// HTTP client for API requests
    client: Client,
}

impl OllamaChatClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - Base URL for the chat API (e.g., "http://localhost:11434")
    /// * `timeout` - Deadline applied to every request
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
            debug_payloads: false,
            client: Client::new(),
        }
    }

    /// Create a client from the backend configuration section
    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            debug_payloads: config.debug_payloads,
            client: Client::new(),
        }
    }

    /// Enable logging of raw request and response payloads at debug level
    pub fn with_debug_payloads(mut self, enabled: bool) -> Self {
        self.debug_payloads = enabled;
        self
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    /// Convert our Message format to the wire format
    fn convert_messages(messages: &[Message]) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|msg| WireMessage {
                role: msg.role.to_string(),
                content: msg.content.clone(),
            })
            .collect()
    }

    fn map_request_error(&self, e: reqwest::Error) -> ChatError {
        if e.is_timeout() {
            ChatError::Timeout(self.timeout.as_secs())
        } else if e.is_connect() {
            ChatError::Connection(self.base_url.clone())
        } else {
            ChatError::Network(e.to_string())
        }
    }

    /// POST a chat request and return the raw response after status checks
    async fn post_chat(&self, request: &ChatRequest) -> Result<reqwest::Response> {
        if self.debug_payloads {
            match serde_json::to_string(request) {
                Ok(body) => tracing::debug!(%body, "chat request payload"),
                Err(e) => tracing::debug!("chat request not serializable: {}", e),
            }
        }

        let response = self
            .client
            .post(self.chat_url())
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn send_inner(&self, model: &str, messages: &[Message]) -> Result<String> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: Self::convert_messages(messages),
            stream: false,
        };

        tracing::debug!(
            "chat request: model={}, messages={}, total_chars={}",
            model,
            request.messages.len(),
            request.messages.iter().map(|m| m.content.len()).sum::<usize>()
        );

        let start = std::time::Instant::now();
        let response = self.post_chat(&request).await?;

        let body = response
            .text()
            .await
            .map_err(|e| ChatError::Network(e.to_string()))?;

        if self.debug_payloads {
            tracing::debug!(%body, "chat reply payload");
        }

        let reply: ChatReply = serde_json::from_str(&body)
            .map_err(|e| ChatError::Parse(format!("invalid chat reply: {}", e)))?;

        if let Some(error) = reply.error {
            return Err(ChatError::MissingContent(error));
        }

        let content = match reply.message {
            Some(message) => message.content,
            None => {
                return Err(ChatError::MissingContent(
                    "reply carried no message object".to_string(),
                ))
            }
        };

        tracing::info!(
            "chat reply received in {:.1}s ({} chars)",
            start.elapsed().as_secs_f64(),
            content.len()
        );

        Ok(content)
    }

    async fn stream_inner(
        &self,
        model: &str,
        messages: &[Message],
        on_fragment: FragmentHandler<'_>,
    ) -> Result<String> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: Self::convert_messages(messages),
            stream: true,
        };

        tracing::debug!(
            "chat stream request: model={}, messages={}",
            model,
            request.messages.len()
        );

        let start = std::time::Instant::now();
        let response = self.post_chat(&request).await?;

        let mut body = response.bytes_stream();
        let mut assembler = FragmentAssembler::new();
        let mut fragments = 0usize;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| self.map_request_error(e))?;
            if self.debug_payloads {
                tracing::debug!(chunk = %String::from_utf8_lossy(&chunk), "stream chunk");
            }
            for fragment in assembler.push(&chunk)? {
                fragments += 1;
                on_fragment(&fragment);
            }
            if assembler.is_done() {
                break;
            }
        }

        if !assembler.is_done() {
            // The backend closed without a trailing newline; flush the tail.
            for fragment in assembler.finish()? {
                fragments += 1;
                on_fragment(&fragment);
            }
        }

        if !assembler.is_done() {
            return Err(ChatError::IncompleteStream);
        }

        tracing::info!(
            "chat stream complete in {:.1}s ({} fragments)",
            start.elapsed().as_secs_f64(),
            fragments
        );

        Ok(assembler.into_text())
    }
}

#[async_trait]
impl ChatBackend for OllamaChatClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn send(&self, model: &str, messages: &[Message]) -> Result<String> {
        match timeout(self.timeout, self.send_inner(model, messages)).await {
            Ok(result) => result,
            Err(_) => Err(ChatError::Timeout(self.timeout.as_secs())),
        }
    }

    async fn stream(
        &self,
        model: &str,
        messages: &[Message],
        on_fragment: FragmentHandler<'_>,
    ) -> Result<String> {
        match timeout(self.timeout, self.stream_inner(model, messages, on_fragment)).await {
            Ok(result) => result,
            Err(_) => Err(ChatError::Timeout(self.timeout.as_secs())),
        }
    }

    async fn check_health(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match timeout(self.timeout, self.client.get(&url).send()).await {
            Ok(Ok(response)) => response.status().is_success(),
            _ => false,
        }
    }
}

/// Chat API request format
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
}

/// Wire format for a single chat message
#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

/// Buffered chat API reply format
#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    message: Option<WireMessage>,

    #[serde(default)]
    error: Option<String>,
}

/// One line of a streaming chat reply
#[derive(Debug, Deserialize)]
struct StreamLine {
    #[serde(default)]
    message: Option<StreamDelta>,

    #[serde(default)]
    done: bool,

    #[serde(default)]
    error: Option<String>,
}

/// Incremental message content within a stream line
#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: String,
}

/// Incremental parser for the newline-delimited JSON stream format.
///
/// Network chunks split the stream at arbitrary byte offsets, including in
/// the middle of a line or a multi-byte character. The assembler buffers the
/// partial tail line across [`push`](Self::push) calls and [`finish`](Self::finish)
/// flushes a final line that arrived without its trailing newline.
#[derive(Debug, Default)]
pub struct FragmentAssembler {
    /// Bytes of the current, not yet newline-terminated line
    buf: Vec<u8>,

    /// Accumulated full text across all fragments
    text: String,

    /// Set once a line with `done: true` has been parsed
    done: bool,
}

impl FragmentAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of bytes; returns the fragments completed by it, in
    /// arrival order. Stops consuming once the completion line is seen.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        let mut fragments = Vec::new();
        self.buf.extend_from_slice(chunk);

        while !self.done {
            let Some(pos) = self.buf.iter().position(|&b| b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(fragment) = self.parse_line(&line[..line.len() - 1])? {
                fragments.push(fragment);
            }
        }

        Ok(fragments)
    }

    /// Flush the trailing partial line after the byte stream ends
    pub fn finish(&mut self) -> Result<Vec<String>> {
        if self.buf.is_empty() {
            return Ok(Vec::new());
        }
        let line = std::mem::take(&mut self.buf);
        match self.parse_line(&line)? {
            Some(fragment) => Ok(vec![fragment]),
            None => Ok(Vec::new()),
        }
    }

    /// True once the backend has signalled completion
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// The accumulated full text, equal to the concatenation of every
    /// fragment returned by `push` and `finish`
    pub fn into_text(self) -> String {
        self.text
    }

    fn parse_line(&mut self, line: &[u8]) -> Result<Option<String>> {
        if line.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(None);
        }

        let parsed: StreamLine = serde_json::from_slice(line).map_err(|e| {
            ChatError::Parse(format!(
                "invalid stream line {:?}: {}",
                String::from_utf8_lossy(line),
                e
            ))
        })?;

        if let Some(error) = parsed.error {
            return Err(ChatError::MissingContent(error));
        }

        if parsed.done {
            self.done = true;
        }

        let fragment = match parsed.message {
            Some(delta) => delta.content,
            None => String::new(),
        };

        if fragment.is_empty() {
            return Ok(None);
        }

        self.text.push_str(&fragment);
        Ok(Some(fragment))
    }
}
