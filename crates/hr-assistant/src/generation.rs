//! OpenAI-compatible chat completions client.
//!
//! Works against any server exposing `POST {url}/chat/completions`
//! (OpenAI, Azure-style gateways, Ollama's `/v1`, vLLM, ...). Each prompt is
//! sent as a single user message. Streaming sets `"stream": true` and yields
//! content deltas parsed from the SSE body.

use std::collections::VecDeque;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use tracing::{debug, warn};

use hr_retrieval_core::generation::{Generator, TextStream};

use crate::config::GenerationConfig;
use crate::http::{http_client, post_json_with_backoff, send_with_backoff};

pub struct ChatClient {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: Option<u32>,
    max_retries: u32,
    client: reqwest::Client,
}

impl ChatClient {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!(
                env = %config.api_key_env,
                "no API key for generation; requests are sent unauthenticated"
            );
        }
        Ok(Self {
            endpoint: format!("{}/chat/completions", config.url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            client: http_client(config.timeout_secs)?,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, prompt: &str, stream: bool) -> Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
            "stream": stream,
        });
        if let Some(max) = self.max_tokens {
            body["max_tokens"] = Value::from(max);
        }
        body
    }
}

#[async_trait]
impl Generator for ChatClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let json = post_json_with_backoff(
            &self.client,
            &self.endpoint,
            self.api_key.as_deref(),
            &self.request_body(prompt, false),
            self.max_retries,
            "Chat completion",
        )
        .await?;
        let text = parse_completion(&json)?;
        debug!(chars = text.len(), model = %self.model, "chat completion received");
        Ok(text)
    }

    /// Content deltas from the SSE body. Retries apply only to establishing
    /// the response; a transport error mid-stream ends it with an `Err`.
    /// Dropping the stream closes the connection.
    async fn stream(&self, prompt: &str) -> Result<TextStream> {
        let response = send_with_backoff(
            &self.client,
            &self.endpoint,
            self.api_key.as_deref(),
            &self.request_body(prompt, true),
            self.max_retries,
            "Chat completion",
        )
        .await?;

        let state = StreamState {
            bytes: response
                .bytes_stream()
                .map(|chunk| chunk.map(|b| b.to_vec()))
                .boxed(),
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
            finished: false,
        };

        let deltas = stream::unfold(state, |mut state| async move {
            loop {
                if let Some(delta) = state.pending.pop_front() {
                    return Some((Ok(delta), state));
                }
                if state.finished {
                    return None;
                }
                match state.bytes.next().await {
                    Some(Ok(chunk)) => {
                        let events = state.decoder.push(&chunk);
                        if let Err(e) = state.absorb(events) {
                            state.finished = true;
                            return Some((Err(e), state));
                        }
                    }
                    Some(Err(e)) => {
                        state.finished = true;
                        state.pending.clear();
                        return Some((Err(anyhow!("Chat stream interrupted: {}", e)), state));
                    }
                    None => {
                        let events = state.decoder.finish();
                        state.finished = true;
                        if let Err(e) = state.absorb(events) {
                            return Some((Err(e), state));
                        }
                    }
                }
            }
        });

        Ok(deltas.boxed())
    }
}

struct StreamState {
    bytes: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

impl StreamState {
    fn absorb(&mut self, events: Vec<SseEvent>) -> Result<()> {
        for event in events {
            match event {
                SseEvent::Done => {
                    self.finished = true;
                    break;
                }
                SseEvent::Data(data) => {
                    if let Some(delta) = parse_stream_delta(&data)? {
                        self.pending.push_back(delta);
                    }
                }
            }
        }
        Ok(())
    }
}

/// `choices[0].message.content` of a non-streamed completion.
pub fn parse_completion(json: &Value) -> Result<String> {
    if let Some(message) = json.pointer("/error/message").and_then(Value::as_str) {
        return Err(anyhow!("Chat completion error: {}", message));
    }
    json.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid chat completion response: missing choices[0].message.content"))
}

/// `choices[0].delta.content` of one streamed chunk; `None` for role-only
/// or empty deltas.
pub fn parse_stream_delta(data: &str) -> Result<Option<String>> {
    let json: Value = serde_json::from_str(data)
        .map_err(|e| anyhow!("Invalid chat stream chunk: {}", e))?;
    if let Some(message) = json.pointer("/error/message").and_then(Value::as_str) {
        return Err(anyhow!("Chat completion error: {}", message));
    }
    Ok(json
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Line-oriented decoder for `text/event-stream` bodies.
///
/// Only `data:` fields matter here; comments, `event:` and `id:` lines are
/// skipped. Multi-line data fields are joined with `\n`, and an event is
/// emitted on each blank line.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.line(line.trim_end_matches(['\n', '\r']), &mut events);
        }
        events
    }

    /// Flush a trailing event that was not terminated by a blank line.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest);
            self.line(line.trim_end_matches('\r'), &mut events);
        }
        self.dispatch(&mut events);
        events
    }

    fn line(&mut self, line: &str, events: &mut Vec<SseEvent>) {
        if line.is_empty() {
            self.dispatch(events);
        } else if let Some(value) = line.strip_prefix("data:") {
            self.data.push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
    }

    fn dispatch(&mut self, events: &mut Vec<SseEvent>) {
        if self.data.is_empty() {
            return;
        }
        let data = self.data.join("\n");
        self.data.clear();
        if data.trim() == "[DONE]" {
            events.push(SseEvent::Done);
        } else {
            events.push(SseEvent::Data(data));
        }
    }
}
