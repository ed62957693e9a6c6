//! OpenAI-Compatible Adapter
//!
//! Groq, OpenRouter, DeepSeek and the Hugging Face router all speak the
//! OpenAI chat-completions dialect:
//!
//! - `POST {base}/chat/completions` with a bearer token
//! - usage under `usage.{prompt,completion,total}_tokens`; Groq streams put
//!   it under `x_groq.usage` instead
//! - streams are SSE `data: {chunk}` frames closed by `data: [DONE]`
//!
//! OpenRouter may also answer 200 with an `error` object in the body; that is
//! surfaced as an HTTP error carrying the embedded code.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::sse::{spawn_event_pump, FrameDecoder, SseFrame};
use super::traits::{
    AdapterConfig, AdapterError, ChatRequest, ChatResponse, ProviderAdapter, Role, StreamEvent,
    TokenUsage,
};
use crate::pool::CredentialLease;
use crate::providers::ProviderId;

// ============================================================================
// Wire Schema
// ============================================================================

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

impl From<WireUsage> for TokenUsage {
    fn from(usage: WireUsage) -> Self {
        TokenUsage::from_parts(usage.prompt_tokens, usage.completion_tokens, usage.total_tokens)
    }
}

#[derive(Debug, Deserialize)]
struct GroqExtension {
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    message: String,
    code: Option<serde_json::Value>,
}

impl From<WireError> for AdapterError {
    fn from(err: WireError) -> Self {
        let status = err
            .code
            .as_ref()
            .and_then(|code| match code {
                serde_json::Value::Number(n) => n.as_u64(),
                serde_json::Value::String(s) => s.parse().ok(),
                _ => None,
            })
            .and_then(|n| u16::try_from(n).ok())
            .unwrap_or(502);
        AdapterError::http(status, err.message)
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: Option<WireChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct WireChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireChunk {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<WireChunkChoice>,
    usage: Option<WireUsage>,
    x_groq: Option<GroqExtension>,
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct WireChunkChoice {
    delta: Option<WireDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireDelta {
    content: Option<String>,
}

// ============================================================================
// Pure Mapping
// ============================================================================

fn build_request<'a>(
    request: &'a ChatRequest,
    model: &'a str,
    stream: bool,
    include_stream_usage: bool,
) -> WireRequest<'a> {
    WireRequest {
        model,
        messages: request
            .messages
            .iter()
            .map(|m| WireMessage {
                role: m.role,
                content: &m.content,
            })
            .collect(),
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        stream,
        stream_options: (stream && include_stream_usage).then_some(StreamOptions {
            include_usage: true,
        }),
    }
}

/// Map a completion body into the normalized response
fn into_chat_response(
    provider: ProviderId,
    requested_model: &str,
    body: &str,
) -> Result<ChatResponse, AdapterError> {
    let wire: WireResponse = serde_json::from_str(body)?;
    if let Some(error) = wire.error {
        return Err(error.into());
    }

    let choice = wire
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AdapterError::Malformed("response has no choices".to_string()))?;
    let content = choice.message.and_then(|m| m.content).unwrap_or_default();
    let model = wire.model.unwrap_or_else(|| requested_model.to_string());
    let usage = wire.usage.map(TokenUsage::from).unwrap_or_default();

    Ok(ChatResponse::completed(provider, model, content, usage))
}

/// Stream state for OpenAI-style chunks
#[derive(Debug, Default)]
struct ChunkDecoder {
    model: Option<String>,
    usage: TokenUsage,
    finished: bool,
}

impl FrameDecoder for ChunkDecoder {
    fn decode(&mut self, frame: SseFrame) -> Vec<StreamEvent> {
        let data = match frame {
            SseFrame::Done => {
                return vec![StreamEvent::Done {
                    usage: self.usage,
                    model: self.model.take(),
                }]
            }
            SseFrame::Data(data) => data,
        };

        let chunk: WireChunk = match serde_json::from_str(&data) {
            Ok(chunk) => chunk,
            Err(e) => return vec![StreamEvent::Error(e.into())],
        };
        if let Some(error) = chunk.error {
            return vec![StreamEvent::Error(error.into())];
        }

        if chunk.model.is_some() {
            self.model = chunk.model;
        }
        if let Some(usage) = chunk.usage.or(chunk.x_groq.and_then(|x| x.usage)) {
            self.usage = usage.into();
        }

        let mut events = Vec::new();
        for choice in chunk.choices {
            if let Some(text) = choice.delta.and_then(|d| d.content) {
                if !text.is_empty() {
                    events.push(StreamEvent::Delta(text));
                }
            }
            if choice.finish_reason.is_some() {
                self.finished = true;
            }
        }
        events
    }

    fn finish(&mut self) -> StreamEvent {
        if self.finished {
            StreamEvent::Done {
                usage: self.usage,
                model: self.model.take(),
            }
        } else {
            StreamEvent::Error(AdapterError::StreamInterrupted(
                "body ended without a finish marker".to_string(),
            ))
        }
    }
}

// ============================================================================
// Adapter
// ============================================================================

/// Adapter for OpenAI-compatible providers
#[derive(Clone, Debug)]
pub struct OpenAiCompatAdapter {
    config: AdapterConfig,
    include_stream_usage: bool,
    http_client: reqwest::Client,
}

impl OpenAiCompatAdapter {
    /// Create an adapter from its connection settings
    pub fn new(config: AdapterConfig) -> Result<Self, AdapterError> {
        let http_client = config.http_client()?;
        // Groq reports stream usage in x_groq and rejects unknown options
        let include_stream_usage = matches!(
            config.provider,
            ProviderId::DeepSeek | ProviderId::OpenRouter
        );
        Ok(Self {
            config,
            include_stream_usage,
            http_client,
        })
    }

    /// Create an adapter with the provider's defaults
    pub fn for_provider(provider: ProviderId) -> Result<Self, AdapterError> {
        Self::new(AdapterConfig::for_provider(provider))
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    async fn post(
        &self,
        credential: &CredentialLease,
        body: &WireRequest<'_>,
        timeout: Option<std::time::Duration>,
    ) -> Result<reqwest::Response, AdapterError> {
        let mut builder = self
            .http_client
            .post(self.completions_url())
            .bearer_auth(credential.secret())
            .json(body);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::http(status.as_u16(), body));
        }
        Ok(response)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatAdapter {
    fn provider(&self) -> ProviderId {
        self.config.provider
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    fn models(&self) -> Vec<String> {
        self.config.models.clone()
    }

    async fn call(
        &self,
        credential: &CredentialLease,
        request: &ChatRequest,
    ) -> Result<ChatResponse, AdapterError> {
        let model = self.resolve_model(request);
        let body = build_request(request, &model, false, false);

        let response = self.post(credential, &body, Some(self.config.timeout)).await?;
        let text = response.text().await?;
        into_chat_response(self.config.provider, &model, &text)
    }

    async fn open_stream(
        &self,
        credential: &CredentialLease,
        request: &ChatRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, AdapterError> {
        let model = self.resolve_model(request);
        let body = build_request(request, &model, true, self.include_stream_usage);

        let response = tokio::time::timeout(self.config.timeout, self.post(credential, &body, None))
            .await
            .map_err(|_| AdapterError::Timeout)??;

        let decoder = ChunkDecoder {
            model: Some(model),
            ..Default::default()
        };
        Ok(spawn_event_pump(
            response,
            decoder,
            self.config.stream_idle_timeout,
        ))
    }
}

// ============================================================================
// Tests
// ============================================================================
