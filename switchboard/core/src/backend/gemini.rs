//! Gemini Adapter
//!
//! Google's Generative Language API:
//!
//! - `POST {base}/models/{model}:generateContent` for single-shot calls
//! - `POST {base}/models/{model}:streamGenerateContent?alt=sse` for streams;
//!   every frame is a full response object carrying a text fragment and the
//!   body simply ends after the frame with a `finishReason`
//! - the key travels in the `x-goog-api-key` header, never in the URL
//! - roles are `user` / `model`; system messages become `systemInstruction`
//! - usage lives in `usageMetadata.{promptTokenCount,candidatesTokenCount,totalTokenCount}`

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
#[serde(rename_all = "camelCase")]
struct WireRequest<'a> {
    contents: Vec<WireContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireSystem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct WireContent<'a> {
    role: &'static str,
    parts: Vec<WirePartRef<'a>>,
}

#[derive(Debug, Serialize)]
struct WirePartRef<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct WireSystem {
    parts: Vec<WireSystemPart>,
}

#[derive(Debug, Serialize)]
struct WireSystemPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    usage_metadata: Option<WireUsage>,
    model_version: Option<String>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCandidate {
    content: Option<WireCandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireCandidateContent {
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Deserialize)]
struct WirePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUsage {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
    total_token_count: Option<u32>,
}

impl From<WireUsage> for TokenUsage {
    fn from(usage: WireUsage) -> Self {
        TokenUsage::from_parts(
            usage.prompt_token_count,
            usage.candidates_token_count,
            usage.total_token_count,
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

// ============================================================================
// Pure Mapping
// ============================================================================

fn build_request(request: &ChatRequest) -> WireRequest<'_> {
    let system: Vec<&str> = request
        .messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    let contents = request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| WireContent {
            role: if m.role == Role::Assistant { "model" } else { "user" },
            parts: vec![WirePartRef { text: &m.content }],
        })
        .collect();

    let generation_config = (request.max_tokens.is_some() || request.temperature.is_some())
        .then_some(GenerationConfig {
            max_output_tokens: request.max_tokens,
            temperature: request.temperature,
        });

    WireRequest {
        contents,
        system_instruction: (!system.is_empty()).then(|| WireSystem {
            parts: vec![WireSystemPart {
                text: system.join("\n\n"),
            }],
        }),
        generation_config,
    }
}

impl WireResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    fn is_finished(&self) -> bool {
        self.candidates.iter().any(|c| c.finish_reason.is_some())
    }

    fn blocked(&self) -> Option<AdapterError> {
        if !self.candidates.is_empty() {
            return None;
        }
        let reason = self
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.clone())
            .unwrap_or_else(|| "no candidates".to_string());
        Some(AdapterError::Malformed(format!("prompt blocked: {reason}")))
    }
}

/// Map a `generateContent` body into the normalized response
fn into_chat_response(
    requested_model: &str,
    body: &str,
) -> Result<ChatResponse, AdapterError> {
    let wire: WireResponse = serde_json::from_str(body)?;
    if let Some(err) = wire.blocked() {
        return Err(err);
    }

    let content = wire.text();
    let model = wire
        .model_version
        .unwrap_or_else(|| requested_model.to_string());
    let usage = wire.usage_metadata.map(TokenUsage::from).unwrap_or_default();

    Ok(ChatResponse::completed(ProviderId::Gemini, model, content, usage))
}

/// Stream state for `streamGenerateContent` frames
#[derive(Debug, Default)]
struct CandidateDecoder {
    model: Option<String>,
    usage: TokenUsage,
    finished: bool,
}

impl FrameDecoder for CandidateDecoder {
    fn decode(&mut self, frame: SseFrame) -> Vec<StreamEvent> {
        let data = match frame {
            SseFrame::Done => return vec![self.finish()],
            SseFrame::Data(data) => data,
        };

        let wire: WireResponse = match serde_json::from_str(&data) {
            Ok(wire) => wire,
            Err(e) => return vec![StreamEvent::Error(e.into())],
        };
        if let Some(err) = wire.blocked() {
            return vec![StreamEvent::Error(err)];
        }

        let text = wire.text();
        if wire.is_finished() {
            self.finished = true;
        }
        if let Some(version) = wire.model_version {
            self.model = Some(version);
        }
        if let Some(usage) = wire.usage_metadata {
            self.usage = usage.into();
        }

        if text.is_empty() {
            Vec::new()
        } else {
            vec![StreamEvent::Delta(text)]
        }
    }

    fn finish(&mut self) -> StreamEvent {
        if self.finished {
            StreamEvent::Done {
                usage: self.usage,
                model: self.model.take(),
            }
        } else {
            StreamEvent::Error(AdapterError::StreamInterrupted(
                "body ended without a finishReason".to_string(),
            ))
        }
    }
}

// ============================================================================
// Adapter
// ============================================================================

/// Adapter for Google Gemini
#[derive(Clone, Debug)]
pub struct GeminiAdapter {
    config: AdapterConfig,
    http_client: reqwest::Client,
}

impl GeminiAdapter {
    /// Create an adapter from its connection settings
    pub fn new(config: AdapterConfig) -> Result<Self, AdapterError> {
        let http_client = config.http_client()?;
        Ok(Self {
            config,
            http_client,
        })
    }

    /// Create an adapter with Gemini's defaults
    pub fn with_defaults() -> Result<Self, AdapterError> {
        Self::new(AdapterConfig::for_provider(ProviderId::Gemini))
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/models/{model}:{method}", self.config.base_url)
    }

    async fn post(
        &self,
        credential: &CredentialLease,
        url: String,
        body: &WireRequest<'_>,
        timeout: Option<std::time::Duration>,
    ) -> Result<reqwest::Response, AdapterError> {
        let mut builder = self
            .http_client
            .post(url)
            .header("x-goog-api-key", credential.secret())
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
impl ProviderAdapter for GeminiAdapter {
    fn provider(&self) -> ProviderId {
        ProviderId::Gemini
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
        let body = build_request(request);
        let url = self.model_url(&model, "generateContent");

        let response = self
            .post(credential, url, &body, Some(self.config.timeout))
            .await?;
        let text = response.text().await?;
        into_chat_response(&model, &text)
    }

    async fn open_stream(
        &self,
        credential: &CredentialLease,
        request: &ChatRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, AdapterError> {
        let model = self.resolve_model(request);
        let body = build_request(request);
        let url = format!("{}?alt=sse", self.model_url(&model, "streamGenerateContent"));

        let response = tokio::time::timeout(self.config.timeout, self.post(credential, url, &body, None))
            .await
            .map_err(|_| AdapterError::Timeout)??;

        let decoder = CandidateDecoder {
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
