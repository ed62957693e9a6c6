//! Provider Adapter Traits
//!
//! Trait and normalized types shared by every provider adapter. The router
//! only ever sees these shapes; each adapter translates them to and from its
//! provider's wire format.
//!
//! # Design Philosophy
//!
//! The `ProviderAdapter` trait provides a common interface for:
//! - Single-shot completions returning a [`ChatResponse`]
//! - Streaming completions delivered as [`StreamEvent`]s over a channel
//! - Listing the models the adapter can address
//!
//! Implementations handle provider-specific details (endpoints, auth headers,
//! usage field names, stream framing).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::pool::CredentialLease;
use crate::providers::{Capability, ProviderId};

/// Longest error body kept in an [`AdapterError`]
const MAX_ERROR_BODY: usize = 512;

// ============================================================================
// Requests
// ============================================================================

/// Author of a chat message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions for the model
    System,
    /// The caller's turn
    User,
    /// A previous model turn
    Assistant,
}

/// One role-tagged message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message author
    pub role: Role,
    /// Text content
    pub content: String,
}

impl ChatMessage {
    /// System message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// User message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Provider-agnostic chat request
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Conversation, oldest first
    pub messages: Vec<ChatMessage>,
    /// Resolved model identifier; adapters use their default when absent
    pub model: Option<String>,
    /// Maximum output tokens
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Whether the caller intends to stream
    ///
    /// Marker only: [`RequestRouter::complete_stream`](crate::RequestRouter::complete_stream)
    /// sets it and is the sole way to stream. `complete` and the adapters
    /// never branch on it.
    pub stream: bool,
    /// Capability the serving provider must have
    pub capability: Capability,
}

impl ChatRequest {
    /// Create a request from a message list
    #[must_use]
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    /// Create a request holding a single user message
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self::new(vec![ChatMessage::user(prompt)])
    }

    /// Prepend a system message
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.messages.insert(0, ChatMessage::system(system));
        self
    }

    /// Set the model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set max output tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature.clamp(0.0, 2.0));
        self
    }

    /// Set streaming mode
    #[must_use]
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Set the required capability
    #[must_use]
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capability = capability;
        self
    }

    /// Check the request is routable
    pub fn validate(&self) -> Result<(), RequestError> {
        let last = self.messages.last().ok_or(RequestError::EmptyMessages)?;
        if last.role != Role::User {
            return Err(RequestError::LastMessageNotUser(last.role));
        }
        Ok(())
    }
}

/// A request that cannot be routed
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RequestError {
    /// No messages at all
    #[error("request has no messages")]
    EmptyMessages,
    /// Conversation does not end on the caller's turn
    #[error("last message must be from the user, found {0:?}")]
    LastMessageNotUser(Role),
}

// ============================================================================
// Responses
// ============================================================================

/// Token accounting; unknown fields are zero, never absent
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub prompt_tokens: u32,
    /// Completion tokens
    pub completion_tokens: u32,
    /// Total tokens
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Build from optional provider fields; a missing total is the sum of the parts
    #[must_use]
    pub fn from_parts(prompt: Option<u32>, completion: Option<u32>, total: Option<u32>) -> Self {
        let prompt_tokens = prompt.unwrap_or(0);
        let completion_tokens = completion.unwrap_or(0);
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: total.unwrap_or(prompt_tokens.saturating_add(completion_tokens)),
        }
    }
}

/// Provider-agnostic completion result
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Whether a provider produced a completion
    pub success: bool,
    /// Completion text; may legitimately be empty on success
    pub content: String,
    /// Provider that served the request (always set on success)
    pub provider: Option<ProviderId>,
    /// Model that served the request (always set on success)
    pub model: Option<String>,
    /// Token accounting
    pub usage: TokenUsage,
    /// Failure summary
    pub error: Option<String>,
    /// Wall time spent routing and calling, in milliseconds
    pub elapsed_ms: u64,
}

impl ChatResponse {
    /// Successful completion
    pub fn completed(
        provider: ProviderId,
        model: impl Into<String>,
        content: impl Into<String>,
        usage: TokenUsage,
    ) -> Self {
        Self {
            success: true,
            content: content.into(),
            provider: Some(provider),
            model: Some(model.into()),
            usage,
            error: None,
            elapsed_ms: 0,
        }
    }

    /// Failed completion
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: String::new(),
            provider: None,
            model: None,
            usage: TokenUsage::default(),
            error: Some(error.into()),
            elapsed_ms: 0,
        }
    }
}

// ============================================================================
// Streaming
// ============================================================================

/// Event produced by an adapter's stream
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// Incremental text
    Delta(String),
    /// Stream finished successfully
    Done {
        /// Final usage, zero if the provider reported none
        usage: TokenUsage,
        /// Model reported by the provider, if any
        model: Option<String>,
    },
    /// Stream failed
    Error(AdapterError),
}

impl StreamEvent {
    /// Whether no further events follow this one
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Delta(_))
    }
}

/// Unit delivered to callers of a streaming completion
///
/// Exactly one chunk per stream has `terminal == true` and it is the last.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Text delta, possibly empty
    pub delta: String,
    /// Whether this is the final chunk
    pub terminal: bool,
    /// Serving provider, set on the first and last chunk
    pub provider: Option<ProviderId>,
    /// Serving model, set on the first and last chunk
    pub model: Option<String>,
    /// Usage, set on a successful terminal chunk
    pub usage: Option<TokenUsage>,
    /// Failure, set on an unsuccessful terminal chunk
    pub error: Option<String>,
}

// ============================================================================
// Errors
// ============================================================================

/// Failure of a single adapter call
///
/// The rendered message keeps the status code and provider error text so that
/// rate-limit signals remain recognizable.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// Non-2xx status
    #[error("HTTP {status}: {body}")]
    Http {
        /// Status code
        status: u16,
        /// Truncated response body
        body: String,
    },
    /// Connection or protocol failure
    #[error("transport error: {0}")]
    Transport(String),
    /// Request or stream idle timeout
    #[error("request timed out")]
    Timeout,
    /// Response did not match the provider schema
    #[error("malformed response: {0}")]
    Malformed(String),
    /// Stream ended without a completion marker
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),
}

impl AdapterError {
    /// Build an HTTP error, truncating long bodies
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        let mut body = body.into();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Self::Http { status, body }
    }

    /// HTTP status, when the failure came from one
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        if err.is_decode() {
            return Self::Malformed(err.without_url().to_string());
        }
        // URLs can carry keys and path segments that confuse classification
        Self::Transport(err.without_url().to_string())
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

// ============================================================================
// Adapter Configuration
// ============================================================================

/// Connection settings for one adapter
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Provider served
    pub provider: ProviderId,
    /// API base URL without trailing slash
    pub base_url: String,
    /// Model used when a request names none
    pub default_model: String,
    /// Every model the adapter advertises
    pub models: Vec<String>,
    /// Ceiling for a single-shot call
    pub timeout: Duration,
    /// Ceiling for establishing a connection
    pub connect_timeout: Duration,
    /// Longest gap between stream reads
    pub stream_idle_timeout: Duration,
}

impl AdapterConfig {
    /// Defaults for a provider
    #[must_use]
    pub fn for_provider(provider: ProviderId) -> Self {
        let default_model = crate::models::default_model(provider, crate::models::ChatMode::General);
        Self {
            provider,
            base_url: provider.default_base_url().to_string(),
            default_model: default_model.to_string(),
            models: crate::models::catalogue(provider)
                .iter()
                .map(|m| (*m).to_string())
                .collect(),
            timeout: provider.default_timeout(),
            connect_timeout: Duration::from_secs(10),
            stream_idle_timeout: Duration::from_secs(60),
        }
    }

    /// Override the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the default model
    #[must_use]
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !self.models.contains(&model) {
            self.models.insert(0, model.clone());
        }
        self.default_model = model;
        self
    }

    /// Override the single-shot timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the stream idle timeout
    #[must_use]
    pub fn with_stream_idle_timeout(mut self, timeout: Duration) -> Self {
        self.stream_idle_timeout = timeout;
        self
    }

    pub(crate) fn http_client(&self) -> Result<reqwest::Client, AdapterError> {
        Ok(reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .build()?)
    }
}

// ============================================================================
// Adapter Trait
// ============================================================================

/// Information about a model an adapter can address
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    /// Model identifier sent on the wire
    pub id: String,
    /// Provider serving the model
    pub provider: ProviderId,
    /// Whether this is the adapter's default model
    pub is_default: bool,
    /// Whether the provider currently has capacity
    pub available: bool,
}

/// Provider adapter
///
/// Implement this trait to add support for a provider's wire format.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider this adapter talks to
    fn provider(&self) -> ProviderId;

    /// Model used when a request does not name one
    fn default_model(&self) -> &str;

    /// Models this adapter can address
    fn models(&self) -> Vec<String> {
        vec![self.default_model().to_string()]
    }

    /// Model a request will be sent to
    fn resolve_model(&self, request: &ChatRequest) -> String {
        request
            .model
            .clone()
            .unwrap_or_else(|| self.default_model().to_string())
    }

    /// Send a request and wait for the complete response
    async fn call(
        &self,
        credential: &CredentialLease,
        request: &ChatRequest,
    ) -> Result<ChatResponse, AdapterError>;

    /// Open a streaming completion
    ///
    /// Returns once the provider accepted the request. The receiver yields
    /// deltas followed by exactly one terminal event; dropping it aborts the
    /// upstream connection.
    async fn open_stream(
        &self,
        credential: &CredentialLease,
        request: &ChatRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, AdapterError>;
}
