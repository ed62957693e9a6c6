//! Provider Adapters
//!
//! This module isolates provider-specific request/response shaping behind the
//! [`ProviderAdapter`] trait so the router stays provider-agnostic.
//!
//! # Available Adapters
//!
//! - **OpenAI-compatible**: Groq, OpenRouter, DeepSeek, Hugging Face router
//! - **Gemini**: Google Generative Language API
//!
//! # Usage
//!
//! ```ignore
//! use switchboard_core::backend::{ChatRequest, OpenAiCompatAdapter, ProviderAdapter};
//! use switchboard_core::providers::ProviderId;
//!
//! let adapter = OpenAiCompatAdapter::for_provider(ProviderId::Groq)?;
//! let lease = manager.next_credential(ProviderId::Groq).unwrap();
//! let response = adapter.call(&lease, &ChatRequest::from_prompt("Hello!")).await?;
//! ```

mod gemini;
mod openai_compat;
pub mod sse;
mod traits;

use std::sync::Arc;

pub use gemini::GeminiAdapter;
pub use openai_compat::OpenAiCompatAdapter;
pub use traits::{
    AdapterConfig, AdapterError, ChatMessage, ChatRequest, ChatResponse, ModelInfo,
    ProviderAdapter, RequestError, Role, StreamChunk, StreamEvent, TokenUsage,
};

use crate::providers::ProviderId;

/// Build the adapter that speaks a provider's wire format
///
/// Returns `None` for capability-only providers without a chat dialect.
pub fn adapter_for(
    config: AdapterConfig,
) -> Option<Result<Arc<dyn ProviderAdapter>, AdapterError>> {
    let adapter: Result<Arc<dyn ProviderAdapter>, AdapterError> = match config.provider {
        ProviderId::Groq
        | ProviderId::OpenRouter
        | ProviderId::DeepSeek
        | ProviderId::HuggingFace => {
            OpenAiCompatAdapter::new(config).map(|a| Arc::new(a) as Arc<dyn ProviderAdapter>)
        }
        ProviderId::Gemini => GeminiAdapter::new(config).map(|a| Arc::new(a) as Arc<dyn ProviderAdapter>),
        ProviderId::OcrSpace => return None,
    };
    Some(adapter)
}
