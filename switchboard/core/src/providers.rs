//! Provider Identifiers
//!
//! The fixed set of remote backends the switchboard knows about, together with
//! the static facts about each one: which capabilities it serves, where its API
//! lives, and the per-credential daily ceiling used when configuration does not
//! override it.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ============================================================================
// Capabilities
// ============================================================================

/// A kind of work a provider can perform
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Text chat completion
    #[default]
    Chat,
    /// Image understanding
    Vision,
    /// Speech to text
    Transcription,
    /// Optical character recognition
    Ocr,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chat => write!(f, "chat"),
            Self::Vision => write!(f, "vision"),
            Self::Transcription => write!(f, "transcription"),
            Self::Ocr => write!(f, "ocr"),
        }
    }
}

// ============================================================================
// Provider Identifier
// ============================================================================

/// Identifier of a remote provider
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    /// Groq (OpenAI-compatible wire format)
    Groq,
    /// OpenRouter (OpenAI-compatible wire format)
    OpenRouter,
    /// DeepSeek (OpenAI-compatible wire format)
    DeepSeek,
    /// Google Gemini
    Gemini,
    /// Hugging Face inference router, used for vision
    HuggingFace,
    /// OCR.space, capability-only
    OcrSpace,
}

impl ProviderId {
    /// Every provider, in declaration order
    pub const ALL: [ProviderId; 6] = [
        Self::Groq,
        Self::OpenRouter,
        Self::DeepSeek,
        Self::Gemini,
        Self::HuggingFace,
        Self::OcrSpace,
    ];

    /// Stable lowercase name used in configuration and logs
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::OpenRouter => "openrouter",
            Self::DeepSeek => "deepseek",
            Self::Gemini => "gemini",
            Self::HuggingFace => "huggingface",
            Self::OcrSpace => "ocr_space",
        }
    }

    /// Capabilities served by this provider
    #[must_use]
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Self::Groq => &[Capability::Chat, Capability::Transcription],
            Self::OpenRouter | Self::DeepSeek => &[Capability::Chat],
            Self::Gemini => &[Capability::Chat, Capability::Vision],
            Self::HuggingFace => &[Capability::Vision],
            Self::OcrSpace => &[Capability::Ocr],
        }
    }

    /// Whether this provider serves the given capability
    #[must_use]
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Default per-credential daily request ceiling
    #[must_use]
    pub fn default_daily_limit(&self) -> u32 {
        match self {
            Self::Groq => 14_400,
            Self::OpenRouter => 200,
            Self::DeepSeek => 10_000,
            Self::Gemini => 1_500,
            Self::HuggingFace => 1_000,
            Self::OcrSpace => 800,
        }
    }

    /// Default API base URL
    #[must_use]
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::DeepSeek => "https://api.deepseek.com/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Self::HuggingFace => "https://router.huggingface.co/v1",
            Self::OcrSpace => "https://api.ocr.space",
        }
    }

    /// Request timeout for a single-shot call
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        match self {
            Self::Groq => Duration::from_secs(30),
            Self::OpenRouter => Duration::from_secs(90),
            Self::DeepSeek => Duration::from_secs(120),
            Self::Gemini => Duration::from_secs(60),
            Self::HuggingFace => Duration::from_secs(60),
            Self::OcrSpace => Duration::from_secs(30),
        }
    }

    /// Environment variable prefix holding this provider's keys
    #[must_use]
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Self::Groq => "GROQ_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
            Self::DeepSeek => "DEEPSEEK_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
            Self::HuggingFace => "HUGGINGFACE_API_KEY",
            Self::OcrSpace => "OCR_SPACE_API_KEY",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown provider name
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderId {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized || p.as_str().replace('_', "") == normalized)
            .ok_or_else(|| UnknownProvider(s.to_string()))
    }
}
