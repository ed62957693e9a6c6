//! Default Models
//!
//! Pure lookup from (provider, mode) to a model identifier. Callers resolve
//! the model before handing a request to the router; the router itself never
//! consults this table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::providers::ProviderId;

/// What the caller is asking for
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    /// Everyday conversation
    #[default]
    General,
    /// Programming help
    Code,
    /// Short, latency-sensitive answers
    Fast,
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::General => write!(f, "general"),
            Self::Code => write!(f, "code"),
            Self::Fast => write!(f, "fast"),
        }
    }
}

impl FromStr for ChatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "general" | "chat" => Ok(Self::General),
            "code" | "coding" => Ok(Self::Code),
            "fast" | "quick" => Ok(Self::Fast),
            other => Err(format!("unknown chat mode: {other}")),
        }
    }
}

/// Model to use for a provider in a given mode
#[must_use]
pub fn default_model(provider: ProviderId, mode: ChatMode) -> &'static str {
    match (provider, mode) {
        (ProviderId::Groq, ChatMode::General) => "llama-3.3-70b-versatile",
        (ProviderId::Groq, ChatMode::Code) => "qwen/qwen3-32b",
        (ProviderId::Groq, ChatMode::Fast) => "llama-3.1-8b-instant",
        (ProviderId::OpenRouter, ChatMode::General | ChatMode::Fast) => {
            "meta-llama/llama-3.3-70b-instruct:free"
        }
        (ProviderId::OpenRouter, ChatMode::Code) => "qwen/qwen-2.5-coder-32b-instruct:free",
        (ProviderId::DeepSeek, ChatMode::General | ChatMode::Fast) => "deepseek-chat",
        (ProviderId::DeepSeek, ChatMode::Code) => "deepseek-coder",
        (ProviderId::Gemini, ChatMode::General | ChatMode::Code) => "gemini-2.0-flash",
        (ProviderId::Gemini, ChatMode::Fast) => "gemini-2.0-flash-lite",
        (ProviderId::HuggingFace, _) => "meta-llama/Llama-3.2-11B-Vision-Instruct",
        (ProviderId::OcrSpace, _) => "ocr-engine-2",
    }
}

/// Every model advertised for a provider, default first
#[must_use]
pub fn catalogue(provider: ProviderId) -> &'static [&'static str] {
    match provider {
        ProviderId::Groq => &[
            "llama-3.3-70b-versatile",
            "llama-3.1-8b-instant",
            "qwen/qwen3-32b",
        ],
        ProviderId::OpenRouter => &[
            "meta-llama/llama-3.3-70b-instruct:free",
            "qwen/qwen-2.5-coder-32b-instruct:free",
        ],
        ProviderId::DeepSeek => &["deepseek-chat", "deepseek-coder"],
        ProviderId::Gemini => &["gemini-2.0-flash", "gemini-2.0-flash-lite"],
        ProviderId::HuggingFace => &["meta-llama/Llama-3.2-11B-Vision-Instruct"],
        ProviderId::OcrSpace => &["ocr-engine-2"],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_in_catalogue() {
        for provider in ProviderId::ALL {
            for mode in [ChatMode::General, ChatMode::Code, ChatMode::Fast] {
                let model = default_model(provider, mode);
                assert!(
                    catalogue(provider).contains(&model),
                    "{provider}/{mode} -> {model} missing from catalogue"
                );
            }
            assert_eq!(catalogue(provider)[0], default_model(provider, ChatMode::General));
        }
    }

    #[test]
    fn test_code_mode_prefers_coding_models() {
        assert_eq!(default_model(ProviderId::DeepSeek, ChatMode::Code), "deepseek-coder");
        assert_eq!("coding".parse::<ChatMode>(), Ok(ChatMode::Code));
        assert!("poetry".parse::<ChatMode>().is_err());
    }
}
