//! Provider detection and endpoint construction.
//!
//! Gemini authenticates with an `x-goog-api-key` header and takes a
//! `contents`/`generationConfig` body. Everything else is treated as an
//! OpenAI-compatible chat completions endpoint with a bearer token.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Google Generative Language API.
    #[default]
    Gemini,
    /// `OpenAI`, `OpenRouter`, Groq, local gateways...
    #[serde(alias = "openai")]
    OpenAiCompatible,
}

impl Provider {
    /// Detect provider from base URL.
    #[must_use]
    pub fn detect_from_url(base_url: &str) -> Self {
        let lower = base_url.to_lowercase();
        if lower.contains("generativelanguage.googleapis.com") {
            Self::Gemini
        } else {
            Self::OpenAiCompatible
        }
    }

    /// Parse a configured provider name; `auto` (or anything unknown) falls
    /// back to URL detection.
    #[must_use]
    pub fn from_setting(setting: &str, base_url: &str) -> Self {
        match setting.trim().to_lowercase().as_str() {
            "gemini" | "google" => Self::Gemini,
            "openai" | "openai_compatible" | "chat" => Self::OpenAiCompatible,
            _ => Self::detect_from_url(base_url),
        }
    }

    /// Build the generation URL. Credentials travel in headers, never here.
    #[must_use]
    pub fn build_url(self, base_url: &str, model: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match self {
            Self::Gemini => format!("{base}/v1beta/models/{model}:generateContent"),
            Self::OpenAiCompatible => format!("{base}/v1/chat/completions"),
        }
    }
}
