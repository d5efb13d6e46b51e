//! Text generation drivers.
//!
//! The [`GenerationDriver`] trait takes an ordered list of [`Turn`]s and
//! returns the model's text verbatim along with the raw response body.
//!
//! # Drivers
//!
//! - [`GeminiDriver`]: `generateContent` (`/v1beta/models/{model}:generateContent`)
//! - [`ChatCompletionsDriver`]: OpenAI-compatible `/v1/chat/completions`
//!
//! There is no retry: a failed call surfaces as a [`GenerationError`] whose
//! [`user_message`](GenerationError::user_message) is safe to show.

pub mod chat_completions;
pub mod gemini;
pub mod orchestrator;
pub mod provider;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use chat_completions::ChatCompletionsDriver;
pub use gemini::GeminiDriver;
pub use orchestrator::{ChatReply, ChatTurnRequest, Orchestrator};
pub use provider::Provider;

/// Reply used when the model returns no candidate text.
pub const EMPTY_REPLY: &str = "No se pudo generar una respuesta";

/// Generation endpoint and sampling settings.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    /// Base URL (e.g. `https://generativelanguage.googleapis.com`).
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub provider: Provider,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
    pub timeout: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key: None,
            provider: Provider::Gemini,
            temperature: 0.7,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 1024,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Author of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// Instructions and grounding context.
    System,
    User,
    /// The assistant.
    Model,
}

/// One message in the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

impl Turn {
    pub fn new(role: TurnRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// Model output.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    /// Full response body as returned by the API.
    pub raw: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation quota exhausted: {0}")]
    Quota(String),

    #[error("generation API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Carries no URL.
    #[error("generation request failed: {0}")]
    Transport(reqwest::Error),

    #[error("generation response had no candidate text")]
    EmptyCandidate { raw: Value },

    #[error("generation API key is not configured")]
    NotConfigured,
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.without_url())
    }
}

impl GenerationError {
    /// Message suitable for the end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Quota(_) => {
                "Se alcanzó el límite de uso del servicio de IA. Por favor, intenta de nuevo en unos minutos."
            }
            _ => "Lo siento, hubo un error al procesar tu consulta. Por favor, intenta de nuevo.",
        }
    }

    pub fn is_quota(&self) -> bool {
        matches!(self, Self::Quota(_))
    }

    /// Classify a non-success HTTP response.
    pub(crate) fn from_status(status: u16, body: String) -> Self {
        if status == 429 || body.contains("RESOURCE_EXHAUSTED") {
            Self::Quota(body)
        } else {
            Self::Status { status, body }
        }
    }
}

#[async_trait::async_trait]
pub trait GenerationDriver: Send + Sync + std::fmt::Debug {
    async fn generate(&self, turns: &[Turn]) -> Result<Generation, GenerationError>;
}

/// Driver for `settings.provider`.
pub fn build_driver(
    settings: GenerationSettings,
) -> Result<Arc<dyn GenerationDriver>, GenerationError> {
    Ok(match settings.provider {
        Provider::Gemini => Arc::new(GeminiDriver::new(settings)?),
        Provider::OpenAiCompatible => Arc::new(ChatCompletionsDriver::new(settings)?),
    })
}
