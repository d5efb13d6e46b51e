//! OpenAI-compatible Chat Completions driver (`/v1/chat/completions`).

use serde_json::{Value, json};

use super::{
    Generation, GenerationDriver, GenerationError, GenerationSettings, Turn, TurnRole,
};

/// Driver for OpenAI-compatible chat completion endpoints.
#[derive(Clone)]
pub struct ChatCompletionsDriver {
    http: reqwest::Client,
    settings: GenerationSettings,
}

impl std::fmt::Debug for ChatCompletionsDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsDriver")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .finish_non_exhaustive()
    }
}

impl ChatCompletionsDriver {
    pub fn new(settings: GenerationSettings) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self { http, settings })
    }

    fn body(&self, turns: &[Turn]) -> Value {
        let messages: Vec<Value> = turns
            .iter()
            .map(|t| {
                let role = match t.role {
                    TurnRole::System => "system",
                    TurnRole::User => "user",
                    TurnRole::Model => "assistant",
                };
                json!({ "role": role, "content": t.text })
            })
            .collect();

        json!({
            "model": self.settings.model,
            "messages": messages,
            "temperature": self.settings.temperature,
            "top_p": self.settings.top_p,
            "max_tokens": self.settings.max_output_tokens,
        })
    }
}

#[async_trait::async_trait]
impl GenerationDriver for ChatCompletionsDriver {
    async fn generate(&self, turns: &[Turn]) -> Result<Generation, GenerationError> {
        let url = self
            .settings
            .provider
            .build_url(&self.settings.base_url, &self.settings.model);

        let mut rb = self.http.post(&url).json(&self.body(turns));
        if let Some(k) = &self.settings.api_key {
            rb = rb.bearer_auth(k);
        }

        let resp = rb.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::from_status(status.as_u16(), body));
        }

        let raw: Value = resp.json().await?;
        let text = raw["choices"][0]["message"]["content"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(ToString::to_string);

        match text {
            Some(text) => Ok(Generation { text, raw }),
            None => Err(GenerationError::EmptyCandidate { raw }),
        }
    }
}
