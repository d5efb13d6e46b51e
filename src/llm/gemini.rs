//! Gemini `generateContent` driver.
//!
//! System turns are joined into `systemInstruction`; user and model turns go
//! to `contents` in order. Consecutive turns with the same role are merged,
//! since the API rejects two user turns in a row.

use serde_json::{Value, json};

use super::{
    Generation, GenerationDriver, GenerationError, GenerationSettings, Turn, TurnRole,
};

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Clone)]
pub struct GeminiDriver {
    http: reqwest::Client,
    settings: GenerationSettings,
}

impl std::fmt::Debug for GeminiDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiDriver")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .field("has_key", &self.settings.api_key.is_some())
            .finish_non_exhaustive()
    }
}

impl GeminiDriver {
    pub fn new(settings: GenerationSettings) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self { http, settings })
    }

    fn body(&self, turns: &[Turn]) -> Value {
        let system: Vec<&str> = turns
            .iter()
            .filter(|t| t.role == TurnRole::System)
            .map(|t| t.text.as_str())
            .collect();

        let mut contents: Vec<(&'static str, String)> = Vec::new();
        for turn in turns.iter().filter(|t| t.role != TurnRole::System) {
            let role = if turn.role == TurnRole::Model {
                "model"
            } else {
                "user"
            };
            match contents.last_mut() {
                Some((last, text)) if *last == role => {
                    text.push_str("\n\n");
                    text.push_str(&turn.text);
                }
                _ => contents.push((role, turn.text.clone())),
            }
        }

        let mut body = json!({
            "contents": contents
                .into_iter()
                .map(|(role, text)| json!({ "role": role, "parts": [{ "text": text }] }))
                .collect::<Vec<_>>(),
            "generationConfig": {
                "temperature": self.settings.temperature,
                "topK": self.settings.top_k,
                "topP": self.settings.top_p,
                "maxOutputTokens": self.settings.max_output_tokens,
            }
        });
        if !system.is_empty() {
            body["systemInstruction"] = json!({ "parts": [{ "text": system.join("\n\n") }] });
        }
        body
    }
}

/// Concatenated text parts of the first candidate.
fn candidate_text(raw: &Value) -> Option<String> {
    let parts = raw["candidates"][0]["content"]["parts"].as_array()?;
    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    (!text.is_empty()).then_some(text)
}

#[async_trait::async_trait]
impl GenerationDriver for GeminiDriver {
    async fn generate(&self, turns: &[Turn]) -> Result<Generation, GenerationError> {
        let key = self
            .settings
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(GenerationError::NotConfigured)?;
        let url = self
            .settings
            .provider
            .build_url(&self.settings.base_url, &self.settings.model);

        let resp = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, key)
            .json(&self.body(turns))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(
                name: "llm.request.failed",
                status = status.as_u16(),
                model = %self.settings.model,
                "Gemini request failed"
            );
            return Err(GenerationError::from_status(status.as_u16(), body));
        }

        let raw: Value = resp.json().await?;
        match candidate_text(&raw) {
            Some(text) => Ok(Generation { text, raw }),
            None => Err(GenerationError::EmptyCandidate { raw }),
        }
    }
}
