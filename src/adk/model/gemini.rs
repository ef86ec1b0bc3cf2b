// SPDX-License-Identifier: MIT

//! Gemini Model - Google's Gemini API implementation

use super::{Content, GenerationConfig, Model, Part};
use crate::adk::error::{BoxError, ModelError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Google Gemini model implementation
pub struct GeminiModel {
    client: Client,
    api_key: String,
    model_name: String,
    defaults: GenerationConfig,
}

impl GeminiModel {
    /// Create a new GeminiModel with an explicit API key
    pub fn new(model_name: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ModelError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ModelError::ApiKeyMissing("gemini".to_string()));
        }
        Ok(Self {
            client: Client::new(),
            api_key,
            model_name: model_name.into(),
            defaults: GenerationConfig::default(),
        })
    }

    /// Generation settings used when a call passes no config
    pub fn with_defaults(mut self, defaults: GenerationConfig) -> Self {
        self.defaults = defaults;
        self
    }

    fn request_body(history: &[Content], config: &GenerationConfig) -> serde_json::Value {
        let to_parts = |c: &Content| -> Vec<serde_json::Value> {
            c.parts
                .iter()
                .filter_map(|p| match p {
                    Part::Text(t) => Some(json!({ "text": t })),
                    Part::Thinking(_) => None,
                })
                .collect()
        };

        // Gemini takes system prompts out of band
        let system_parts: Vec<serde_json::Value> = history
            .iter()
            .filter(|c| c.role == "system")
            .flat_map(to_parts)
            .collect();
        let contents: Vec<serde_json::Value> = history
            .iter()
            .filter(|c| c.role != "system")
            .map(|c| json!({ "role": c.role, "parts": to_parts(c) }))
            .collect();

        let mut generation = serde_json::Map::new();
        if let Some(t) = config.temperature {
            generation.insert("temperature".into(), json!(t));
        }
        if let Some(m) = config.max_output_tokens {
            generation.insert("maxOutputTokens".into(), json!(m));
        }
        if config.json_output {
            generation.insert("responseMimeType".into(), json!("application/json"));
        }

        let mut body = json!({ "contents": contents });
        if !system_parts.is_empty() {
            body["systemInstruction"] = json!({ "parts": system_parts });
        }
        if !generation.is_empty() {
            body["generationConfig"] = serde_json::Value::Object(generation);
        }
        body
    }
}

#[async_trait]
impl Model for GeminiModel {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, BoxError> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            GEMINI_BASE_URL, self.model_name, self.api_key
        );
        let body = Self::request_body(history, config.unwrap_or(&self.defaults));

        log::debug!(
            "Gemini request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let resp = self.client.post(&url).json(&body).send().await?;

        if !resp.status().is_success() {
            let text = resp.text().await?;
            return Err(ModelError::api("gemini", text).into());
        }

        let resp_json: serde_json::Value = resp.json().await?;
        log::debug!("Gemini response: {}", resp_json);
        Ok(parse_response(&resp_json)?)
    }
}

/// Convert a `generateContent` response body into a [`Content`]
fn parse_response(resp_json: &serde_json::Value) -> Result<Content, ModelError> {
    let candidate = resp_json["candidates"]
        .as_array()
        .and_then(|c| c.first())
        .ok_or_else(|| ModelError::InvalidResponse("no candidates in response".into()))?;

    if candidate.get("finishReason").and_then(|v| v.as_str()) == Some("SAFETY") {
        return Err(ModelError::InvalidResponse(
            "response blocked by safety filters".into(),
        ));
    }

    let parts_json = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            log::error!("No content parts in candidate: {}", candidate);
            ModelError::InvalidResponse("no content parts in candidate".into())
        })?;

    let mut parts = Vec::new();
    for p in parts_json {
        if let Some(thought) = p.get("thought").and_then(|t| t.as_str()) {
            if !thought.is_empty() {
                parts.push(Part::Thinking(thought.to_string()));
            }
        }
        if let Some(text) = p["text"].as_str() {
            parts.push(Part::Text(text.to_string()));
        }
    }

    Ok(Content {
        role: "model".to_string(),
        parts,
    })
}
