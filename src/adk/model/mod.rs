// SPDX-License-Identifier: MIT

//! Model module - defines the LLM model trait and shared types
//!
//! Agents that delegate text understanding to a completion service talk to
//! it through [`Model`]. The only shipped implementation is [gemini].

pub mod gemini;

use crate::adk::error::BoxError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    /// Ask the provider for a JSON-only answer
    #[serde(default)]
    pub json_output: bool,
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

/// Parts of a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Part {
    /// Regular text output from the model
    Text(String),
    /// Thinking/reasoning content from thinking models, never sent back
    Thinking(String),
}

impl Content {
    /// A single-part user message
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part::Text(text.into())],
        }
    }

    /// A single-part model message
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: "model".to_string(),
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Concatenated text parts, skipping thinking output
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::Thinking(_) => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Core trait for LLM model implementations
#[async_trait]
pub trait Model: Send + Sync {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, BoxError>;
}

/// Pull a JSON object out of a model answer that may be wrapped in a
/// markdown code fence or surrounded by prose.
pub fn extract_json_block(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str(trimmed) {
        return Some(v);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_text_skips_thinking() {
        let content = Content {
            role: "model".into(),
            parts: vec![
                Part::Thinking("hmm".into()),
                Part::Text("{\"a\":".into()),
                Part::Text("1}".into()),
            ],
        };
        assert_eq!(content.text(), "{\"a\":1}");
    }

    #[test]
    fn test_extract_json_block_plain() {
        assert_eq!(extract_json_block(r#"{"x": 2}"#), Some(json!({"x": 2})));
    }

    #[test]
    fn test_extract_json_block_fenced() {
        let answer = "Here you go:\n```json\n{\"symptoms\": [\"fever\"]}\n```";
        assert_eq!(
            extract_json_block(answer),
            Some(json!({"symptoms": ["fever"]}))
        );
    }

    #[test]
    fn test_extract_json_block_none() {
        assert_eq!(extract_json_block("no json here"), None);
        assert_eq!(extract_json_block("} backwards {"), None);
    }
}
