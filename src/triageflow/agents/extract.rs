// SPDX-License-Identifier: MIT

//! Conversation extraction
//!
//! Turns free-text nurse/patient conversation into [`ExtractedInfo`].
//! [`KeywordExtractor`] uses fixed keyword lists and regular expressions;
//! [`LlmExtractor`] asks a [`Model`] for the same fields as JSON.

use crate::adk::error::{BoxError, ModelError};
use crate::adk::model::{extract_json_block, Content, GenerationConfig, Model};
use crate::triageflow::workflow::state::{ExtractedInfo, VitalSigns};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

/// Symptom words recognised by the keyword extractor, in reporting order
pub const SYMPTOM_KEYWORDS: &[&str] = &[
    "pain",
    "headache",
    "fever",
    "nausea",
    "dizziness",
    "cough",
    "fatigue",
];

static PAIN_LEVEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"pain.*?(\d+)(?:\s*(?:out of|/)\s*10)?").expect("valid regex"));
static AGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:age|years old|year old).*?(\d+)|(\d+).*?(?:years old|year old)")
        .expect("valid regex")
});
static NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:my name is|i am|i'm)\s+([a-zA-Z\s]+)").expect("valid regex"));
static BLOOD_PRESSURE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"blood pressure.*?(\d+)/(\d+)").expect("valid regex"));
static TEMPERATURE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"temperature.*?(\d+\.?\d*)").expect("valid regex"));

/// Anything that can turn a conversation into structured fields
#[async_trait]
pub trait ConversationExtractor: Send + Sync {
    /// Extract fields from `conversation`. Empty input yields
    /// `ExtractedInfo::default()`.
    async fn extract(&self, conversation: &str) -> Result<ExtractedInfo, BoxError>;
}

/// Keyword and pattern based extractor
#[derive(Clone, Copy, Debug, Default)]
pub struct KeywordExtractor;

impl KeywordExtractor {
    pub fn parse(&self, conversation: &str) -> ExtractedInfo {
        if conversation.trim().is_empty() {
            return ExtractedInfo::default();
        }
        let lower = conversation.to_lowercase();

        let symptoms = SYMPTOM_KEYWORDS
            .iter()
            .filter(|keyword| lower.contains(*keyword))
            .map(|keyword| keyword.to_string())
            .collect();

        let pain_level = PAIN_LEVEL
            .captures(&lower)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok());

        let age = AGE
            .captures(&lower)
            .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
            .and_then(|m| m.as_str().parse().ok());

        let name = NAME
            .captures(&lower)
            .and_then(|caps| caps.get(1))
            .map(|m| title_case(m.as_str()))
            .filter(|name| !name.is_empty());

        // First sentence of the original text
        let chief_complaint = conversation
            .split('.')
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let vital_signs = VitalSigns {
            blood_pressure: BLOOD_PRESSURE
                .captures(&lower)
                .map(|caps| format!("{}/{}", &caps[1], &caps[2])),
            temperature: TEMPERATURE
                .captures(&lower)
                .and_then(|caps| caps[1].parse().ok()),
        };

        ExtractedInfo {
            symptoms,
            pain_level,
            chief_complaint,
            additional_notes: String::new(),
            name,
            age,
            vital_signs,
        }
    }
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl ConversationExtractor for KeywordExtractor {
    async fn extract(&self, conversation: &str) -> Result<ExtractedInfo, BoxError> {
        Ok(self.parse(conversation))
    }
}

const EXTRACTION_INSTRUCTION: &str = "You extract clinical intake data from a conversation \
between a nurse and a patient. Answer with a single JSON object and nothing else, using \
these keys: \"symptoms\" (array of short lowercase strings), \"pain_level\" (integer 0-10 \
or null), \"chief_complaint\" (string or null), \"additional_notes\" (string), \"name\" \
(string or null), \"age\" (integer or null), \"vital_signs\" (object with optional \
\"blood_pressure\" string and \"temperature\" number). Use null when the conversation does \
not say.";

/// Extractor backed by a completion model
pub struct LlmExtractor {
    model: Arc<dyn Model>,
    config: GenerationConfig,
}

impl LlmExtractor {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self {
            model,
            config: GenerationConfig {
                json_output: true,
                ..GenerationConfig::default()
            },
        }
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = GenerationConfig {
            json_output: true,
            ..config
        };
        self
    }
}

#[async_trait]
impl ConversationExtractor for LlmExtractor {
    async fn extract(&self, conversation: &str) -> Result<ExtractedInfo, BoxError> {
        if conversation.trim().is_empty() {
            return Ok(ExtractedInfo::default());
        }

        let history = vec![
            Content {
                role: "system".to_string(),
                ..Content::user(EXTRACTION_INSTRUCTION)
            },
            Content::user(conversation),
        ];
        let response = self
            .model
            .generate_content(&history, Some(&self.config))
            .await?;
        let text = response.text();
        log::debug!("Extraction answer: {}", text);

        let value = extract_json_block(&text).ok_or_else(|| {
            ModelError::InvalidResponse(format!("no JSON object in extraction answer: {}", text))
        })?;
        let info: ExtractedInfo = serde_json::from_value(value)
            .map_err(|e| ModelError::InvalidResponse(format!("bad extraction JSON: {}", e)))?;
        Ok(info)
    }
}
