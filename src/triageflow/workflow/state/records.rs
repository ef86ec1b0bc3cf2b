// SPDX-License-Identifier: MIT

//! Value objects carried inside workflow state
//!
//! These are produced by the agents (extraction, patient lookup, intake
//! compilation, triage) and merged into state as opaque payloads. The engine
//! itself only reads the flags used by routing predicates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Who authored a conversation entry
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Ai,
    System,
}

/// One entry of the conversation history
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            role: Role::Ai,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Patient details supplied by the caller at workflow start
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PatientInfo {
    pub patient_id: Option<String>,
    pub name: Option<String>,
    pub age: Option<u32>,
    pub medical_history: Vec<String>,
    pub current_symptoms: Vec<String>,
    pub current_medications: Vec<String>,
    pub vital_signs: HashMap<String, serde_json::Value>,
}

/// Demographic and history record held by the patient store
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PatientRecord {
    pub name: String,
    pub age: Option<u32>,
    pub gender: String,
    #[serde(default)]
    pub medical_history: Vec<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub current_medications: Vec<String>,
    #[serde(default = "not_provided")]
    pub emergency_contact: String,
}

fn not_provided() -> String {
    "Not provided".to_string()
}

impl PatientRecord {
    /// Record returned for ids the store does not know
    pub fn unknown() -> Self {
        Self {
            name: "Unknown Patient".to_string(),
            age: None,
            gender: "Unknown".to_string(),
            medical_history: Vec::new(),
            allergies: Vec::new(),
            current_medications: Vec::new(),
            emergency_contact: not_provided(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.name == "Unknown Patient" && self.age.is_none()
    }
}

/// Vital signs mentioned in a conversation
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct VitalSigns {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blood_pressure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl VitalSigns {
    pub fn is_empty(&self) -> bool {
        self.blood_pressure.is_none() && self.temperature.is_none()
    }
}

/// Structured fields pulled out of a conversation
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ExtractedInfo {
    pub symptoms: Vec<String>,
    pub pain_level: Option<u8>,
    pub chief_complaint: Option<String>,
    pub additional_notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(skip_serializing_if = "VitalSigns::is_empty")]
    pub vital_signs: VitalSigns,
}

/// Compiled intake result, the input to routing and triage
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct IntakeData {
    pub patient_id: String,
    pub name: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub current_symptoms: Vec<String>,
    pub reported_pain_level: Option<u8>,
    pub chief_complaint: Option<String>,
    pub medical_history: Vec<String>,
    pub allergies: Vec<String>,
    pub current_medications: Vec<String>,
    pub vital_signs: VitalSigns,
    pub emergency_contact: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub emergency_flag: bool,
    #[serde(default)]
    pub non_medical: bool,
    pub incomplete_info: bool,
    pub confidence_score: f64,
    pub next_steps: Vec<String>,
}

/// Triage outcome on a 1 (most urgent) to 5 (least urgent) scale
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TriageDecision {
    pub priority_level: u8,
    pub reasoning: String,
    pub recommended_actions: Vec<String>,
    pub estimated_wait_time: Option<u32>,
}

impl TriageDecision {
    /// Lowest (most urgent) and highest priority levels
    pub const PRIORITY_RANGE: std::ops::RangeInclusive<u8> = 1..=5;

    pub fn is_valid(&self) -> bool {
        Self::PRIORITY_RANGE.contains(&self.priority_level)
    }
}
