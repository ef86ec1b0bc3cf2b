// SPDX-License-Identifier: MIT

//! Intake agent
//!
//! A three-node subgraph that reads the latest conversation entry, looks up
//! the patient's stored record and compiles both into [`IntakeData`]:
//!
//! `extract_conversation_info -> get_patient_history -> validate_and_compile`
//!
//! Missing conversation or patient id are reported in `errors`; the run
//! carries on with whatever is known.

use super::extract::{ConversationExtractor, KeywordExtractor};
use super::patients::PatientStore;
use crate::adk::error::{BoxError, GraphError};
use crate::triageflow::workflow::graph::{CompiledGraph, GraphSpec, Node, SubgraphNode, END};
use crate::triageflow::workflow::state::{IntakeData, StateUpdate, WorkflowState};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

pub const EXTRACT_CONVERSATION_INFO: &str = "extract_conversation_info";
pub const GET_PATIENT_HISTORY: &str = "get_patient_history";
pub const VALIDATE_AND_COMPILE: &str = "validate_and_compile";

/// Phrases that flag an intake for emergency handling
pub const EMERGENCY_KEYWORDS: &[&str] = &[
    "chest pain",
    "difficulty breathing",
    "severe pain",
    "unconscious",
    "bleeding heavily",
];

/// Phrases marking an administrative rather than clinical request
pub const NON_MEDICAL_KEYWORDS: &[&str] = &[
    "appointment",
    "billing",
    "prescription refill",
    "insurance",
    "paperwork",
];

const REQUIRED_WEIGHT: f64 = 1.0;
const OPTIONAL_WEIGHT: f64 = 0.5;
// Two required fields plus four optional ones
const MAX_SCORE: f64 = 2.0 * REQUIRED_WEIGHT + 4.0 * OPTIONAL_WEIGHT;

/// Builds the intake subgraph from its collaborators
#[derive(Clone)]
pub struct IntakeAgent {
    extractor: Arc<dyn ConversationExtractor>,
    patients: Arc<dyn PatientStore>,
}

impl IntakeAgent {
    pub fn new(extractor: Arc<dyn ConversationExtractor>, patients: Arc<dyn PatientStore>) -> Self {
        Self {
            extractor,
            patients,
        }
    }

    pub fn spec(&self) -> GraphSpec {
        GraphSpec::new("intake")
            .add_node(
                EXTRACT_CONVERSATION_INFO,
                ExtractConversationInfo {
                    extractor: self.extractor.clone(),
                },
            )
            .add_node(
                GET_PATIENT_HISTORY,
                GetPatientHistory {
                    patients: self.patients.clone(),
                },
            )
            .add_node(VALIDATE_AND_COMPILE, ValidateAndCompile)
            .set_entry(EXTRACT_CONVERSATION_INFO)
            .add_edge(EXTRACT_CONVERSATION_INFO, GET_PATIENT_HISTORY)
            .add_edge(GET_PATIENT_HISTORY, VALIDATE_AND_COMPILE)
            .add_edge(VALIDATE_AND_COMPILE, END)
    }

    pub fn compile(&self) -> Result<CompiledGraph, GraphError> {
        self.spec().compile()
    }

    /// The compiled subgraph wrapped as a single outer node
    pub fn node(&self) -> Result<SubgraphNode, GraphError> {
        Ok(SubgraphNode::new(self.compile()?))
    }
}

struct ExtractConversationInfo {
    extractor: Arc<dyn ConversationExtractor>,
}

#[async_trait]
impl Node for ExtractConversationInfo {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, BoxError> {
        let conversation = match state.last_message() {
            Some(text) => text,
            None => {
                log::warn!("Intake started without a conversation");
                return Ok(StateUpdate {
                    extracted_info: Some(Default::default()),
                    ..StateUpdate::with_error("No conversation found in messages")
                });
            }
        };

        match self.extractor.extract(conversation).await {
            Ok(info) => Ok(StateUpdate {
                extracted_info: Some(info),
                ..StateUpdate::default()
            }),
            Err(e) => {
                log::warn!("Extraction failed, falling back to keywords: {}", e);
                Ok(StateUpdate {
                    extracted_info: Some(KeywordExtractor.parse(conversation)),
                    ..StateUpdate::with_error(format!("Extraction failed: {}", e))
                })
            }
        }
    }
}

struct GetPatientHistory {
    patients: Arc<dyn PatientStore>,
}

#[async_trait]
impl Node for GetPatientHistory {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, BoxError> {
        let Some(patient_id) = state.resolve_patient_id() else {
            log::warn!("Intake has no patient id");
            return Ok(StateUpdate::with_error("No patient ID found in state"));
        };

        let record = self.patients.get_patient_record(&patient_id);
        if record.is_unknown() {
            log::info!("Patient '{}' has no stored record", patient_id);
        }
        Ok(StateUpdate {
            patient_id: Some(patient_id),
            patient_record: Some(record),
            ..StateUpdate::default()
        })
    }
}

struct ValidateAndCompile;

#[async_trait]
impl Node for ValidateAndCompile {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, BoxError> {
        let intake = compile_intake(state);
        log::info!(
            "Intake compiled for '{}': emergency={}, incomplete={}, confidence={:.2}",
            intake.patient_id,
            intake.emergency_flag,
            intake.incomplete_info,
            intake.confidence_score
        );
        Ok(StateUpdate {
            intake_completed: Some(true),
            intake_data: Some(intake),
            ..StateUpdate::default()
        })
    }
}

/// Merge extracted conversation fields with the stored record.
///
/// A known stored record wins for identity fields (name, age, gender); the
/// conversation fills them in only when the store had nothing.
pub fn compile_intake(state: &WorkflowState) -> IntakeData {
    let extracted = state.extracted_info.clone().unwrap_or_default();
    let record = state.patient_record.as_ref().filter(|r| !r.is_unknown());

    let name = record
        .map(|r| r.name.clone())
        .or_else(|| extracted.name.clone());
    let age = record.and_then(|r| r.age).or(extracted.age);
    let chief_complaint = extracted
        .chief_complaint
        .clone()
        .filter(|c| !c.trim().is_empty());

    let emergency_flag = is_emergency(&extracted.symptoms, chief_complaint.as_deref());
    let non_medical = extracted.symptoms.is_empty()
        && state
            .last_message()
            .is_some_and(|text| contains_any(&text.to_lowercase(), NON_MEDICAL_KEYWORDS));
    let incomplete_info = extracted.symptoms.is_empty() || chief_complaint.is_none();

    let present = |has: bool, weight: f64| if has { weight } else { 0.0 };
    let score = present(!extracted.symptoms.is_empty(), REQUIRED_WEIGHT)
        + present(chief_complaint.is_some(), REQUIRED_WEIGHT)
        + present(name.is_some(), OPTIONAL_WEIGHT)
        + present(age.is_some(), OPTIONAL_WEIGHT)
        + present(extracted.pain_level.is_some(), OPTIONAL_WEIGHT)
        + present(!extracted.vital_signs.is_empty(), OPTIONAL_WEIGHT);
    let confidence_score = (score / MAX_SCORE).min(1.0);

    let current_medications = record
        .map(|r| r.current_medications.clone())
        .unwrap_or_default();
    let next_steps = recommend_next_steps(
        emergency_flag,
        incomplete_info,
        !extracted.vital_signs.is_empty(),
        !current_medications.is_empty(),
    );

    IntakeData {
        patient_id: state
            .resolve_patient_id()
            .unwrap_or_else(|| "unknown".to_string()),
        name: name.unwrap_or_else(|| "Unknown".to_string()),
        age,
        gender: record.map(|r| r.gender.clone()),
        current_symptoms: extracted.symptoms,
        reported_pain_level: extracted.pain_level,
        chief_complaint,
        medical_history: record.map(|r| r.medical_history.clone()).unwrap_or_default(),
        allergies: record.map(|r| r.allergies.clone()).unwrap_or_default(),
        current_medications,
        vital_signs: extracted.vital_signs,
        emergency_contact: record.map(|r| r.emergency_contact.clone()),
        timestamp: Utc::now(),
        emergency_flag,
        non_medical,
        incomplete_info,
        confidence_score,
        next_steps,
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

fn is_emergency(symptoms: &[String], chief_complaint: Option<&str>) -> bool {
    let mut haystack = symptoms.join(" ").to_lowercase();
    if let Some(complaint) = chief_complaint {
        haystack.push(' ');
        haystack.push_str(&complaint.to_lowercase());
    }
    contains_any(&haystack, EMERGENCY_KEYWORDS)
}

fn recommend_next_steps(
    emergency: bool,
    incomplete: bool,
    has_vitals: bool,
    has_medications: bool,
) -> Vec<String> {
    let mut steps = Vec::new();
    if emergency {
        steps.push("immediate_medical_attention");
        steps.push("notify_emergency_team");
    } else if incomplete {
        steps.push("collect_additional_information");
    } else {
        steps.push("proceed_to_triage");
    }
    if has_vitals {
        steps.push("review_vital_signs");
    }
    if has_medications {
        steps.push("check_medication_interactions");
    }
    steps.into_iter().map(String::from).collect()
}
