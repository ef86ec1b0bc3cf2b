// SPDX-License-Identifier: MIT

//! Triage agent
//!
//! Assigns an ESI-style priority (1 most urgent, 5 least) to compiled intake
//! data. [`RuleBasedTriage`] walks fixed decision points; [`ModelTriage`]
//! asks a [`Model`] to reason through them and answer as JSON.

use crate::adk::error::{BoxError, ModelError};
use crate::adk::model::{extract_json_block, Content, GenerationConfig, Model};
use crate::triageflow::workflow::graph::Node;
use crate::triageflow::workflow::state::{IntakeData, StateUpdate, TriageDecision, WorkflowState};
use async_trait::async_trait;
use std::sync::Arc;

/// Produces a triage decision from intake data
#[async_trait]
pub trait TriageAgent: Send + Sync {
    async fn decide(&self, intake: &IntakeData) -> Result<TriageDecision, BoxError>;
}

/// Deterministic decision points over symptoms, pain, vitals and age
#[derive(Clone, Copy, Debug, Default)]
pub struct RuleBasedTriage;

impl RuleBasedTriage {
    pub fn assess(&self, intake: &IntakeData) -> TriageDecision {
        let mut findings = Vec::new();
        let pain = intake.reported_pain_level.unwrap_or(0);
        let temperature = intake.vital_signs.temperature;
        let systolic = intake
            .vital_signs
            .blood_pressure
            .as_deref()
            .and_then(|bp| bp.split('/').next())
            .and_then(|s| s.trim().parse::<u32>().ok());

        let level = if intake.emergency_flag {
            findings.push("emergency indicators reported".to_string());
            1
        } else if pain >= 7
            || temperature.is_some_and(|t| t >= 39.5)
            || systolic.is_some_and(|s| s >= 180)
        {
            if pain >= 7 {
                findings.push(format!("severe pain ({}/10)", pain));
            }
            if let Some(t) = temperature.filter(|t| *t >= 39.5) {
                findings.push(format!("high fever ({:.1})", t));
            }
            if let Some(s) = systolic.filter(|s| *s >= 180) {
                findings.push(format!("systolic pressure {}", s));
            }
            2
        } else if intake.current_symptoms.len() >= 2
            || pain >= 4
            || (intake.age.is_some_and(|a| a >= 65) && !intake.current_symptoms.is_empty())
        {
            findings.push(format!(
                "{} symptom(s), pain {}/10",
                intake.current_symptoms.len(),
                pain
            ));
            if intake.age.is_some_and(|a| a >= 65) {
                findings.push("age 65 or older".to_string());
            }
            3
        } else if !intake.current_symptoms.is_empty() {
            findings.push(format!("single symptom: {}", intake.current_symptoms[0]));
            4
        } else {
            findings.push("no acute symptoms reported".to_string());
            5
        };

        if !intake.medical_history.is_empty() {
            findings.push(format!("history of {}", intake.medical_history.join(", ")));
        }

        let (actions, wait): (&[&str], u32) = match level {
            1 => (&["immediate_assessment", "notify_emergency_team"][..], 0),
            2 => (&["immediate_assessment", "order_tests"][..], 10),
            3 => (&["nurse_assessment", "order_tests"][..], 30),
            4 => (&["nurse_assessment"][..], 60),
            _ => (&["routine_follow_up"][..], 120),
        };

        TriageDecision {
            priority_level: level,
            reasoning: format!(
                "Based on symptoms and medical history: {}",
                findings.join("; ")
            ),
            recommended_actions: actions.iter().map(|a| a.to_string()).collect(),
            estimated_wait_time: Some(wait),
        }
    }
}

#[async_trait]
impl TriageAgent for RuleBasedTriage {
    async fn decide(&self, intake: &IntakeData) -> Result<TriageDecision, BoxError> {
        Ok(self.assess(intake))
    }
}

const TRIAGE_INSTRUCTION: &str = "You are an emergency department triage nurse. Walk through \
the Emergency Severity Index decision points using the patient's symptoms, history and vital \
signs, then answer with a single JSON object and nothing else: {\"priority_level\": 1-5 \
(1 is most urgent), \"reasoning\": string, \"recommended_actions\": [string], \
\"estimated_wait_time\": minutes or null}.";

/// Triage backed by a completion model
pub struct ModelTriage {
    model: Arc<dyn Model>,
    config: GenerationConfig,
}

impl ModelTriage {
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
impl TriageAgent for ModelTriage {
    async fn decide(&self, intake: &IntakeData) -> Result<TriageDecision, BoxError> {
        let history = vec![
            Content {
                role: "system".to_string(),
                ..Content::user(TRIAGE_INSTRUCTION)
            },
            Content::user(serde_json::to_string_pretty(intake)?),
        ];
        let response = self
            .model
            .generate_content(&history, Some(&self.config))
            .await?;
        let text = response.text();

        let value = extract_json_block(&text).ok_or_else(|| {
            ModelError::InvalidResponse(format!("no JSON object in triage answer: {}", text))
        })?;
        let decision: TriageDecision = serde_json::from_value(value)
            .map_err(|e| ModelError::InvalidResponse(format!("bad triage JSON: {}", e)))?;
        if !decision.is_valid() {
            return Err(ModelError::InvalidResponse(format!(
                "priority level {} outside 1-5",
                decision.priority_level
            ))
            .into());
        }
        Ok(decision)
    }
}

/// Graph node running a [`TriageAgent`] on the state's intake data.
///
/// Agent failures are recorded in `errors` and bump `retry_count`; routing
/// decides whether to try again.
pub struct TriageNode {
    agent: Arc<dyn TriageAgent>,
}

impl TriageNode {
    pub fn new(agent: Arc<dyn TriageAgent>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl Node for TriageNode {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, BoxError> {
        let attempt = state.retry_count + 1;
        let result = match &state.intake_data {
            Some(intake) => self.agent.decide(intake).await,
            None => Err("no intake data to triage".into()),
        };

        match result {
            Ok(decision) => {
                log::info!(
                    "Triage priority {} (wait {:?} min)",
                    decision.priority_level,
                    decision.estimated_wait_time
                );
                Ok(StateUpdate {
                    triage_completed: Some(true),
                    triage_decision: Some(decision),
                    ..StateUpdate::default()
                })
            }
            Err(e) => {
                log::warn!("Triage attempt {} failed: {}", attempt, e);
                Ok(StateUpdate {
                    retry_count: Some(attempt),
                    ..StateUpdate::with_error(format!("Triage attempt {} failed: {}", attempt, e))
                })
            }
        }
    }
}
