// SPDX-License-Identifier: MIT

//! Patient-specific workflow
//!
//! Extends the base spec: the supervisor is swapped for a coordinator that
//! walks `workflow_step`, and two nodes are added for emergency protocol
//! activation and specialist referral driven by the patient's known
//! conditions.

use super::main_graph::{
    base_spec, TriageWorkflow, WorkflowDeps, ADDITIONAL_INFO_REQUIRED, EMERGENCY_REDIRECT, INTAKE,
    SUPERVISOR, TRIAGE, TRIAGE_FAILED,
};
use crate::adk::error::{BoxError, GraphError};
use crate::triageflow::workflow::checkpoint::Checkpointer;
use crate::triageflow::workflow::config::ExecutionConfig;
use crate::triageflow::workflow::graph::{GraphSpec, Node, END};
use crate::triageflow::workflow::state::{Message, StateUpdate, WorkflowState};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub const COORDINATOR: &str = "coordinator";
pub const SPECIALIST_REFERRAL: &str = "specialist_referral";
pub const EMERGENCY_PROTOCOL: &str = "emergency_protocol";

/// Coordinator label for finishing the run
const FINISH: &str = "end";

/// Conditions that always warrant a specialist
const SPECIALIST_CONDITIONS: &[&str] = &["diabetes", "heart_disease", "cancer"];

/// Normalise a condition name: "Heart Disease" becomes "heart_disease"
pub fn normalize_condition(condition: &str) -> String {
    condition
        .trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn has_condition(conditions: &[String], name: &str) -> bool {
    conditions.iter().any(|c| c.contains(name))
}

fn mentions_chest_pain(state: &WorkflowState) -> bool {
    state.intake_data.as_ref().is_some_and(|intake| {
        intake
            .chief_complaint
            .as_deref()
            .into_iter()
            .chain(intake.current_symptoms.iter().map(String::as_str))
            .any(|text| text.to_lowercase().contains("chest pain"))
    })
}

/// Specialist matching the patient's conditions
pub fn specialist_type(conditions: &[String], state: &WorkflowState) -> &'static str {
    if has_condition(conditions, "heart_disease") || mentions_chest_pain(state) {
        "cardiologist"
    } else if has_condition(conditions, "diabetes") {
        "endocrinologist"
    } else if has_condition(conditions, "cancer") {
        "oncologist"
    } else {
        "general_specialist"
    }
}

/// Urgent priorities (1 and 2) or a listed condition need a referral
pub fn requires_specialist_referral(conditions: &[String], state: &WorkflowState) -> bool {
    let urgent = state
        .triage_decision
        .as_ref()
        .is_some_and(|d| d.priority_level <= 2);
    urgent
        || SPECIALIST_CONDITIONS
            .iter()
            .any(|name| has_condition(conditions, name))
}

/// Step machine behind the coordinator node.
///
/// Returns the label of the next node and the new `workflow_step`.
pub fn coordinate(
    state: &WorkflowState,
    conditions: &[String],
    max_retries: u32,
) -> (&'static str, &'static str) {
    let step = state.workflow_step.as_deref().unwrap_or("init");
    match step {
        "init" => (INTAKE, "intake_pending"),
        "intake_pending" if state.is_intake_completed() => match &state.intake_data {
            Some(intake) if intake.emergency_flag => (EMERGENCY_PROTOCOL, "emergency_pending"),
            Some(intake) if intake.non_medical => (FINISH, "complete"),
            Some(intake) if !intake.incomplete_info => (TRIAGE, "triage_pending"),
            _ => (ADDITIONAL_INFO_REQUIRED, "info_required"),
        },
        "triage_pending" if state.is_triage_completed() => {
            if requires_specialist_referral(conditions, state) {
                (SPECIALIST_REFERRAL, "referral_pending")
            } else {
                (FINISH, "complete")
            }
        }
        "triage_pending" if state.retry_count < max_retries => (TRIAGE, "triage_pending"),
        "triage_pending" => (TRIAGE_FAILED, "error"),
        "emergency_complete" | "referral_complete" => (FINISH, "complete"),
        other => {
            log::warn!("Coordinator cannot continue from step '{}'", other);
            (FINISH, "error")
        }
    }
}

struct Coordinator {
    conditions: Arc<Vec<String>>,
    max_retries: u32,
}

#[async_trait]
impl Node for Coordinator {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, BoxError> {
        let (next, step) = coordinate(state, &self.conditions, self.max_retries);
        log::debug!("Coordinator: step '{}', next '{}'", step, next);
        Ok(StateUpdate {
            next_agent: Some(next.to_string()),
            workflow_step: Some(step.to_string()),
            ..StateUpdate::default()
        })
    }
}

struct SpecialistReferral {
    conditions: Arc<Vec<String>>,
}

#[async_trait]
impl Node for SpecialistReferral {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, BoxError> {
        let specialist = specialist_type(&self.conditions, state);
        let urgency = match &state.triage_decision {
            Some(decision) => json!(decision.priority_level),
            None => json!("routine"),
        };
        log::info!("Referring patient to {}", specialist);

        let mut context = state.context.clone();
        context.insert(
            "specialist_referral".to_string(),
            json!({
                "specialist_type": specialist,
                "urgency": urgency,
                "referral_notes": format!("Patient requires {} consultation", specialist),
            }),
        );
        Ok(StateUpdate {
            messages: vec![Message::ai(format!("Referral to {} requested.", specialist))],
            last_node: Some(SPECIALIST_REFERRAL.to_string()),
            workflow_step: Some("referral_complete".to_string()),
            context: Some(context),
            ..StateUpdate::default()
        })
    }
}

struct EmergencyProtocol;

#[async_trait]
impl Node for EmergencyProtocol {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, BoxError> {
        log::warn!("Emergency protocol activated");
        let mut context = state.context.clone();
        context.insert("emergency_protocol_activated".to_string(), json!(true));
        context.insert(
            "emergency_actions".to_string(),
            json!([
                "immediate_medical_attention",
                "alert_emergency_team",
                "prepare_emergency_room"
            ]),
        );
        Ok(StateUpdate {
            messages: vec![Message::ai(
                "Emergency protocol activated. The emergency team has been alerted.",
            )],
            last_node: Some(EMERGENCY_PROTOCOL.to_string()),
            workflow_step: Some("emergency_complete".to_string()),
            context: Some(context),
            ..StateUpdate::default()
        })
    }
}

/// The base spec recomposed around a coordinator for a patient with
/// `conditions`
pub fn patient_specific_spec(
    deps: &WorkflowDeps,
    conditions: &[String],
) -> Result<GraphSpec, GraphError> {
    let conditions = Arc::new(
        conditions
            .iter()
            .map(|c| normalize_condition(c))
            .collect::<Vec<_>>(),
    );

    Ok(base_spec(deps)?
        .with_name("patient_specific_workflow")
        .remove_node(SUPERVISOR)
        .remove_node(EMERGENCY_REDIRECT)
        .remove_edges_from(INTAKE)
        .remove_edges_from(TRIAGE)
        .add_node(
            COORDINATOR,
            Coordinator {
                conditions: conditions.clone(),
                max_retries: deps.max_retries,
            },
        )
        .add_node(SPECIALIST_REFERRAL, SpecialistReferral { conditions })
        .add_node(EMERGENCY_PROTOCOL, EmergencyProtocol)
        .replace_entry(COORDINATOR)
        .add_conditional_edges_mapped(
            COORDINATOR,
            |state| state.next_agent.clone().unwrap_or_else(|| FINISH.to_string()),
            &[
                (INTAKE, INTAKE),
                (TRIAGE, TRIAGE),
                (SPECIALIST_REFERRAL, SPECIALIST_REFERRAL),
                (EMERGENCY_PROTOCOL, EMERGENCY_PROTOCOL),
                (ADDITIONAL_INFO_REQUIRED, ADDITIONAL_INFO_REQUIRED),
                (TRIAGE_FAILED, TRIAGE_FAILED),
                (FINISH, END),
            ],
        )
        .add_edge(INTAKE, COORDINATOR)
        .add_edge(TRIAGE, COORDINATOR)
        .add_edge(SPECIALIST_REFERRAL, COORDINATOR)
        .add_edge(EMERGENCY_PROTOCOL, COORDINATOR))
}

impl TriageWorkflow {
    /// Compile the patient-specific workflow
    pub fn for_patient(
        deps: &WorkflowDeps,
        conditions: &[String],
        checkpointer: Arc<dyn Checkpointer>,
        config: ExecutionConfig,
    ) -> Result<Self, GraphError> {
        Self::from_spec(
            patient_specific_spec(deps, conditions)?
                .with_checkpointer(checkpointer)
                .with_config(config),
        )
    }
}
