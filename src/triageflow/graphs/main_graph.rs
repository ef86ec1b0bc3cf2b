// SPDX-License-Identifier: MIT

//! Main orchestration graph
//!
//! A supervisor node routes between the intake subgraph, the triage node and
//! three terminal outcomes:
//!
//! ```text
//! supervisor -> intake -> supervisor -> triage -> supervisor -> END
//!            \-> emergency_redirect | additional_info_required | triage_failed -> END
//! ```

use crate::adk::error::{BoxError, GraphError, TriageError};
use crate::adk::model::gemini::GeminiModel;
use crate::adk::model::{GenerationConfig, Model};
use crate::triageflow::agents::{
    ConversationExtractor, IntakeAgent, KeywordExtractor, LlmExtractor, MockPatientStore,
    ModelTriage, PatientStore, RuleBasedTriage, TriageAgent, TriageNode, YamlPatientStore,
};
use crate::triageflow::workflow::checkpoint::{
    Checkpointer, FileCheckpointer, InMemoryCheckpointer,
};
use crate::triageflow::workflow::config::{
    ExecutionConfig, ExtractorKind, MemoryType, TriageKind, WorkflowConfig,
};
use crate::triageflow::workflow::graph::{
    node_fn, CompiledGraph, GraphSpec, Node, StepEvent, END,
};
use crate::triageflow::workflow::state::{Message, PatientInfo, StateUpdate, WorkflowState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

pub const SUPERVISOR: &str = "supervisor";
pub const INTAKE: &str = "intake";
pub const TRIAGE: &str = "triage";
pub const EMERGENCY_REDIRECT: &str = "emergency_redirect";
pub const ADDITIONAL_INFO_REQUIRED: &str = "additional_info_required";
pub const TRIAGE_FAILED: &str = "triage_failed";

/// Collaborators the triage graphs are assembled from
#[derive(Clone)]
pub struct WorkflowDeps {
    pub extractor: Arc<dyn ConversationExtractor>,
    pub patients: Arc<dyn PatientStore>,
    pub triage: Arc<dyn TriageAgent>,
    /// Triage attempts before the run gives up
    pub max_retries: u32,
}

impl Default for WorkflowDeps {
    fn default() -> Self {
        Self {
            extractor: Arc::new(KeywordExtractor),
            patients: Arc::new(MockPatientStore),
            triage: Arc::new(RuleBasedTriage),
            max_retries: 3,
        }
    }
}

impl WorkflowDeps {
    pub fn with_triage(mut self, triage: Arc<dyn TriageAgent>) -> Self {
        self.triage = triage;
        self
    }

    pub fn with_patients(mut self, patients: Arc<dyn PatientStore>) -> Self {
        self.patients = patients;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Pick extractor, triage agent and patient store as configured
    pub fn from_config(config: &WorkflowConfig) -> Result<Self, TriageError> {
        let model: Option<Arc<dyn Model>> = if config.uses_model() {
            let gemini = GeminiModel::new(&config.model_name, &config.gemini_api_key)?
                .with_defaults(GenerationConfig {
                    temperature: Some(config.temperature),
                    max_output_tokens: Some(config.max_tokens),
                    json_output: true,
                });
            log::info!("Using model '{}'", config.model_name);
            Some(Arc::new(gemini))
        } else {
            None
        };

        let extractor: Arc<dyn ConversationExtractor> = match (config.extractor, &model) {
            (ExtractorKind::Llm, Some(model)) => Arc::new(LlmExtractor::new(model.clone())),
            _ => Arc::new(KeywordExtractor),
        };
        let triage: Arc<dyn TriageAgent> = match (config.triage, &model) {
            (TriageKind::Llm, Some(model)) => Arc::new(ModelTriage::new(model.clone())),
            _ => Arc::new(RuleBasedTriage),
        };
        let patients: Arc<dyn PatientStore> = match &config.patients_file {
            Some(path) => Arc::new(YamlPatientStore::from_file(path)?),
            None => Arc::new(MockPatientStore),
        };

        Ok(Self {
            extractor,
            patients,
            triage,
            max_retries: config.max_retries,
        })
    }

    pub fn intake_agent(&self) -> IntakeAgent {
        IntakeAgent::new(self.extractor.clone(), self.patients.clone())
    }
}

/// Next node for the supervisor. Pure function of the state.
pub fn route_next_step(state: &WorkflowState, max_retries: u32) -> String {
    if state.is_triage_completed() {
        return END.to_string();
    }
    if !state.is_intake_completed() {
        return INTAKE.to_string();
    }

    let next = match &state.intake_data {
        Some(intake) if intake.emergency_flag => EMERGENCY_REDIRECT,
        Some(intake) if intake.non_medical => END,
        Some(intake) if intake.incomplete_info => ADDITIONAL_INFO_REQUIRED,
        None => ADDITIONAL_INFO_REQUIRED,
        Some(_) if state.retry_count >= max_retries => TRIAGE_FAILED,
        Some(_) => TRIAGE,
    };
    next.to_string()
}

/// The intake subgraph as one node, reporting itself as the last node run
pub(crate) fn intake_node(deps: &WorkflowDeps) -> Result<impl Node, GraphError> {
    Ok(deps.intake_agent().node()?.with_projection(|mut update| {
        update.last_node = Some(INTAKE.to_string());
        update
    }))
}

pub(crate) fn triage_node(deps: &WorkflowDeps) -> impl Node {
    let triage = Arc::new(TriageNode::new(deps.triage.clone()));
    node_fn(move |state: WorkflowState| {
        let triage = triage.clone();
        async move {
            let mut update = triage.run(&state).await?;
            update.last_node = Some(TRIAGE.to_string());
            Ok::<_, BoxError>(update)
        }
    })
}

async fn emergency_redirect(_state: WorkflowState) -> Result<StateUpdate, BoxError> {
    log::warn!("Emergency indicators found, redirecting");
    Ok(StateUpdate {
        messages: vec![Message::ai(
            "Emergency indicators detected. Redirecting to emergency care immediately.",
        )],
        last_node: Some(EMERGENCY_REDIRECT.to_string()),
        next_agent: Some("emergency_care".to_string()),
        ..StateUpdate::default()
    })
}

async fn additional_info_required(state: WorkflowState) -> Result<StateUpdate, BoxError> {
    let mut missing = Vec::new();
    match &state.intake_data {
        Some(intake) => {
            if intake.current_symptoms.is_empty() {
                missing.push("current symptoms");
            }
            if intake.chief_complaint.is_none() {
                missing.push("chief complaint");
            }
        }
        None => missing.push("intake data"),
    }
    log::info!("Intake incomplete, missing {:?}", missing);
    Ok(StateUpdate {
        messages: vec![Message::ai(format!(
            "Additional information required: {}.",
            missing.join(", ")
        ))],
        last_node: Some(ADDITIONAL_INFO_REQUIRED.to_string()),
        ..StateUpdate::default()
    })
}

async fn triage_failed(state: WorkflowState) -> Result<StateUpdate, BoxError> {
    let message = format!("Triage failed after {} attempts", state.retry_count);
    log::error!("{}", message);
    Ok(StateUpdate {
        messages: vec![Message::ai(format!(
            "{}. A clinician will assess the patient manually.",
            message
        ))],
        last_node: Some(TRIAGE_FAILED.to_string()),
        ..StateUpdate::with_error(message)
    })
}

/// Nodes and edges shared by every triage graph
pub fn base_spec(deps: &WorkflowDeps) -> Result<GraphSpec, GraphError> {
    let max_retries = deps.max_retries;

    Ok(GraphSpec::new("triage_workflow")
        .add_node(
            SUPERVISOR,
            node_fn(move |state: WorkflowState| async move {
                Ok::<_, BoxError>(StateUpdate {
                    next_agent: Some(route_next_step(&state, max_retries)),
                    ..StateUpdate::default()
                })
            }),
        )
        .add_node(INTAKE, intake_node(deps)?)
        .add_node(TRIAGE, triage_node(deps))
        .add_node(EMERGENCY_REDIRECT, node_fn(emergency_redirect))
        .add_node(ADDITIONAL_INFO_REQUIRED, node_fn(additional_info_required))
        .add_node(TRIAGE_FAILED, node_fn(triage_failed))
        .set_entry(SUPERVISOR)
        .add_conditional_edges(SUPERVISOR, move |state| {
            route_next_step(state, max_retries)
        })
        .add_edge(INTAKE, SUPERVISOR)
        .add_edge(TRIAGE, SUPERVISOR)
        .add_edge(EMERGENCY_REDIRECT, END)
        .add_edge(ADDITIONAL_INFO_REQUIRED, END)
        .add_edge(TRIAGE_FAILED, END))
}

/// Where a thread stands according to its latest checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Interrupted,
    NotFound,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStatus {
    pub thread_id: String,
    pub status: RunStatus,
    /// Last node that ran
    pub current_step: Option<String>,
    /// Node a resumed run would start with
    pub next_step: Option<String>,
    pub steps: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A compiled triage graph with its checkpoint store
pub struct TriageWorkflow {
    graph: CompiledGraph,
}

impl TriageWorkflow {
    /// Compile the supervisor graph
    pub fn new(
        deps: &WorkflowDeps,
        checkpointer: Arc<dyn Checkpointer>,
        config: ExecutionConfig,
    ) -> Result<Self, GraphError> {
        Self::from_spec(
            base_spec(deps)?
                .with_checkpointer(checkpointer)
                .with_config(config),
        )
    }

    /// Compile any triage graph variant
    pub fn from_spec(spec: GraphSpec) -> Result<Self, GraphError> {
        Ok(Self {
            graph: spec.compile()?,
        })
    }

    /// Build the supervisor graph with collaborators and storage chosen by
    /// `config`
    pub fn from_config(config: &WorkflowConfig) -> Result<Self, TriageError> {
        let deps = WorkflowDeps::from_config(config)?;
        Ok(Self::new(&deps, checkpointer_for(config), config.execution())?)
    }

    pub fn graph(&self) -> &CompiledGraph {
        &self.graph
    }

    /// Initial update for a new encounter
    pub fn initial_input(conversation: &str, patient_id: Option<&str>) -> StateUpdate {
        let patient_id = patient_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        StateUpdate {
            messages: vec![Message::human(conversation)],
            patient_info: patient_id.clone().map(|id| PatientInfo {
                patient_id: Some(id),
                ..PatientInfo::default()
            }),
            patient_id,
            ..StateUpdate::default()
        }
    }

    /// Initial update for an encounter described by structured fields
    /// instead of a transcript. The lists are folded into `patient_info` and
    /// rendered as a single patient statement for the intake extractor.
    pub fn structured_input(
        patient_info: Option<PatientInfo>,
        symptoms: &[String],
        history: &[String],
        medications: &[String],
    ) -> StateUpdate {
        let mut info = patient_info.unwrap_or_default();
        info.patient_id = info
            .patient_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        extend_unique(&mut info.current_symptoms, symptoms);
        extend_unique(&mut info.medical_history, history);
        extend_unique(&mut info.current_medications, medications);

        let mut lines = Vec::new();
        if !info.current_symptoms.is_empty() {
            lines.push(format!("Patient reports: {}.", info.current_symptoms.join(", ")));
        }
        if !info.medical_history.is_empty() {
            lines.push(format!("History: {}.", info.medical_history.join(", ")));
        }
        if !info.current_medications.is_empty() {
            lines.push(format!(
                "Medications: {}.",
                info.current_medications.join(", ")
            ));
        }

        StateUpdate {
            messages: if lines.is_empty() {
                Vec::new()
            } else {
                vec![Message::human(lines.join(" "))]
            },
            patient_id: info.patient_id.clone(),
            patient_info: Some(info),
            ..StateUpdate::default()
        }
    }

    pub async fn run(
        &self,
        input: StateUpdate,
        thread_id: Option<&str>,
    ) -> Result<WorkflowState, GraphError> {
        self.graph.run(input, thread_id).await
    }

    pub async fn run_stream(
        &self,
        input: StateUpdate,
        thread_id: Option<&str>,
        events: mpsc::Sender<StepEvent>,
    ) -> Result<WorkflowState, GraphError> {
        self.graph.run_stream(input, thread_id, events).await
    }

    pub async fn status(&self, thread_id: &str) -> Result<WorkflowStatus, GraphError> {
        let status = match self.graph.checkpoint(thread_id).await? {
            Some(checkpoint) => WorkflowStatus {
                thread_id: thread_id.to_string(),
                status: if checkpoint.is_complete() {
                    RunStatus::Completed
                } else {
                    RunStatus::Interrupted
                },
                current_step: checkpoint.state.last_node.clone(),
                next_step: checkpoint.next_node.clone(),
                steps: checkpoint.seq,
                updated_at: Some(checkpoint.created_at),
            },
            None => WorkflowStatus {
                thread_id: thread_id.to_string(),
                status: RunStatus::NotFound,
                current_step: None,
                next_step: None,
                steps: 0,
                updated_at: None,
            },
        };
        Ok(status)
    }
}

/// Checkpoint backend selected by `TRIAGE_MEMORY_TYPE`
pub fn checkpointer_for(config: &WorkflowConfig) -> Arc<dyn Checkpointer> {
    match &config.memory_type {
        MemoryType::InMemory => Arc::new(InMemoryCheckpointer::new()),
        MemoryType::File(dir) => {
            log::info!("Persisting checkpoints under {:?}", dir);
            Arc::new(FileCheckpointer::new(dir))
        }
    }
}

fn extend_unique(into: &mut Vec<String>, items: &[String]) {
    for item in items.iter().map(|i| i.trim()).filter(|i| !i.is_empty()) {
        if !into.iter().any(|existing| existing == item) {
            into.push(item.to_string());
        }
    }
}
