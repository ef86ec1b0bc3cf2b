// SPDX-License-Identifier: MIT

//! HTTP façade over a shared [`TriageWorkflow`]

use axum::{
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::adk::error::BoxError;
use crate::triageflow::graphs::{RunStatus, TriageWorkflow, WorkflowStatus};
use crate::triageflow::workflow::state::{PatientInfo, StateUpdate};

const FRONTEND_ORIGIN: &str = "http://localhost:3000";

#[derive(Clone)]
pub struct AppState {
    workflow: Arc<TriageWorkflow>,
}

/// Failure answered as `{"detail": ...}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

/// Either a `conversation` transcript or structured `patient_info` with
/// symptom, history and medication lists
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StartRequest {
    conversation: Option<String>,
    patient_id: Option<String>,
    thread_id: Option<String>,
    patient_info: Option<PatientInfo>,
    symptoms: Vec<String>,
    history: Vec<String>,
    medications: Vec<String>,
}

impl StartRequest {
    fn thread_id(&self) -> String {
        self.thread_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }

    fn into_input(self) -> Result<StateUpdate, ApiError> {
        if let Some(conversation) = self.conversation.filter(|c| !c.trim().is_empty()) {
            let mut input = TriageWorkflow::initial_input(&conversation, self.patient_id.as_deref());
            if let Some(info) = self.patient_info {
                if input.patient_id.is_none() {
                    input.patient_id = info.patient_id.clone();
                }
                input.patient_info = Some(info);
            }
            return Ok(input);
        }

        let structured = self.patient_info.is_some()
            || !self.symptoms.is_empty()
            || !self.history.is_empty()
            || !self.medications.is_empty();
        if !structured {
            return Err(ApiError::internal(
                "Workflow execution failed: request needs a conversation or patient_info with symptoms",
            ));
        }

        let mut info = self.patient_info.unwrap_or_default();
        if info.patient_id.is_none() {
            info.patient_id = self.patient_id;
        }
        Ok(TriageWorkflow::structured_input(
            Some(info),
            &self.symptoms,
            &self.history,
            &self.medications,
        ))
    }
}

pub fn router(workflow: Arc<TriageWorkflow>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static(FRONTEND_ORIGIN))
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/agents/workflow/start", post(start_workflow))
        .route("/api/agents/workflow/stream", post(stream_workflow))
        .route(
            "/api/agents/workflow/status/{thread_id}",
            get(workflow_status),
        )
        .with_state(AppState { workflow })
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn serve(port: u16, workflow: Arc<TriageWorkflow>) -> Result<(), BoxError> {
    let app = router(workflow);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "triageflow" }))
}

async fn start_workflow(
    State(state): State<AppState>,
    Json(payload): Json<StartRequest>,
) -> Result<Json<Value>, ApiError> {
    let thread_id = payload.thread_id();
    log::info!("Starting workflow on thread {}", thread_id);
    let input = payload.into_input()?;

    let previous = state
        .workflow
        .status(&thread_id)
        .await
        .map_err(|e| ApiError::internal(format!("Workflow execution failed: {}", e)))?;
    let already_completed = previous.status == RunStatus::Completed;
    if already_completed {
        log::warn!(
            "Thread {} already completed; the result reflects its earlier encounter",
            thread_id
        );
    }

    match state.workflow.run(input, Some(&thread_id)).await {
        Ok(result) => Ok(Json(json!({
            "status": "completed",
            "thread_id": thread_id,
            "already_completed": already_completed,
            "result": result,
        }))),
        Err(e) => {
            log::error!("Workflow on thread {} failed: {}", thread_id, e);
            Err(ApiError::internal(format!("Workflow execution failed: {}", e)))
        }
    }
}

async fn workflow_status(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<WorkflowStatus>, ApiError> {
    state
        .workflow
        .status(&thread_id)
        .await
        .map(Json)
        .map_err(|e| ApiError::internal(format!("Failed to read workflow status: {}", e)))
}

async fn stream_workflow(
    State(state): State<AppState>,
    Json(payload): Json<StartRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let (tx, rx) = mpsc::channel(100);
    let thread_id = payload.thread_id();
    let input = payload.into_input()?;

    tokio::spawn(async move {
        log::info!("Starting streaming workflow on thread {}", thread_id);
        if let Err(e) = state.workflow.run_stream(input, Some(&thread_id), tx).await {
            log::error!("Streaming workflow on thread {} failed: {}", thread_id, e);
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        Ok(Event::default()
            .json_data(&event)
            .unwrap_or_else(|e| Event::default().event("error").data(e.to_string())))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(1))))
}
