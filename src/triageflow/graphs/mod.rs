// SPDX-License-Identifier: MIT

//! Concrete triage graphs built on the workflow engine

pub mod main_graph;
pub mod specialized;

pub use main_graph::{
    base_spec, checkpointer_for, route_next_step, RunStatus, TriageWorkflow, WorkflowDeps,
    WorkflowStatus,
};
pub use specialized::patient_specific_spec;
