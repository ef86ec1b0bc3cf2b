// SPDX-License-Identifier: MIT

//! State management for graph workflows
//!
//! This module provides:
//! - `WorkflowState` - the typed record threaded through a run
//! - `StateUpdate` - the partial update a node returns
//! - value objects produced by the agents (`PatientRecord`, `IntakeData`, ...)

mod records;
mod store;

pub use records::{
    ExtractedInfo, IntakeData, Message, PatientInfo, PatientRecord, Role, TriageDecision,
    VitalSigns,
};
pub use store::{StateUpdate, WorkflowState};
