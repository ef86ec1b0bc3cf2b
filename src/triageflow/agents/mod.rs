// SPDX-License-Identifier: MIT

//! Agents plugged into the triage graphs
//!
//! Patient lookup, conversation extraction, the intake subgraph and triage
//! decision makers.

pub mod extract;
pub mod intake;
pub mod patients;
pub mod triage;

pub use extract::{ConversationExtractor, KeywordExtractor, LlmExtractor};
pub use intake::IntakeAgent;
pub use patients::{MockPatientStore, PatientStore, YamlPatientStore};
pub use triage::{ModelTriage, RuleBasedTriage, TriageAgent, TriageNode};
