// SPDX-License-Identifier: MIT

//! Runtime state storage and merge rules for workflow execution

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::records::{
    ExtractedInfo, IntakeData, Message, PatientInfo, PatientRecord, TriageDecision,
};

/// The record threaded through every node of a run.
///
/// `messages` and `errors` accumulate: merging appends to them. Every other
/// field is overwritten whenever a partial update carries it.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct WorkflowState {
    /// Conversation history
    pub messages: Vec<Message>,
    pub patient_id: Option<String>,
    pub patient_info: Option<PatientInfo>,

    /// Per-stage outputs
    pub extracted_info: Option<ExtractedInfo>,
    pub patient_record: Option<PatientRecord>,
    pub intake_completed: Option<bool>,
    pub intake_data: Option<IntakeData>,
    pub triage_completed: Option<bool>,
    pub triage_decision: Option<TriageDecision>,

    /// Routing hints
    pub last_node: Option<String>,
    pub next_agent: Option<String>,
    pub workflow_step: Option<String>,

    /// Recoverable problems reported by nodes
    pub errors: Vec<String>,
    pub retry_count: u32,

    /// Open extension map for data without a typed field
    pub context: HashMap<String, Value>,
}

/// Partial update returned by a node. `Some` means present.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StateUpdate {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_info: Option<PatientInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_info: Option<ExtractedInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_record: Option<PatientRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intake_completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intake_data: Option<IntakeData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triage_completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triage_decision: Option<TriageDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_step: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<HashMap<String, Value>>,
}

impl StateUpdate {
    /// An update that changes nothing
    pub fn none() -> Self {
        Self::default()
    }

    /// An update that only records a recoverable error
    pub fn with_error(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
            ..Self::default()
        }
    }

    /// True when merging this update changes nothing
    pub fn is_empty(&self) -> bool {
        self.field_names().is_empty()
    }

    /// Names of the fields this update carries, in declaration order
    pub fn field_names(&self) -> Vec<&'static str> {
        let present = [
            ("messages", !self.messages.is_empty()),
            ("patient_id", self.patient_id.is_some()),
            ("patient_info", self.patient_info.is_some()),
            ("extracted_info", self.extracted_info.is_some()),
            ("patient_record", self.patient_record.is_some()),
            ("intake_completed", self.intake_completed.is_some()),
            ("intake_data", self.intake_data.is_some()),
            ("triage_completed", self.triage_completed.is_some()),
            ("triage_decision", self.triage_decision.is_some()),
            ("last_node", self.last_node.is_some()),
            ("next_agent", self.next_agent.is_some()),
            ("workflow_step", self.workflow_step.is_some()),
            ("errors", !self.errors.is_empty()),
            ("retry_count", self.retry_count.is_some()),
            ("context", self.context.is_some()),
        ];
        present
            .into_iter()
            .filter(|(_, p)| *p)
            .map(|(name, _)| name)
            .collect()
    }
}

fn overwrite<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn changed<T: Clone + PartialEq>(current: &Option<T>, base: &Option<T>) -> Option<T> {
    if current != base {
        current.clone()
    } else {
        None
    }
}

fn appended<T: Clone>(current: &[T], base: &[T]) -> Vec<T> {
    current.get(base.len()..).map(<[T]>::to_vec).unwrap_or_default()
}

impl WorkflowState {
    /// Create an empty WorkflowState
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a partial update in place
    pub fn apply(&mut self, update: StateUpdate) {
        self.messages.extend(update.messages);
        overwrite(&mut self.patient_id, update.patient_id);
        overwrite(&mut self.patient_info, update.patient_info);
        overwrite(&mut self.extracted_info, update.extracted_info);
        overwrite(&mut self.patient_record, update.patient_record);
        overwrite(&mut self.intake_completed, update.intake_completed);
        overwrite(&mut self.intake_data, update.intake_data);
        overwrite(&mut self.triage_completed, update.triage_completed);
        overwrite(&mut self.triage_decision, update.triage_decision);
        overwrite(&mut self.last_node, update.last_node);
        overwrite(&mut self.next_agent, update.next_agent);
        overwrite(&mut self.workflow_step, update.workflow_step);
        self.errors.extend(update.errors);
        if let Some(count) = update.retry_count {
            self.retry_count = count;
        }
        if let Some(context) = update.context {
            self.context = context;
        }
    }

    /// Return a new state with `update` merged in, leaving `self` untouched
    pub fn merge(&self, update: StateUpdate) -> Self {
        let mut next = self.clone();
        next.apply(update);
        next
    }

    /// The partial update that turns `base` into `self`.
    ///
    /// Accumulating fields yield only the entries appended after `base`;
    /// other fields are included when they differ from `base`.
    pub fn delta_since(&self, base: &WorkflowState) -> StateUpdate {
        StateUpdate {
            messages: appended(&self.messages, &base.messages),
            patient_id: changed(&self.patient_id, &base.patient_id),
            patient_info: changed(&self.patient_info, &base.patient_info),
            extracted_info: changed(&self.extracted_info, &base.extracted_info),
            patient_record: changed(&self.patient_record, &base.patient_record),
            intake_completed: changed(&self.intake_completed, &base.intake_completed),
            intake_data: changed(&self.intake_data, &base.intake_data),
            triage_completed: changed(&self.triage_completed, &base.triage_completed),
            triage_decision: changed(&self.triage_decision, &base.triage_decision),
            last_node: changed(&self.last_node, &base.last_node),
            next_agent: changed(&self.next_agent, &base.next_agent),
            workflow_step: changed(&self.workflow_step, &base.workflow_step),
            errors: appended(&self.errors, &base.errors),
            retry_count: (self.retry_count != base.retry_count).then_some(self.retry_count),
            context: (self.context != base.context).then(|| self.context.clone()),
        }
    }

    /// Patient id from the explicit field, the caller's patient info, or
    /// the context map, in that order
    pub fn resolve_patient_id(&self) -> Option<String> {
        self.patient_id
            .clone()
            .or_else(|| {
                self.patient_info
                    .as_ref()
                    .and_then(|info| info.patient_id.clone())
            })
            .or_else(|| {
                self.context
                    .get("patient_id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
            .filter(|id| !id.trim().is_empty())
    }

    /// Content of the most recent conversation entry
    pub fn last_message(&self) -> Option<&str> {
        self.messages.last().map(|m| m.content.as_str())
    }

    pub fn is_intake_completed(&self) -> bool {
        self.intake_completed.unwrap_or(false)
    }

    pub fn is_triage_completed(&self) -> bool {
        self.triage_completed.unwrap_or(false)
    }

    /// Convert state to a JSON object
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_state() -> WorkflowState {
        WorkflowState {
            messages: vec![Message::human("first")],
            patient_id: Some("P001".into()),
            last_node: Some("intake".into()),
            errors: vec!["e0".into()],
            ..WorkflowState::default()
        }
    }

    #[test]
    fn test_empty_state() {
        let state = WorkflowState::new();
        assert!(state.messages.is_empty());
        assert!(state.patient_id.is_none());
        assert_eq!(state.retry_count, 0);
        assert!(!state.is_intake_completed());
    }

    #[test]
    fn test_absent_fields_untouched() {
        let state = base_state();
        let merged = state.merge(StateUpdate {
            workflow_step: Some("init".into()),
            ..StateUpdate::default()
        });
        assert_eq!(merged.patient_id.as_deref(), Some("P001"));
        assert_eq!(merged.last_node.as_deref(), Some("intake"));
        assert_eq!(merged.messages.len(), 1);
        assert_eq!(merged.workflow_step.as_deref(), Some("init"));
    }

    #[test]
    fn test_overwrite_with_falsy_value() {
        let mut state = base_state();
        state.intake_completed = Some(true);
        state.retry_count = 2;
        state.context.insert("k".into(), json!(1));

        let merged = state.merge(StateUpdate {
            intake_completed: Some(false),
            patient_id: Some(String::new()),
            retry_count: Some(0),
            context: Some(HashMap::new()),
            ..StateUpdate::default()
        });
        assert_eq!(merged.intake_completed, Some(false));
        assert_eq!(merged.patient_id.as_deref(), Some(""));
        assert_eq!(merged.retry_count, 0);
        assert!(merged.context.is_empty());
    }

    #[test]
    fn test_merge_does_not_touch_base() {
        let state = base_state();
        let _ = state.merge(StateUpdate {
            messages: vec![Message::ai("second")],
            patient_id: Some("P002".into()),
            ..StateUpdate::default()
        });
        assert_eq!(state, base_state());
    }

    #[test]
    fn test_overwrite_merge_is_idempotent() {
        let state = base_state();
        let update = StateUpdate {
            patient_id: Some("P003".into()),
            intake_completed: Some(true),
            retry_count: Some(4),
            ..StateUpdate::default()
        };
        let once = state.merge(update.clone());
        let twice = once.merge(update);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_errors_accumulate_in_order() {
        let state = base_state();
        let p1 = StateUpdate {
            errors: vec!["a".into(), "b".into()],
            ..StateUpdate::default()
        };
        let p2 = StateUpdate {
            errors: vec!["b".into(), "c".into()],
            ..StateUpdate::default()
        };
        let merged = state.merge(p1).merge(p2);
        assert_eq!(merged.errors, vec!["e0", "a", "b", "b", "c"]);
    }

    #[test]
    fn test_messages_accumulate() {
        let merged = base_state().merge(StateUpdate {
            messages: vec![Message::ai("reply")],
            ..StateUpdate::default()
        });
        assert_eq!(
            merged.messages,
            vec![Message::human("first"), Message::ai("reply")]
        );
    }

    #[test]
    fn test_delta_since_roundtrip() {
        let base = base_state();
        let mut after = base.clone();
        after.messages.push(Message::ai("note"));
        after.errors.push("late".into());
        after.intake_completed = Some(true);
        after.retry_count = 1;

        let delta = after.delta_since(&base);
        assert_eq!(delta.messages, vec![Message::ai("note")]);
        assert_eq!(delta.errors, vec!["late".to_string()]);
        assert!(delta.patient_id.is_none());
        assert_eq!(delta.retry_count, Some(1));
        assert_eq!(base.merge(delta), after);
    }

    #[test]
    fn test_field_names() {
        let update = StateUpdate {
            last_node: Some("x".into()),
            errors: vec!["oops".into()],
            ..StateUpdate::default()
        };
        assert_eq!(update.field_names(), vec!["last_node", "errors"]);
        assert!(StateUpdate::none().is_empty());
        assert_eq!(StateUpdate::with_error("e").errors, vec!["e".to_string()]);
    }

    #[test]
    fn test_resolve_patient_id_order() {
        let mut state = WorkflowState::new();
        assert!(state.resolve_patient_id().is_none());

        state.context.insert("patient_id".into(), json!("P003"));
        assert_eq!(state.resolve_patient_id().as_deref(), Some("P003"));

        state.patient_info = Some(PatientInfo {
            patient_id: Some("P002".into()),
            ..PatientInfo::default()
        });
        assert_eq!(state.resolve_patient_id().as_deref(), Some("P002"));

        state.patient_id = Some("P001".into());
        assert_eq!(state.resolve_patient_id().as_deref(), Some("P001"));
    }

    #[test]
    fn test_update_deserializes_from_partial_json() {
        let update: StateUpdate = serde_json::from_value(json!({
            "messages": [{"role": "human", "content": "hi"}],
            "patient_id": "P001"
        }))
        .unwrap();
        assert_eq!(update.field_names(), vec!["messages", "patient_id"]);
    }

    #[test]
    fn test_to_json() {
        let json = base_state().to_json();
        assert_eq!(json["patient_id"], "P001");
        assert_eq!(json["errors"][0], "e0");
    }
}
