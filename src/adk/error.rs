// SPDX-License-Identifier: MIT

//! Typed error handling for triageflow-rs
//!
//! Build-time graph errors, run-time execution errors, checkpoint errors and
//! model errors all live here so that every layer converts into
//! [`TriageError`] with `?`.

use std::time::Duration;
use thiserror::Error;

/// Boxed error returned by node callables and model clients
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type for triageflow-rs
#[derive(Debug, Error)]
pub enum TriageError {
    /// Graph construction or execution failed
    #[error("Workflow error: {0}")]
    Graph(#[from] GraphError),

    /// Checkpoint persistence failed outside of a run
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Model/LLM errors
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Configuration errors (invalid env values, missing files)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl TriageError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Errors raised while building or running a workflow graph
#[derive(Debug, Error)]
pub enum GraphError {
    /// A node name was registered twice
    #[error("Node '{node}' is already registered")]
    DuplicateNode { node: String },

    /// A node name was referenced but never registered
    #[error("Node '{node}' is not registered")]
    UnknownNode { node: String },

    /// Zero or more than one entry node was configured
    #[error("Graph must have exactly one entry point, found {found}")]
    NoEntryPoint { found: usize },

    /// A node has more than one outgoing dispatch mechanism
    #[error("Node '{node}' has more than one outgoing edge definition")]
    AmbiguousEdge { node: String },

    /// A node callable failed or timed out
    #[error("Node '{node}' failed: {cause}")]
    NodeExecution {
        node: String,
        #[source]
        cause: NodeFailure,
    },

    /// A router returned a label that resolves to no node
    #[error("Node '{node}' routed to unknown target '{label}'")]
    Routing { node: String, label: String },

    /// The run did not reach the terminal sentinel within the step budget
    #[error("Max steps exceeded: limit {max}")]
    MaxStepsExceeded { max: usize },

    /// Snapshot persistence failed mid-run
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

impl GraphError {
    /// True for the errors detected while compiling a graph
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            GraphError::DuplicateNode { .. }
                | GraphError::UnknownNode { .. }
                | GraphError::NoEntryPoint { .. }
                | GraphError::AmbiguousEdge { .. }
        )
    }

    pub(crate) fn node_failed(node: impl Into<String>, err: BoxError) -> Self {
        Self::NodeExecution {
            node: node.into(),
            cause: NodeFailure::Failed(err),
        }
    }
}

/// Why a node invocation failed
#[derive(Debug, Error)]
pub enum NodeFailure {
    /// The callable returned an error
    #[error("{0}")]
    Failed(#[source] BoxError),

    /// The callable exceeded the configured per-node timeout
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Checkpoint store errors
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// A save carried a sequence number not newer than the stored one
    #[error("Stale checkpoint for thread '{thread_id}': stored seq {stored}, got {got}")]
    StaleSequence {
        thread_id: String,
        stored: u64,
        got: u64,
    },

    /// Backend storage failure
    #[error("Checkpoint storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Model/LLM-specific errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// API key not configured
    #[error("API key not configured for provider: {0}")]
    ApiKeyMissing(String),

    /// Provider answered with a non-success status
    #[error("API error from {provider}: {message}")]
    Api { provider: String, message: String },

    /// Invalid response from model
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    /// Create an API error
    pub fn api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_errors_are_classified() {
        assert!(GraphError::DuplicateNode { node: "a".into() }.is_build_error());
        assert!(GraphError::NoEntryPoint { found: 2 }.is_build_error());
        assert!(GraphError::AmbiguousEdge { node: "a".into() }.is_build_error());
        assert!(!GraphError::MaxStepsExceeded { max: 3 }.is_build_error());
        assert!(!GraphError::Routing {
            node: "a".into(),
            label: "b".into()
        }
        .is_build_error());
    }

    #[test]
    fn test_node_execution_message_names_node() {
        let err = GraphError::node_failed("intake", "lookup exploded".into());
        assert_eq!(err.to_string(), "Node 'intake' failed: lookup exploded");

        let err = GraphError::NodeExecution {
            node: "triage".into(),
            cause: NodeFailure::Timeout(Duration::from_secs(2)),
        };
        assert_eq!(err.to_string(), "Node 'triage' failed: timed out after 2s");
    }

    #[test]
    fn test_graph_error_converts_to_top_level() {
        let err: TriageError = GraphError::UnknownNode { node: "x".into() }.into();
        assert!(matches!(err, TriageError::Graph(_)));
        assert!(err.to_string().contains("'x'"));
    }
}
