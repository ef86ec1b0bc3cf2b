// SPDX-License-Identifier: MIT

use crate::adk::error::{GraphError, NodeFailure};
use crate::triageflow::workflow::graph::{Node, END};
use crate::triageflow::workflow::state::{StateUpdate, WorkflowState};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Named node callables of one compiled graph
#[derive(Clone, Default)]
pub struct NodeRegistry {
    nodes: HashMap<String, Arc<dyn Node>>,
    order: Vec<String>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node under `name`. Names are unique and may not shadow the
    /// terminal sentinel.
    pub fn register(&mut self, name: &str, node: Arc<dyn Node>) -> Result<(), GraphError> {
        if name == END || self.nodes.contains_key(name) {
            return Err(GraphError::DuplicateNode {
                node: name.to_string(),
            });
        }
        self.nodes.insert(name.to_string(), node);
        self.order.push(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Node>> {
        self.nodes.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Node names in registration order
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Run the node called `name` against `state`, bounded by `timeout`
    pub async fn invoke(
        &self,
        name: &str,
        state: &WorkflowState,
        timeout: Option<Duration>,
    ) -> Result<StateUpdate, GraphError> {
        let node = self.get(name).ok_or_else(|| GraphError::UnknownNode {
            node: name.to_string(),
        })?;

        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, node.run(state)).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(GraphError::NodeExecution {
                        node: name.to_string(),
                        cause: NodeFailure::Timeout(limit),
                    })
                }
            },
            None => node.run(state).await,
        };

        result.map_err(|e| GraphError::node_failed(name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::BoxError;
    use crate::triageflow::workflow::graph::node_fn;

    fn tag(name: &'static str) -> Arc<dyn Node> {
        Arc::new(node_fn(move |_state| async move {
            Ok(StateUpdate {
                last_node: Some(name.to_string()),
                ..StateUpdate::default()
            })
        }))
    }

    #[test]
    fn test_register_and_get_node() {
        let mut registry = NodeRegistry::new();
        registry.register("intake", tag("intake")).unwrap();

        assert!(registry.get("intake").is_some());
        assert!(registry.contains("intake"));
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn test_duplicate_and_reserved_names() {
        let mut registry = NodeRegistry::new();
        registry.register("a", tag("a")).unwrap();

        let err = registry.register("a", tag("a")).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateNode { ref node } if node == "a"));
        assert!(registry.register(END, tag("end")).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_names_keep_registration_order() {
        let mut registry = NodeRegistry::new();
        for name in ["tool3", "tool1", "tool2"] {
            registry.register(name, tag("x")).unwrap();
        }
        assert_eq!(registry.names(), ["tool3", "tool1", "tool2"]);
    }

    #[tokio::test]
    async fn test_invoke() {
        let mut registry = NodeRegistry::new();
        registry.register("a", tag("a")).unwrap();

        let update = registry
            .invoke("a", &WorkflowState::new(), None)
            .await
            .unwrap();
        assert_eq!(update.last_node.as_deref(), Some("a"));

        let err = registry
            .invoke("missing", &WorkflowState::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownNode { .. }));
    }

    #[tokio::test]
    async fn test_invoke_wraps_failure() {
        let mut registry = NodeRegistry::new();
        registry
            .register(
                "broken",
                Arc::new(node_fn(|_state| async move {
                    Err::<StateUpdate, BoxError>("boom".into())
                })),
            )
            .unwrap();

        let err = registry
            .invoke("broken", &WorkflowState::new(), None)
            .await
            .unwrap_err();
        match err {
            GraphError::NodeExecution { node, cause } => {
                assert_eq!(node, "broken");
                assert_eq!(cause.to_string(), "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_invoke_timeout() {
        let mut registry = NodeRegistry::new();
        registry
            .register(
                "slow",
                Arc::new(node_fn(|_state| async move {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(StateUpdate::none())
                })),
            )
            .unwrap();

        let err = registry
            .invoke("slow", &WorkflowState::new(), Some(Duration::from_millis(10)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GraphError::NodeExecution {
                cause: NodeFailure::Timeout(_),
                ..
            }
        ));
    }
}
