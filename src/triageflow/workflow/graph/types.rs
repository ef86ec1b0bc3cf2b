// SPDX-License-Identifier: MIT

//! Graph workflow type definitions
//!
//! Nodes, edges and the [`GraphSpec`] that collects them before compilation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::adk::error::BoxError;
use crate::triageflow::workflow::config::ExecutionConfig;
use crate::triageflow::workflow::checkpoint::Checkpointer;
use crate::triageflow::workflow::state::{StateUpdate, WorkflowState};

/// Terminal sentinel: routing here ends the run
pub const END: &str = "__end__";

/// A named step of a graph.
///
/// Nodes read the state and return a partial update; they never mutate the
/// state they are given.
#[async_trait]
pub trait Node: Send + Sync {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, BoxError>;
}

/// Adapter turning an async closure into a [`Node`]
pub struct FnNode<F> {
    f: F,
}

/// Wrap `f` as a node. The closure receives its own copy of the state.
pub fn node_fn<F, Fut>(f: F) -> FnNode<F>
where
    F: Fn(WorkflowState) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StateUpdate, BoxError>> + Send,
{
    FnNode { f }
}

#[async_trait]
impl<F, Fut> Node for FnNode<F>
where
    F: Fn(WorkflowState) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StateUpdate, BoxError>> + Send,
{
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, BoxError> {
        (self.f)(state.clone()).await
    }
}

/// Routing function evaluated after its source node merged its update
pub type RouterFn = Arc<dyn Fn(&WorkflowState) -> String + Send + Sync>;

/// Outgoing dispatch of a node
#[derive(Clone)]
pub enum Route {
    /// Always continue with the named node (or [`END`])
    Static(String),
    /// Ask the router; its label is looked up in `mapping` when one is given
    Conditional {
        router: RouterFn,
        mapping: Option<HashMap<String, String>>,
    },
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Route::Static(to) => f.debug_tuple("Static").field(to).finish(),
            Route::Conditional { mapping, .. } => f
                .debug_struct("Conditional")
                .field("mapping", mapping)
                .finish_non_exhaustive(),
        }
    }
}

/// Uncompiled description of a graph.
///
/// Variants are built by taking a base spec and adding (or removing) nodes
/// and edges before calling `compile`. Nothing is validated until then.
#[derive(Default)]
pub struct GraphSpec {
    pub(crate) name: String,
    pub(crate) nodes: Vec<(String, Arc<dyn Node>)>,
    pub(crate) edges: Vec<(String, Route)>,
    pub(crate) entries: Vec<String>,
    pub(crate) checkpointer: Option<Arc<dyn Checkpointer>>,
    pub(crate) config: ExecutionConfig,
}

impl GraphSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn add_node<N>(self, name: &str, node: N) -> Self
    where
        N: Node + 'static,
    {
        self.add_shared_node(name, Arc::new(node))
    }

    pub fn add_shared_node(mut self, name: &str, node: Arc<dyn Node>) -> Self {
        self.nodes.push((name.to_string(), node));
        self
    }

    /// Drop a node together with every edge leaving it
    pub fn remove_node(mut self, name: &str) -> Self {
        self.nodes.retain(|(n, _)| n != name);
        self.entries.retain(|n| n != name);
        self.remove_edges_from(name)
    }

    pub fn add_edge(mut self, from: &str, to: &str) -> Self {
        self.edges
            .push((from.to_string(), Route::Static(to.to_string())));
        self
    }

    /// Route from `from` with `router`; labels are node names or [`END`]
    pub fn add_conditional_edges<R>(self, from: &str, router: R) -> Self
    where
        R: Fn(&WorkflowState) -> String + Send + Sync + 'static,
    {
        self.push_conditional(from, Arc::new(router), None)
    }

    /// Route from `from` with `router`, translating labels through `mapping`
    pub fn add_conditional_edges_mapped<R>(
        self,
        from: &str,
        router: R,
        mapping: &[(&str, &str)],
    ) -> Self
    where
        R: Fn(&WorkflowState) -> String + Send + Sync + 'static,
    {
        let mapping = mapping
            .iter()
            .map(|(label, node)| (label.to_string(), node.to_string()))
            .collect();
        self.push_conditional(from, Arc::new(router), Some(mapping))
    }

    fn push_conditional(
        mut self,
        from: &str,
        router: RouterFn,
        mapping: Option<HashMap<String, String>>,
    ) -> Self {
        self.edges
            .push((from.to_string(), Route::Conditional { router, mapping }));
        self
    }

    /// Forget every outgoing edge of `from`, static or conditional
    pub fn remove_edges_from(mut self, from: &str) -> Self {
        self.edges.retain(|(source, _)| source != from);
        self
    }

    /// Mark `name` as the entry node. Marking more than one is rejected at
    /// compile time.
    pub fn set_entry(mut self, name: &str) -> Self {
        self.entries.push(name.to_string());
        self
    }

    /// Replace the entry node instead of adding another one
    pub fn replace_entry(mut self, name: &str) -> Self {
        self.entries = vec![name.to_string()];
        self
    }

    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|(n, _)| n.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> FnNode<impl Fn(WorkflowState) -> std::future::Ready<Result<StateUpdate, BoxError>>>
    {
        node_fn(|_state| std::future::ready(Ok(StateUpdate::none())))
    }

    #[tokio::test]
    async fn test_fn_node_receives_state() {
        let node = node_fn(|state: WorkflowState| async move {
            Ok(StateUpdate {
                last_node: state.patient_id.clone(),
                ..StateUpdate::default()
            })
        });
        let state = WorkflowState {
            patient_id: Some("P001".into()),
            ..WorkflowState::default()
        };
        let update = node.run(&state).await.unwrap();
        assert_eq!(update.last_node.as_deref(), Some("P001"));
    }

    #[test]
    fn test_spec_collects_in_order() {
        let spec = GraphSpec::new("demo")
            .add_node("a", noop())
            .add_node("b", noop())
            .add_edge("a", "b")
            .set_entry("a");
        assert_eq!(spec.name(), "demo");
        assert_eq!(spec.node_names(), vec!["a", "b"]);
        assert_eq!(spec.edges.len(), 1);
        assert_eq!(spec.entries, vec!["a"]);
    }

    #[test]
    fn test_remove_node_drops_edges_and_entry() {
        let spec = GraphSpec::new("demo")
            .add_node("a", noop())
            .add_node("b", noop())
            .add_edge("a", "b")
            .add_conditional_edges("b", |_| END.to_string())
            .set_entry("b")
            .remove_node("b");
        assert_eq!(spec.node_names(), vec!["a"]);
        assert_eq!(spec.edges.len(), 1);
        assert!(spec.entries.is_empty());
    }

    #[test]
    fn test_replace_entry() {
        let spec = GraphSpec::new("demo")
            .set_entry("a")
            .set_entry("b")
            .replace_entry("c");
        assert_eq!(spec.entries, vec!["c"]);
    }

    #[test]
    fn test_route_debug_hides_router() {
        let route = Route::Conditional {
            router: Arc::new(|_: &WorkflowState| END.to_string()),
            mapping: None,
        };
        assert!(format!("{:?}", route).starts_with("Conditional"));
        assert_eq!(
            format!("{:?}", Route::Static("x".into())),
            "Static(\"x\")"
        );
    }
}
