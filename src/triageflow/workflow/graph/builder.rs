// SPDX-License-Identifier: MIT

//! Graph compilation
//!
//! Turns a [`GraphSpec`] into a [`CompiledGraph`], rejecting duplicate
//! nodes, dangling edges, ambiguous dispatch and missing or repeated entry
//! points. A failing compile never yields a partial graph.

use super::executor::CompiledGraph;
use super::types::{GraphSpec, Route, END};
use crate::adk::error::GraphError;
use crate::triageflow::workflow::registry::NodeRegistry;
use std::collections::HashMap;

impl GraphSpec {
    /// Validate the spec and produce an executable graph
    pub fn compile(self) -> Result<CompiledGraph, GraphError> {
        let GraphSpec {
            name,
            nodes,
            edges,
            entries,
            checkpointer,
            config,
        } = self;

        let mut registry = NodeRegistry::new();
        for (node_name, node) in nodes {
            registry.register(&node_name, node)?;
        }

        let entry = match entries.as_slice() {
            [entry] => entry.clone(),
            _ => {
                return Err(GraphError::NoEntryPoint {
                    found: entries.len(),
                })
            }
        };
        if !registry.contains(&entry) {
            return Err(GraphError::UnknownNode { node: entry });
        }

        let mut routes: HashMap<String, Route> = HashMap::new();
        for (from, route) in edges {
            if !registry.contains(&from) {
                return Err(GraphError::UnknownNode { node: from });
            }
            if routes.contains_key(&from) {
                return Err(GraphError::AmbiguousEdge { node: from });
            }
            check_targets(&registry, &route)?;
            routes.insert(from, route);
        }

        log::debug!(
            "Compiled graph '{}' with {} nodes, entry '{}'",
            name,
            registry.len(),
            entry
        );

        Ok(CompiledGraph::new(
            name,
            registry,
            routes,
            entry,
            checkpointer,
            config,
        ))
    }
}

fn check_targets(registry: &NodeRegistry, route: &Route) -> Result<(), GraphError> {
    let check = |target: &str| {
        if target == END || registry.contains(target) {
            Ok(())
        } else {
            Err(GraphError::UnknownNode {
                node: target.to_string(),
            })
        }
    };

    match route {
        Route::Static(to) => check(to.as_str()),
        Route::Conditional {
            mapping: Some(mapping),
            ..
        } => mapping.values().try_for_each(|to| check(to.as_str())),
        // Unmapped router labels can only be checked at run time
        Route::Conditional { mapping: None, .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::BoxError;
    use crate::triageflow::workflow::graph::{node_fn, FnNode};
    use crate::triageflow::workflow::state::{StateUpdate, WorkflowState};

    fn noop() -> FnNode<impl Fn(WorkflowState) -> std::future::Ready<Result<StateUpdate, BoxError>>>
    {
        node_fn(|_state| std::future::ready(Ok(StateUpdate::none())))
    }

    fn two_nodes() -> GraphSpec {
        GraphSpec::new("test").add_node("a", noop()).add_node("b", noop())
    }

    #[test]
    fn test_compile_valid_graph() {
        let graph = two_nodes()
            .add_edge("a", "b")
            .add_edge("b", END)
            .set_entry("a")
            .compile()
            .unwrap();
        assert_eq!(graph.name(), "test");
        assert_eq!(graph.entry(), "a");
        assert_eq!(graph.node_names(), ["a", "b"]);
    }

    #[test]
    fn test_duplicate_node() {
        let err = two_nodes()
            .add_node("a", noop())
            .set_entry("a")
            .compile()
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateNode { ref node } if node == "a"));
        assert!(err.is_build_error());
    }

    #[test]
    fn test_entry_point_count() {
        let err = two_nodes().compile().unwrap_err();
        assert!(matches!(err, GraphError::NoEntryPoint { found: 0 }));

        let err = two_nodes()
            .set_entry("a")
            .set_entry("b")
            .compile()
            .unwrap_err();
        assert!(matches!(err, GraphError::NoEntryPoint { found: 2 }));
    }

    #[test]
    fn test_unknown_entry() {
        let err = two_nodes().set_entry("c").compile().unwrap_err();
        assert!(matches!(err, GraphError::UnknownNode { ref node } if node == "c"));
    }

    #[test]
    fn test_static_and_conditional_is_ambiguous() {
        let err = two_nodes()
            .add_edge("a", "b")
            .add_conditional_edges("a", |_| END.to_string())
            .set_entry("a")
            .compile()
            .unwrap_err();
        assert!(matches!(err, GraphError::AmbiguousEdge { ref node } if node == "a"));

        let err = two_nodes()
            .add_edge("a", "b")
            .add_edge("a", END)
            .set_entry("a")
            .compile()
            .unwrap_err();
        assert!(matches!(err, GraphError::AmbiguousEdge { .. }));
    }

    #[test]
    fn test_dangling_targets() {
        let err = two_nodes()
            .add_edge("a", "missing")
            .set_entry("a")
            .compile()
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownNode { ref node } if node == "missing"));

        let err = two_nodes()
            .add_conditional_edges_mapped("a", |_| "x".to_string(), &[("x", "nowhere")])
            .set_entry("a")
            .compile()
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownNode { ref node } if node == "nowhere"));

        let err = two_nodes()
            .add_edge("ghost", "a")
            .set_entry("a")
            .compile()
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownNode { ref node } if node == "ghost"));
    }

    #[test]
    fn test_node_named_end_rejected() {
        let err = two_nodes()
            .add_node(END, noop())
            .set_entry("a")
            .compile()
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateNode { .. }));
    }
}
