// SPDX-License-Identifier: MIT

//! Nested graphs exposed as a single node

use super::executor::CompiledGraph;
use super::types::Node;
use crate::adk::error::BoxError;
use crate::triageflow::workflow::state::{StateUpdate, WorkflowState};
use async_trait::async_trait;
use std::sync::Arc;

type Projection = Arc<dyn Fn(StateUpdate) -> StateUpdate + Send + Sync>;

/// Runs an inner graph to completion on a copy of the outer state and
/// reports what changed as the node's update.
///
/// The inner graph never checkpoints; the outer executor snapshots after
/// the subgraph node like after any other node.
pub struct SubgraphNode {
    graph: Arc<CompiledGraph>,
    projection: Option<Projection>,
}

impl SubgraphNode {
    pub fn new(graph: CompiledGraph) -> Self {
        Self::shared(Arc::new(graph))
    }

    pub fn shared(graph: Arc<CompiledGraph>) -> Self {
        Self {
            graph,
            projection: None,
        }
    }

    /// Reshape the inner delta before it reaches the outer graph
    pub fn with_projection<F>(mut self, projection: F) -> Self
    where
        F: Fn(StateUpdate) -> StateUpdate + Send + Sync + 'static,
    {
        self.projection = Some(Arc::new(projection));
        self
    }

    pub fn graph(&self) -> &CompiledGraph {
        &self.graph
    }
}

#[async_trait]
impl Node for SubgraphNode {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, BoxError> {
        log::debug!("Entering subgraph '{}'", self.graph.name());
        let inner_final = self.graph.invoke(state.clone()).await?;
        let delta = inner_final.delta_since(state);
        Ok(match &self.projection {
            Some(project) => project(delta),
            None => delta,
        })
    }
}
