// SPDX-License-Identifier: MIT

//! Graph-based workflow execution

mod builder;
mod executor;
mod subgraph;
mod types;

pub use executor::{CompiledGraph, StepEvent, DEFAULT_THREAD_ID};
pub use subgraph::SubgraphNode;
pub use types::{node_fn, FnNode, GraphSpec, Node, Route, RouterFn, END};
