// SPDX-License-Identifier: MIT

//! Workflow orchestration engine
//!
//! This module provides:
//! - Typed workflow state and merge rules
//! - Graph construction, compilation and execution
//! - Checkpoint persistence keyed by thread id
//! - Runtime configuration

pub mod checkpoint;
pub mod config;
pub mod graph;
pub mod registry;
pub mod state;

pub use checkpoint::{Checkpoint, Checkpointer, FileCheckpointer, InMemoryCheckpointer};
pub use config::{ExecutionConfig, WorkflowConfig};
pub use graph::{CompiledGraph, GraphSpec, Node, StepEvent, SubgraphNode, END};
pub use registry::NodeRegistry;
pub use state::{StateUpdate, WorkflowState};
