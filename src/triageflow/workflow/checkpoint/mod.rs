// SPDX-License-Identifier: MIT

//! Checkpoint persistence keyed by thread id
//!
//! The executor saves a [`Checkpoint`] after every node. Backends implement
//! [`Checkpointer`]; [`InMemoryCheckpointer`] lives for the process and
//! [`FileCheckpointer`] appends JSON lines under a directory.

mod file;
mod memory;

pub use file::FileCheckpointer;
pub use memory::InMemoryCheckpointer;

use crate::adk::error::CheckpointError;
use crate::triageflow::workflow::state::WorkflowState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of one thread's state after `seq` executed steps
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Checkpoint {
    pub thread_id: String,
    pub state: WorkflowState,
    pub seq: u64,
    /// Node to run when the thread resumes; `None` once the run finished
    #[serde(default)]
    pub next_node: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(thread_id: impl Into<String>, state: WorkflowState, seq: u64) -> Self {
        Self {
            thread_id: thread_id.into(),
            state,
            seq,
            next_node: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_next_node(mut self, next_node: Option<String>) -> Self {
        self.next_node = next_node;
        self
    }

    /// True when the snapshot was taken at the terminal sentinel
    pub fn is_complete(&self) -> bool {
        self.next_node.is_none()
    }
}

/// Storage backend for checkpoints.
///
/// `save` must reject a checkpoint whose `seq` is not greater than the one
/// already stored for the thread, so two writers cannot silently overwrite
/// each other.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;

    /// Latest checkpoint for the thread, `None` when the thread is unknown
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Drop every checkpoint of a thread. Returns whether anything was removed.
    async fn delete(&self, thread_id: &str) -> Result<bool, CheckpointError>;

    /// Thread ids that currently have a checkpoint
    async fn list_threads(&self) -> Result<Vec<String>, CheckpointError>;
}

pub(crate) fn check_sequence(
    stored: Option<u64>,
    checkpoint: &Checkpoint,
) -> Result<(), CheckpointError> {
    match stored {
        Some(stored) if checkpoint.seq <= stored => Err(CheckpointError::StaleSequence {
            thread_id: checkpoint.thread_id.clone(),
            stored,
            got: checkpoint.seq,
        }),
        _ => Ok(()),
    }
}
