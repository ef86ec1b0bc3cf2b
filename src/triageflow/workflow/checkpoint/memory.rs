// SPDX-License-Identifier: MIT

use super::{check_sequence, Checkpoint, Checkpointer};
use crate::adk::error::CheckpointError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Per-process checkpoint store, lost on restart
#[derive(Clone, Default)]
pub struct InMemoryCheckpointer {
    inner: Arc<RwLock<HashMap<String, Checkpoint>>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| CheckpointError::Storage("lock poisoned".into()))?;
        check_sequence(
            guard.get(&checkpoint.thread_id).map(|c| c.seq),
            checkpoint,
        )?;
        guard.insert(checkpoint.thread_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let guard = self
            .inner
            .read()
            .map_err(|_| CheckpointError::Storage("lock poisoned".into()))?;
        Ok(guard.get(thread_id).cloned())
    }

    async fn delete(&self, thread_id: &str) -> Result<bool, CheckpointError> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| CheckpointError::Storage("lock poisoned".into()))?;
        Ok(guard.remove(thread_id).is_some())
    }

    async fn list_threads(&self) -> Result<Vec<String>, CheckpointError> {
        let guard = self
            .inner
            .read()
            .map_err(|_| CheckpointError::Storage("lock poisoned".into()))?;
        let mut threads: Vec<String> = guard.keys().cloned().collect();
        threads.sort();
        Ok(threads)
    }
}
