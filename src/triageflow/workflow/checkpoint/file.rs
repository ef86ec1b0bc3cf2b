// SPDX-License-Identifier: MIT

//! Durable checkpoint backend: one JSON-lines file per thread id.
//!
//! Every save appends a line, so the file doubles as the thread's history;
//! `load` returns the last line. File names percent-encode the thread id, so
//! two distinct ids never share a file.

use super::{check_sequence, Checkpoint, Checkpointer};
use crate::adk::error::CheckpointError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const EXTENSION: &str = "jsonl";

#[derive(Clone, Debug)]
pub struct FileCheckpointer {
    base_dir: PathBuf,
}

impl FileCheckpointer {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// File stem for a thread id; keeps `[A-Za-z0-9-_.~]` and escapes the rest
    fn file_stem(thread_id: &str) -> String {
        urlencoding::encode(thread_id).into_owned()
    }

    fn thread_path(&self, thread_id: &str) -> PathBuf {
        let filename = format!("{}.{}", Self::file_stem(thread_id), EXTENSION);
        self.base_dir.join(filename)
    }

    async fn read_history(path: &Path) -> Result<Vec<Checkpoint>, CheckpointError> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(CheckpointError::from))
            .collect()
    }

    /// Every checkpoint saved for a thread, oldest first
    pub async fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint>, CheckpointError> {
        let path = self.thread_path(thread_id);
        let mut history = Self::read_history(&path).await?;
        let before = history.len();
        history.retain(|c| c.thread_id == thread_id);
        if history.len() != before {
            log::warn!(
                "Ignoring {} checkpoints of other threads in {:?}",
                before - history.len(),
                path
            );
        }
        Ok(history)
    }
}

#[async_trait]
impl Checkpointer for FileCheckpointer {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        fs::create_dir_all(&self.base_dir).await?;

        let path = self.thread_path(&checkpoint.thread_id);
        let history = Self::read_history(&path).await?;
        if let Some(other) = history.iter().find(|c| c.thread_id != checkpoint.thread_id) {
            return Err(CheckpointError::Storage(format!(
                "{:?} already holds thread '{}', refusing to write thread '{}'",
                path, other.thread_id, checkpoint.thread_id
            )));
        }
        check_sequence(history.last().map(|c| c.seq), checkpoint)?;

        // A single write keeps the line whole if the process dies mid-save
        let mut line = serde_json::to_string(checkpoint)?;
        line.push('\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        log::debug!(
            "Saved checkpoint seq {} for thread {} to {:?}",
            checkpoint.seq,
            checkpoint.thread_id,
            path
        );
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.history(thread_id).await?.pop())
    }

    async fn delete(&self, thread_id: &str) -> Result<bool, CheckpointError> {
        match fs::remove_file(self.thread_path(thread_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_threads(&self) -> Result<Vec<String>, CheckpointError> {
        let mut entries = match fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut threads = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == EXTENSION) {
                if let Some(last) = Self::read_history(&path).await?.pop() {
                    threads.push(last.thread_id);
                }
            }
        }
        threads.sort();
        Ok(threads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triageflow::workflow::state::{Message, WorkflowState};
    use tempfile::tempdir;

    fn state_with(content: &str) -> WorkflowState {
        WorkflowState {
            messages: vec![Message::human(content)],
            ..WorkflowState::default()
        }
    }

    #[tokio::test]
    async fn test_appends_and_loads_latest() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointer::new(dir.path());

        store
            .save(&Checkpoint::new("thread/1", state_with("one"), 1))
            .await
            .unwrap();
        store
            .save(
                &Checkpoint::new("thread/1", state_with("two"), 2)
                    .with_next_node(Some("triage".into())),
            )
            .await
            .unwrap();

        let loaded = store.load("thread/1").await.unwrap().unwrap();
        assert_eq!(loaded.seq, 2);
        assert_eq!(loaded.state, state_with("two"));
        assert_eq!(loaded.next_node.as_deref(), Some("triage"));
        assert!(dir.path().join("thread%2F1.jsonl").exists());
        assert_eq!(store.history("thread/1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_thread_is_none() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointer::new(dir.path());
        assert!(store.load("unknown-thread").await.unwrap().is_none());
        assert!(store.list_threads().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_sequence_rejected() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointer::new(dir.path());
        store
            .save(&Checkpoint::new("t", state_with("a"), 4))
            .await
            .unwrap();
        let err = store
            .save(&Checkpoint::new("t", state_with("b"), 3))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::StaleSequence { stored: 4, got: 3, .. }));
        assert_eq!(store.history("t").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointer::new(dir.path());
        store
            .save(&Checkpoint::new("alpha", state_with("a"), 1))
            .await
            .unwrap();
        store
            .save(&Checkpoint::new("beta", state_with("b"), 1))
            .await
            .unwrap();

        assert_eq!(store.list_threads().await.unwrap(), vec!["alpha", "beta"]);
        assert!(store.delete("alpha").await.unwrap());
        assert!(!store.delete("alpha").await.unwrap());
        assert_eq!(store.list_threads().await.unwrap(), vec!["beta"]);
    }

    #[test]
    fn test_file_stem_escapes_separators() {
        assert_eq!(FileCheckpointer::file_stem("visit-1"), "visit-1");
        assert_eq!(FileCheckpointer::file_stem("a/b:c"), "a%2Fb%3Ac");
        assert_eq!(FileCheckpointer::file_stem("50%"), "50%25");
        assert_ne!(
            FileCheckpointer::file_stem("visit/1"),
            FileCheckpointer::file_stem("visit_1")
        );
    }

    #[tokio::test]
    async fn test_similar_thread_ids_do_not_share_history() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointer::new(dir.path());
        store
            .save(&Checkpoint::new("visit/1", state_with("P001"), 1))
            .await
            .unwrap();

        assert!(store.load("visit_1").await.unwrap().is_none());
        store
            .save(&Checkpoint::new("visit_1", state_with("P002"), 1))
            .await
            .unwrap();

        assert_eq!(
            store.load("visit/1").await.unwrap().unwrap().state,
            state_with("P001")
        );
        assert_eq!(
            store.load("visit_1").await.unwrap().unwrap().state,
            state_with("P002")
        );
        assert_eq!(
            store.list_threads().await.unwrap(),
            vec!["visit/1", "visit_1"]
        );
    }

    #[tokio::test]
    async fn test_foreign_lines_in_thread_file_are_ignored() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointer::new(dir.path());
        let foreign = serde_json::to_string(&Checkpoint::new("other", state_with("x"), 7)).unwrap();
        std::fs::write(dir.path().join("mine.jsonl"), format!("{}\n", foreign)).unwrap();

        assert!(store.load("mine").await.unwrap().is_none());
        let err = store
            .save(&Checkpoint::new("mine", state_with("y"), 1))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::Storage(_)));
    }
}
