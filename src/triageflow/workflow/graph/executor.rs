// SPDX-License-Identifier: MIT

//! Graph workflow executor
//!
//! Runs a compiled graph node by node: invoke, merge, route, checkpoint,
//! until a route reaches [`END`].

use super::types::{Route, END};
use crate::adk::error::GraphError;
use crate::triageflow::workflow::checkpoint::{Checkpoint, Checkpointer};
use crate::triageflow::workflow::config::ExecutionConfig;
use crate::triageflow::workflow::registry::NodeRegistry;
use crate::triageflow::workflow::state::{StateUpdate, WorkflowState};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Thread id used when the caller does not provide one
pub const DEFAULT_THREAD_ID: &str = "default";

/// Progress notification emitted by [`CompiledGraph::run_stream`]
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepEvent {
    NodeStarted {
        step: usize,
        node: String,
    },
    NodeCompleted {
        step: usize,
        node: String,
        /// State fields the node's update carried
        updated: Vec<&'static str>,
        next: String,
    },
    Completed {
        state: Box<WorkflowState>,
        steps: usize,
    },
    Failed {
        error: String,
    },
}

/// Where a run starts
struct StartPoint {
    state: WorkflowState,
    node: String,
    seq: u64,
}

/// A validated graph ready to run.
///
/// Runs sharing a thread id are serialized; distinct thread ids run
/// concurrently.
pub struct CompiledGraph {
    name: String,
    registry: NodeRegistry,
    routes: HashMap<String, Route>,
    entry: String,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    config: ExecutionConfig,
    thread_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("nodes", &self.registry.names())
            .field("routes", &self.routes)
            .field("config", &self.config)
            .field("checkpointed", &self.checkpointer.is_some())
            .finish_non_exhaustive()
    }
}

impl CompiledGraph {
    pub(crate) fn new(
        name: String,
        registry: NodeRegistry,
        routes: HashMap<String, Route>,
        entry: String,
        checkpointer: Option<Arc<dyn Checkpointer>>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            name,
            registry,
            routes,
            entry,
            checkpointer,
            config,
            thread_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn node_names(&self) -> &[String] {
        self.registry.names()
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn checkpointer(&self) -> Option<&Arc<dyn Checkpointer>> {
        self.checkpointer.as_ref()
    }

    /// Run from the entry node on `state` without touching the checkpoint
    /// store
    pub async fn invoke(&self, state: WorkflowState) -> Result<WorkflowState, GraphError> {
        let start = StartPoint {
            state,
            node: self.entry.clone(),
            seq: 0,
        };
        self.drive(start, None, None).await
    }

    /// Run the graph for `thread_id` (or [`DEFAULT_THREAD_ID`]).
    ///
    /// When the thread has an unfinished checkpoint the run resumes at its
    /// saved node with `input` merged over the saved state; otherwise it
    /// starts at the entry node.
    pub async fn run(
        &self,
        input: StateUpdate,
        thread_id: Option<&str>,
    ) -> Result<WorkflowState, GraphError> {
        self.execute(input, thread_id, None).await
    }

    /// Like [`run`](Self::run), reporting progress on `events`. A dropped
    /// receiver does not stop the run.
    pub async fn run_stream(
        &self,
        input: StateUpdate,
        thread_id: Option<&str>,
        events: mpsc::Sender<StepEvent>,
    ) -> Result<WorkflowState, GraphError> {
        let result = self.execute(input, thread_id, Some(&events)).await;
        if let Err(e) = &result {
            let _ = events
                .send(StepEvent::Failed {
                    error: e.to_string(),
                })
                .await;
        }
        result
    }

    /// Latest checkpoint for `thread_id`; `None` without a checkpointer
    pub async fn checkpoint(&self, thread_id: &str) -> Result<Option<Checkpoint>, GraphError> {
        match &self.checkpointer {
            Some(checkpointer) => Ok(checkpointer.load(thread_id).await?),
            None => Ok(None),
        }
    }

    async fn execute(
        &self,
        input: StateUpdate,
        thread_id: Option<&str>,
        events: Option<&mpsc::Sender<StepEvent>>,
    ) -> Result<WorkflowState, GraphError> {
        let thread_id = thread_id.unwrap_or(DEFAULT_THREAD_ID);
        let lock = self.thread_lock(thread_id);

        let result = {
            let _guard = lock.lock().await;
            match self.start_point(thread_id, input).await {
                Ok(start) => self.drive(start, Some(thread_id), events).await,
                Err(e) => Err(e),
            }
        };

        drop(lock);
        self.release_thread_lock(thread_id);
        result
    }

    fn thread_lock(&self, thread_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.thread_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(thread_id.to_string()).or_default().clone()
    }

    fn release_thread_lock(&self, thread_id: &str) {
        let mut locks = self.thread_locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(thread_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(thread_id);
        }
    }

    async fn start_point(
        &self,
        thread_id: &str,
        input: StateUpdate,
    ) -> Result<StartPoint, GraphError> {
        let saved = match &self.checkpointer {
            Some(checkpointer) => checkpointer.load(thread_id).await?,
            None => None,
        };

        Ok(match saved {
            Some(checkpoint) => {
                let node = match checkpoint.next_node {
                    Some(node) => {
                        log::info!(
                            "[{}] Resuming thread '{}' at '{}' (seq {})",
                            self.name,
                            thread_id,
                            node,
                            checkpoint.seq
                        );
                        node
                    }
                    None => {
                        log::warn!(
                            "[{}] Thread '{}' already completed (seq {}); restarting at '{}' on its saved state",
                            self.name,
                            thread_id,
                            checkpoint.seq,
                            self.entry
                        );
                        self.entry.clone()
                    }
                };
                StartPoint {
                    state: checkpoint.state.merge(input),
                    node,
                    seq: checkpoint.seq,
                }
            }
            None => StartPoint {
                state: WorkflowState::new().merge(input),
                node: self.entry.clone(),
                seq: 0,
            },
        })
    }

    async fn drive(
        &self,
        start: StartPoint,
        thread_id: Option<&str>,
        events: Option<&mpsc::Sender<StepEvent>>,
    ) -> Result<WorkflowState, GraphError> {
        let StartPoint {
            mut state,
            node: mut current,
            mut seq,
        } = start;
        let mut steps = 0usize;

        loop {
            if let Some(max) = self.config.max_steps {
                if steps >= max {
                    log::warn!("[{}] Step limit {} reached at '{}'", self.name, max, current);
                    return Err(GraphError::MaxStepsExceeded { max });
                }
            }
            steps += 1;

            log::info!("[{}] Step {}: executing node '{}'", self.name, steps, current);
            emit(
                events,
                StepEvent::NodeStarted {
                    step: steps,
                    node: current.clone(),
                },
            )
            .await;

            let update = self
                .registry
                .invoke(&current, &state, self.config.node_timeout)
                .await?;
            let updated = update.field_names();
            log::debug!("[{}] Node '{}' updated {:?}", self.name, current, updated);
            state.apply(update);

            let next = self.route(&current, &state)?;

            if let (Some(checkpointer), Some(thread_id)) = (&self.checkpointer, thread_id) {
                seq += 1;
                let checkpoint = Checkpoint::new(thread_id, state.clone(), seq)
                    .with_next_node((next != END).then(|| next.clone()));
                checkpointer.save(&checkpoint).await?;
            }

            emit(
                events,
                StepEvent::NodeCompleted {
                    step: steps,
                    node: current.clone(),
                    updated,
                    next: next.clone(),
                },
            )
            .await;

            if next == END {
                log::info!("[{}] Completed after {} steps", self.name, steps);
                if events.is_some() {
                    let event = StepEvent::Completed {
                        state: Box::new(state.clone()),
                        steps,
                    };
                    emit(events, event).await;
                }
                return Ok(state);
            }
            current = next;
        }
    }

    /// Resolve the node that follows `from` for the current state
    fn route(&self, from: &str, state: &WorkflowState) -> Result<String, GraphError> {
        let target = match self.routes.get(from) {
            None => return Ok(END.to_string()),
            Some(Route::Static(to)) => return Ok(to.clone()),
            Some(Route::Conditional { router, mapping }) => {
                let label = router(state);
                match mapping {
                    Some(mapping) => {
                        mapping
                            .get(&label)
                            .cloned()
                            .ok_or_else(|| GraphError::Routing {
                                node: from.to_string(),
                                label,
                            })?
                    }
                    None => label,
                }
            }
        };

        if target == END || self.registry.contains(&target) {
            Ok(target)
        } else {
            Err(GraphError::Routing {
                node: from.to_string(),
                label: target,
            })
        }
    }
}

async fn emit(events: Option<&mpsc::Sender<StepEvent>>, event: StepEvent) {
    if let Some(tx) = events {
        if tx.send(event).await.is_err() {
            log::debug!("Step event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::BoxError;
    use crate::triageflow::workflow::checkpoint::InMemoryCheckpointer;
    use crate::triageflow::workflow::graph::{node_fn, GraphSpec, Node};
    use crate::triageflow::workflow::state::Message;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Node appending "<name>" to messages and recording itself as last node
    fn say(name: &'static str) -> impl Node {
        node_fn(move |_state| async move {
            Ok(StateUpdate {
                messages: vec![Message::ai(name)],
                last_node: Some(name.to_string()),
                ..StateUpdate::default()
            })
        })
    }

    fn counting(name: &'static str, counter: Arc<AtomicUsize>) -> impl Node {
        node_fn(move |_state| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(StateUpdate {
                    last_node: Some(name.to_string()),
                    ..StateUpdate::default()
                })
            }
        })
    }

    fn linear(checkpointer: Option<Arc<dyn Checkpointer>>) -> CompiledGraph {
        let spec = GraphSpec::new("linear")
            .add_node("a", say("a"))
            .add_node("b", say("b"))
            .add_edge("a", "b")
            .add_edge("b", END)
            .set_entry("a");
        match checkpointer {
            Some(cp) => spec.with_checkpointer(cp).compile().unwrap(),
            None => spec.compile().unwrap(),
        }
    }

    fn contents(state: &WorkflowState) -> Vec<&str> {
        state.messages.iter().map(|m| m.content.as_str()).collect()
    }

    #[test]
    fn test_debug_names_graph() {
        let graph = linear(None);
        let debug = format!("{:?}", graph);
        assert!(debug.starts_with("CompiledGraph"));
        assert!(debug.contains("\"linear\""));
        assert!(debug.contains("entry: \"a\""));
    }

    #[tokio::test]
    async fn test_completed_thread_restarts_at_entry_on_saved_state() {
        let checkpointer: Arc<dyn Checkpointer> = Arc::new(InMemoryCheckpointer::new());
        let graph = linear(Some(checkpointer.clone()));
        graph.run(StateUpdate::none(), Some("t")).await.unwrap();

        let state = graph
            .run(
                StateUpdate {
                    messages: vec![Message::human("again")],
                    ..StateUpdate::default()
                },
                Some("t"),
            )
            .await
            .unwrap();
        assert_eq!(contents(&state), vec!["a", "b", "again", "a", "b"]);
        assert_eq!(checkpointer.load("t").await.unwrap().unwrap().seq, 4);
    }

    #[tokio::test]
    async fn test_linear_run_accumulates() {
        let graph = linear(None);
        let input = StateUpdate {
            messages: vec![Message::human("hi")],
            ..StateUpdate::default()
        };
        let state = graph.run(input, None).await.unwrap();
        assert_eq!(contents(&state), vec!["hi", "a", "b"]);
        assert_eq!(state.last_node.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_node_without_edges_ends_run() {
        let graph = GraphSpec::new("single")
            .add_node("only", say("only"))
            .set_entry("only")
            .compile()
            .unwrap();
        let state = graph.invoke(WorkflowState::new()).await.unwrap();
        assert_eq!(contents(&state), vec!["only"]);
    }

    #[tokio::test]
    async fn test_conditional_routing_with_mapping() {
        let graph = GraphSpec::new("branch")
            .add_node("start", say("start"))
            .add_node("left", say("left"))
            .add_node("right", say("right"))
            .add_conditional_edges_mapped(
                "start",
                |state| {
                    if state.context.contains_key("go_left") {
                        "L".to_string()
                    } else {
                        "R".to_string()
                    }
                },
                &[("L", "left"), ("R", "right")],
            )
            .set_entry("start")
            .compile()
            .unwrap();

        let mut context = HashMap::new();
        context.insert("go_left".to_string(), json!(true));
        let left = graph
            .invoke(WorkflowState {
                context,
                ..WorkflowState::default()
            })
            .await
            .unwrap();
        assert_eq!(left.last_node.as_deref(), Some("left"));

        let right = graph.invoke(WorkflowState::new()).await.unwrap();
        assert_eq!(right.last_node.as_deref(), Some("right"));
    }

    #[tokio::test]
    async fn test_routing_is_deterministic() {
        let graph = GraphSpec::new("branch")
            .add_node("start", say("start"))
            .add_node("x", say("x"))
            .add_conditional_edges("start", |state| {
                if state.messages.len() > 1 {
                    "x".to_string()
                } else {
                    END.to_string()
                }
            })
            .set_entry("start")
            .compile()
            .unwrap();
        let state = WorkflowState {
            messages: vec![Message::human("q")],
            ..WorkflowState::default()
        };
        let first = graph.invoke(state.clone()).await.unwrap();
        let second = graph.invoke(state).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(contents(&first), vec!["q", "start", "x"]);
    }

    #[tokio::test]
    async fn test_checkpoints_carry_seq_and_resume_point() {
        let store = Arc::new(InMemoryCheckpointer::new());
        let graph = linear(Some(store.clone()));

        graph.run(StateUpdate::none(), Some("t1")).await.unwrap();
        let checkpoint = store.load("t1").await.unwrap().unwrap();
        assert_eq!(checkpoint.seq, 2);
        assert!(checkpoint.is_complete());
        assert_eq!(contents(&checkpoint.state), vec!["a", "b"]);

        graph.run(StateUpdate::none(), None).await.unwrap();
        assert!(graph.checkpoint(DEFAULT_THREAD_ID).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_resume_after_failure() {
        let store = Arc::new(InMemoryCheckpointer::new());
        let a_runs = Arc::new(AtomicUsize::new(0));
        let b_attempts = Arc::new(AtomicUsize::new(0));

        let attempts = b_attempts.clone();
        let flaky = node_fn(move |_state| {
            let attempts = attempts.clone();
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err::<StateUpdate, BoxError>("first attempt fails".into());
                }
                Ok(StateUpdate {
                    last_node: Some("b".into()),
                    ..StateUpdate::default()
                })
            }
        });

        let graph = GraphSpec::new("flaky")
            .add_node("a", counting("a", a_runs.clone()))
            .add_node("b", flaky)
            .add_edge("a", "b")
            .set_entry("a")
            .with_checkpointer(store.clone())
            .compile()
            .unwrap();

        let err = graph.run(StateUpdate::none(), Some("t")).await.unwrap_err();
        assert!(matches!(err, GraphError::NodeExecution { ref node, .. } if node == "b"));

        let saved = store.load("t").await.unwrap().unwrap();
        assert_eq!(saved.seq, 1);
        assert_eq!(saved.next_node.as_deref(), Some("b"));

        let state = graph.run(StateUpdate::none(), Some("t")).await.unwrap();
        assert_eq!(state.last_node.as_deref(), Some("b"));
        assert_eq!(a_runs.load(Ordering::SeqCst), 1);
        assert_eq!(store.load("t").await.unwrap().unwrap().seq, 2);
    }

    #[tokio::test]
    async fn test_routing_failure_keeps_previous_checkpoint() {
        let store = Arc::new(InMemoryCheckpointer::new());
        let graph = GraphSpec::new("router")
            .add_node("a", say("a"))
            .add_conditional_edges("a", |state| {
                if state.context.contains_key("fail") {
                    "nowhere".to_string()
                } else {
                    END.to_string()
                }
            })
            .set_entry("a")
            .with_checkpointer(store.clone())
            .compile()
            .unwrap();

        graph.run(StateUpdate::none(), Some("t")).await.unwrap();
        let before = store.load("t").await.unwrap().unwrap();

        let mut context = HashMap::new();
        context.insert("fail".to_string(), json!(true));
        let err = graph
            .run(
                StateUpdate {
                    context: Some(context),
                    ..StateUpdate::default()
                },
                Some("t"),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GraphError::Routing { ref node, ref label } if node == "a" && label == "nowhere"
        ));

        let after = store.load("t").await.unwrap().unwrap();
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn test_unmapped_label_is_routing_error() {
        let graph = GraphSpec::new("mapped")
            .add_node("a", say("a"))
            .add_conditional_edges_mapped("a", |_| "other".to_string(), &[("done", END)])
            .set_entry("a")
            .compile()
            .unwrap();
        let err = graph.invoke(WorkflowState::new()).await.unwrap_err();
        assert!(matches!(err, GraphError::Routing { ref label, .. } if label == "other"));
    }

    #[tokio::test]
    async fn test_max_steps_exceeded() {
        let graph = GraphSpec::new("loop")
            .add_node("spin", say("spin"))
            .add_edge("spin", "spin")
            .set_entry("spin")
            .with_config(ExecutionConfig::default().with_max_steps(3))
            .compile()
            .unwrap();
        let err = graph.invoke(WorkflowState::new()).await.unwrap_err();
        assert!(matches!(err, GraphError::MaxStepsExceeded { max: 3 }));
    }

    #[tokio::test]
    async fn test_same_thread_runs_are_serialized() {
        let store = Arc::new(InMemoryCheckpointer::new());
        let slow = node_fn(|_state| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(StateUpdate {
                messages: vec![Message::ai("slow")],
                ..StateUpdate::default()
            })
        });
        let graph = Arc::new(
            GraphSpec::new("slow")
                .add_node("a", slow)
                .add_node("b", say("b"))
                .add_edge("a", "b")
                .set_entry("a")
                .with_checkpointer(store.clone())
                .compile()
                .unwrap(),
        );

        let g1 = graph.clone();
        let g2 = graph.clone();
        let (r1, r2) = tokio::join!(
            async move { g1.run(StateUpdate::none(), Some("shared")).await },
            async move { g2.run(StateUpdate::none(), Some("shared")).await },
        );
        assert!(r1.is_ok());
        assert!(r2.is_ok());

        let checkpoint = store.load("shared").await.unwrap().unwrap();
        assert_eq!(checkpoint.seq, 4);
        assert_eq!(contents(&checkpoint.state), vec!["slow", "b", "slow", "b"]);
        assert!(graph.thread_locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_stream_events() {
        let graph = linear(None);
        let (tx, mut rx) = mpsc::channel(16);
        let state = graph
            .run_stream(StateUpdate::none(), Some("s"), tx)
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events.len(), 5);
        assert!(matches!(&events[0], StepEvent::NodeStarted { step: 1, node } if node == "a"));
        assert!(matches!(
            &events[3],
            StepEvent::NodeCompleted { next, updated, .. }
                if next == END && updated.contains(&"messages")
        ));
        match &events[4] {
            StepEvent::Completed { state: final_state, steps } => {
                assert_eq!(*steps, 2);
                assert_eq!(**final_state, state);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let json = serde_json::to_value(&events[0]).unwrap();
        assert_eq!(json["type"], "node_started");
    }

    #[tokio::test]
    async fn test_run_stream_reports_failure() {
        let graph = GraphSpec::new("broken")
            .add_node(
                "boom",
                node_fn(|_state| async move { Err::<StateUpdate, BoxError>("kaput".into()) }),
            )
            .set_entry("boom")
            .compile()
            .unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        assert!(graph.run_stream(StateUpdate::none(), None, tx).await.is_err());

        let mut last = None;
        while let Some(event) = rx.recv().await {
            last = Some(event);
        }
        assert!(matches!(last, Some(StepEvent::Failed { ref error }) if error.contains("kaput")));
    }
}
