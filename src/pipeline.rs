// src/pipeline.rs

//! Pipeline: a graph plus run lifecycle, event dispatch and cancellation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dag::{EvaluationContext, Graph, Node};
use crate::errors::{Error, Result};
use crate::exec::{Command, ExecOutput, ExecutorProvider};
use crate::metadata::MetadataStore;
use crate::pusher::{Entry, Level, Pusher};
use crate::types::{Event, Status};

/// Receives lifecycle events, synchronously on the emitting worker.
/// Implementations must be non-blocking or tolerate short delays.
pub trait Listener: Send + Sync {
    fn handle(&self, pipeline: &Pipeline, event: Event);

    /// Events this listener wants; delivery is filtered to this set.
    fn events(&self) -> Vec<Event> {
        Event::all().to_vec()
    }
}

struct PipelineState {
    graph: Option<Arc<Graph>>,
    status: Status,
    params: HashMap<String, Value>,
    /// Key/value snapshot merged into evaluation contexts; seeded from the
    /// config's metadata data. The attached store serves live reads and
    /// writes from node work.
    metadata: HashMap<String, String>,
    store: Option<Arc<dyn MetadataStore>>,
    listener: Option<Arc<dyn Listener>>,
    provider: Option<Arc<dyn ExecutorProvider>>,
    pusher: Option<Arc<dyn Pusher>>,
    run_cancel: Option<CancellationToken>,
}

struct PipelineInner {
    id: String,
    state: RwLock<PipelineState>,
    done: CancellationToken,
}

/// Cheaply clonable handle to a pipeline. All clones share state.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

impl Pipeline {
    /// Create a pipeline with a generated id.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    /// Create a pipeline with a caller-assigned id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                id: id.into(),
                state: RwLock::new(PipelineState {
                    graph: None,
                    status: Status::Unknown,
                    params: HashMap::new(),
                    metadata: HashMap::new(),
                    store: None,
                    listener: None,
                    provider: None,
                    pusher: None,
                    run_cancel: None,
                }),
                done: CancellationToken::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn graph(&self) -> Option<Arc<Graph>> {
        self.read().graph.clone()
    }

    pub fn set_graph(&self, graph: Graph) {
        self.write().graph = Some(Arc::new(graph));
    }

    pub fn status(&self) -> Status {
        self.read().status
    }

    pub fn params(&self) -> HashMap<String, Value> {
        self.read().params.clone()
    }

    pub fn set_params(&self, params: HashMap<String, Value>) {
        self.write().params = params;
    }

    /// Metadata key/value snapshot used by evaluation contexts.
    pub fn metadata(&self) -> HashMap<String, String> {
        self.read().metadata.clone()
    }

    /// Merge key/values into the metadata snapshot.
    pub fn seed_metadata(&self, data: HashMap<String, String>) {
        self.write().metadata.extend(data);
    }

    /// Attach the live metadata store.
    pub fn set_metadata(&self, store: Arc<dyn MetadataStore>) {
        self.write().store = Some(store);
    }

    pub fn metadata_store(&self) -> Option<Arc<dyn MetadataStore>> {
        self.read().store.clone()
    }

    pub fn listening(&self, listener: Arc<dyn Listener>) {
        self.write().listener = Some(listener);
    }

    pub fn set_executor_provider(&self, provider: Arc<dyn ExecutorProvider>) {
        self.write().provider = Some(provider);
    }

    pub fn set_pusher(&self, pusher: Arc<dyn Pusher>) {
        self.write().pusher = Some(pusher);
    }

    /// Resolves once the pipeline's run has finished. Latches: callers
    /// arriving after completion return immediately.
    pub async fn done(&self) {
        self.inner.done.cancelled().await;
    }

    pub fn is_done(&self) -> bool {
        self.inner.done.is_cancelled()
    }

    /// Announce a status change to the listener.
    pub fn notify(&self) {
        self.dispatch(Event::PipelineStatusUpdate);
    }

    /// Idempotently cancel the active run, if any, and mark the pipeline
    /// cancelled.
    pub fn cancel(&self) {
        let token = {
            let mut state = self.write();
            state.status = Status::Cancelled;
            state.run_cancel.clone()
        };
        if let Some(token) = token {
            token.cancel();
        }
        info!(pipeline = %self.id(), "pipeline cancelled");
        self.dispatch(Event::PipelineCancelled);
    }

    /// Drive the graph to completion.
    ///
    /// Emits `pipeline-start` before any node work and `pipeline-finish`
    /// after the traversal regardless of outcome; closes the done signal
    /// exactly once; returns the traversal error (`Error::Cancelled` when
    /// the run was cancelled). At most one run may be active at a time.
    pub async fn run(&self, parent: &CancellationToken) -> Result<()> {
        let run_token = {
            let mut state = self.write();
            if state.run_cancel.is_some() {
                return Err(Error::PipelineRunning(self.id().to_string()));
            }
            let token = parent.child_token();
            state.run_cancel = Some(token.clone());
            state.status = Status::Running;
            token
        };

        info!(pipeline = %self.id(), "pipeline run starting");
        self.dispatch(Event::PipelineStart);

        let result = self.drive(&run_token).await;

        {
            let mut state = self.write();
            state.status = match &result {
                Ok(()) => Status::Success,
                Err(Error::Cancelled) => Status::Cancelled,
                Err(_) if state.status == Status::Cancelled => Status::Cancelled,
                Err(_) => Status::Failed,
            };
            state.run_cancel = None;
        }

        match &result {
            Ok(()) => info!(pipeline = %self.id(), "pipeline run finished"),
            Err(err) => warn!(pipeline = %self.id(), error = %err, "pipeline run failed"),
        }

        self.dispatch(Event::PipelineFinish);
        self.inner.done.cancel();

        result
    }

    async fn drive(&self, run_token: &CancellationToken) -> Result<()> {
        let Some(graph) = self.graph() else {
            return Ok(());
        };

        let eval_ctx = EvaluationContext::new()
            .with_params(self.params())
            .with_pipeline(self.clone());

        let pipeline = self.clone();
        graph
            .traversal(run_token, &eval_ctx, move |token, node| {
                let pipeline = pipeline.clone();
                async move { pipeline.visit_node(token, node).await }
            })
            .await
    }

    async fn visit_node(&self, token: CancellationToken, node: Arc<Node>) -> Result<()> {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.dispatch(Event::PipelineNodeStart);
        let result = self.execute_node(&token, &node).await;
        self.dispatch(Event::PipelineNodeFinish);

        result
    }

    /// Run one node's work.
    ///
    /// With an executor provider and a node that names an executor with
    /// steps, the steps stream through the executor one at a time and the
    /// node's status follows the outcome. Otherwise the node is simulated:
    /// a node still in `UNKNOWN` is marked `SUCCESS`, while a seeded
    /// status (a status-driven gate) is left untouched.
    async fn execute_node(&self, token: &CancellationToken, node: &Arc<Node>) -> Result<()> {
        let provider = self.read().provider.clone();
        let runnable = provider
            .filter(|_| !node.executor().is_empty() && !node.steps().is_empty());

        let Some(provider) = runnable else {
            debug!(pipeline = %self.id(), node = %node.id(), "no executor bound; simulating node");
            if node.status() == Status::Unknown {
                node.set_status(Status::Success);
            }
            return Ok(());
        };

        node.set_status(Status::Running);

        self.dispatch(Event::PipelineExecutorPrepare);
        let mut executor = provider.get_executor(node.executor()).await?;
        executor.prepare(token).await?;
        self.dispatch(Event::PipelineExecutorPrepareDone);

        let (result_tx, mut result_rx) = mpsc::channel::<ExecOutput>(64);
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(1);

        let transfer = executor.transfer(token.clone(), result_tx, cmd_rx);

        // Feed steps one at a time so a failing step stops the rest.
        let feed_and_drain = async {
            let mut failure: Option<String> = None;
            let mut steps = node.steps().iter();
            let mut cmd_tx = Some(cmd_tx);

            match steps.next() {
                Some(step) => {
                    if let Some(tx) = &cmd_tx {
                        let _ = tx.send(Command::Step(step.clone())).await;
                    }
                }
                None => cmd_tx = None,
            }

            while let Some(message) = result_rx.recv().await {
                match message {
                    ExecOutput::Chunk(chunk) => {
                        self.push_log(node, "", Level::Debug, "step output", &chunk)
                            .await;
                    }
                    ExecOutput::Result(step) => {
                        node.set(
                            format!("{}.output", step.step_name),
                            Value::from(step.output.clone()),
                        );
                        let level = if step.is_success() {
                            Level::Info
                        } else {
                            Level::Error
                        };
                        self.push_log(
                            node,
                            &step.step_name,
                            level,
                            step.error.as_deref().unwrap_or("step finished"),
                            step.output.as_bytes(),
                        )
                        .await;

                        if let Some(err) = step.error {
                            failure = Some(format!("step `{}`: {err}", step.step_name));
                            cmd_tx = None;
                        } else {
                            match steps.next() {
                                Some(step) => {
                                    if let Some(tx) = &cmd_tx {
                                        let _ = tx.send(Command::Step(step.clone())).await;
                                    }
                                }
                                None => cmd_tx = None,
                            }
                        }
                    }
                }
            }

            failure
        };

        let (transfer_result, failure) = tokio::join!(transfer, feed_and_drain);
        let destroy_result = executor.destroy(token).await;

        transfer_result?;
        destroy_result?;

        if token.is_cancelled() {
            node.set_status(Status::Cancelled);
            return Err(Error::Cancelled);
        }

        if let Some(reason) = failure {
            node.set_status(Status::Failed);
            return Err(Error::NodeFailed {
                node: node.id().to_string(),
                reason,
            });
        }

        node.set_status(Status::Success);
        Ok(())
    }

    async fn push_log(
        &self,
        node: &Arc<Node>,
        step: &str,
        level: Level,
        message: &str,
        output: &[u8],
    ) {
        let pusher = self.read().pusher.clone();
        let Some(pusher) = pusher else { return };

        let entry = Entry {
            pipeline: self.id().to_string(),
            build_id: self.id().to_string(),
            node: node.id().to_string(),
            step: step.to_string(),
            timestamp: Utc::now(),
            level,
            message: message.to_string(),
            output: String::from_utf8_lossy(output).into_owned(),
        };

        if let Err(err) = pusher.push(entry).await {
            warn!(pipeline = %self.id(), error = %err, "log push failed");
        }
    }

    pub(crate) fn dispatch(&self, event: Event) {
        let listener = self.read().listener.clone();
        if let Some(listener) = listener {
            if listener.events().contains(&event) {
                listener.handle(self, event);
            }
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, PipelineState> {
        self.inner.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, PipelineState> {
        self.inner.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id())
            .field("status", &self.status())
            .field("done", &self.is_done())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::Edge;

    #[tokio::test]
    async fn run_without_graph_succeeds_and_closes_done() {
        let pipeline = Pipeline::new();
        pipeline.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(pipeline.status(), Status::Success);
        assert!(pipeline.is_done());
        // done() latches.
        pipeline.done().await;
    }

    #[tokio::test]
    async fn run_visits_graph_in_order() {
        let graph = Graph::new();
        let a = graph.add_vertex(Node::new("a", Status::Unknown));
        let b = graph.add_vertex(Node::new("b", Status::Unknown));
        graph.add_edge(Edge::new(a.clone(), b.clone())).unwrap();

        let pipeline = Pipeline::new();
        pipeline.set_graph(graph);
        pipeline.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(a.status(), Status::Success);
        assert_eq!(b.status(), Status::Success);
        assert_eq!(pipeline.status(), Status::Success);
    }

    #[tokio::test]
    async fn second_concurrent_run_is_rejected() {
        let pipeline = Pipeline::new();
        {
            let mut state = pipeline.write();
            state.run_cancel = Some(CancellationToken::new());
        }

        let err = pipeline.run(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::PipelineRunning(_)));
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let pipeline = Pipeline::new();
        pipeline.cancel();
        pipeline.cancel();
        assert_eq!(pipeline.status(), Status::Cancelled);
    }
}
