// src/runtime.rs

//! Pipeline registry and lifecycle: config parsing, graph build,
//! sync/async submission, cancellation and background reaping.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{dsl, PipelineConfig};
use crate::dag::{Edge, Graph, Node};
use crate::errors::{Error, Result};
use crate::exec::{DefaultExecutorProvider, ExecutorProvider};
use crate::metadata::{create_store, value_to_string};
use crate::pipeline::{Listener, Pipeline};
use crate::pusher::Pusher;
use crate::template::TemplateEngine;
use crate::types::{Event, Status};

const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(30);

struct RuntimeInner {
    /// Currently-extant pipelines only; completed ones are removed by the
    /// sync path, the async worker, or the reaper.
    pipelines: RwLock<HashMap<String, Pipeline>>,
    /// Every id ever admitted; monotonic for the runtime's lifetime.
    admitted: Mutex<HashSet<String>>,
    cancel: CancellationToken,
    done: CancellationToken,
    pusher: RwLock<Option<Arc<dyn Pusher>>>,
    engine: RwLock<Option<Arc<dyn TemplateEngine>>>,
    provider: RwLock<Option<Arc<dyn ExecutorProvider>>>,
    reap_interval: Duration,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

/// Process-local pipeline runtime. Clones share state.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_reap_interval(DEFAULT_REAP_INTERVAL)
    }

    /// Runtime with a custom reaper cadence.
    pub fn with_reap_interval(reap_interval: Duration) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                pipelines: RwLock::new(HashMap::new()),
                admitted: Mutex::new(HashSet::new()),
                cancel: CancellationToken::new(),
                done: CancellationToken::new(),
                pusher: RwLock::new(None),
                engine: RwLock::new(None),
                provider: RwLock::new(None),
                reap_interval,
                reaper: Mutex::new(None),
            }),
        }
    }

    /// Look up an active pipeline.
    pub fn get(&self, id: &str) -> Result<Pipeline> {
        self.pipelines()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::PipelineNotFound(id.to_string()))
    }

    /// Parse, admit and run a pipeline inline. The pipeline leaves the
    /// active registry before this returns, while its id stays admitted.
    pub async fn run_sync(
        &self,
        id: &str,
        config: &str,
        listener: Option<Arc<dyn Listener>>,
    ) -> Result<Pipeline> {
        let pipeline = self.admit(id, config, listener)?;

        let result = pipeline.run(&self.inner.cancel).await;
        self.rm(id);

        result.map(|_| pipeline)
    }

    /// Parse, admit and run a pipeline on a background task; returns the
    /// pipeline immediately. The worker removes it from the active
    /// registry when the run ends.
    pub async fn run_async(
        &self,
        id: &str,
        config: &str,
        listener: Option<Arc<dyn Listener>>,
    ) -> Result<Pipeline> {
        let pipeline = self.admit(id, config, listener)?;

        let runtime = self.clone();
        let worker = pipeline.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            if let Err(err) = worker.run(&runtime.inner.cancel).await {
                warn!(pipeline = %id, error = %err, "async pipeline run failed");
            }
            runtime.rm(&id);
        });

        Ok(pipeline)
    }

    /// Cancel an active pipeline by id.
    pub fn cancel(&self, id: &str) -> Result<()> {
        let pipeline = self.get(id)?;
        pipeline.cancel();
        Ok(())
    }

    /// Remove a pipeline from the active registry. The id remains
    /// admitted.
    pub fn rm(&self, id: &str) {
        self.pipelines_mut().remove(id);
    }

    /// Resolves once the runtime has been stopped.
    pub async fn done(&self) {
        self.inner.done.cancelled().await;
    }

    pub fn is_done(&self) -> bool {
        self.inner.done.is_cancelled()
    }

    /// Deliver an out-of-band notification to the runtime.
    pub fn notify(&self, data: &Value) -> Result<()> {
        match data {
            Value::String(message) => info!(%message, "runtime notification"),
            Value::Object(map) => match map.get("message").and_then(Value::as_str) {
                Some(message) => info!(%message, "runtime notification"),
                None => info!(payload = %data, "runtime notification"),
            },
            other => info!(payload = %other, "runtime notification"),
        }
        Ok(())
    }

    /// The runtime's root cancellation token; pipeline runs derive from
    /// it, so stopping the runtime cancels them.
    pub fn ctx(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Start the background reaper that periodically drops completed
    /// pipelines from the active registry.
    pub fn start_background(&self) {
        let mut reaper = self.inner.reaper.lock().unwrap_or_else(|e| e.into_inner());
        if reaper.is_some() {
            return;
        }

        let runtime = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(runtime.inner.reap_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = runtime.inner.cancel.cancelled() => break,
                    _ = ticker.tick() => runtime.reap_completed(),
                }
            }
            debug!("background reaper stopped");
        });

        *reaper = Some(handle);
    }

    /// Cancel the runtime context and close the done signal. Idempotent.
    pub fn stop_background(&self) {
        self.inner.cancel.cancel();
        self.inner.done.cancel();
        // The reaper task exits on its own once the token fires.
        let _ = self
            .inner
            .reaper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }

    pub fn set_pusher(&self, pusher: Arc<dyn Pusher>) {
        *self
            .inner
            .pusher
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(pusher);
    }

    pub fn set_template_engine(&self, engine: Arc<dyn TemplateEngine>) {
        *self
            .inner
            .engine
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(engine);
    }

    pub fn set_executor_provider(&self, provider: Arc<dyn ExecutorProvider>) {
        *self
            .inner
            .provider
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(provider);
    }

    /// Build a graph from a parsed config: one vertex per `Nodes` entry
    /// (status seeded from `Status`, default `UNKNOWN`) and edges from the
    /// graph DSL. Transitions touching unknown nodes, and edges the graph
    /// rejects, are skipped — a malformed graph yields fewer edges, never
    /// a build failure.
    pub fn build_graph(&self, config: &PipelineConfig) -> Graph {
        let graph = Graph::new();

        let mut nodes = HashMap::new();
        for (id, node_cfg) in &config.nodes {
            let status = config
                .status
                .get(id)
                .map(|s| Status::parse(s))
                .unwrap_or(Status::Unknown);
            let node = graph.add_vertex(Node::from_config(id.clone(), status, node_cfg));
            nodes.insert(id.clone(), node);
        }

        let engine = self
            .inner
            .engine
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        for transition in dsl::parse_transitions(&config.graph) {
            let (Some(source), Some(target)) =
                (nodes.get(&transition.from), nodes.get(&transition.to))
            else {
                debug!(
                    from = %transition.from,
                    to = %transition.to,
                    "transition endpoint not defined in Nodes; skipping"
                );
                continue;
            };

            let edge = match transition.expression() {
                Some(expression) => match &engine {
                    Some(engine) => Edge::conditional_with_engine(
                        source.clone(),
                        target.clone(),
                        expression,
                        engine.clone(),
                    ),
                    None => Edge::conditional(source.clone(), target.clone(), expression),
                },
                None => Edge::new(source.clone(), target.clone()),
            };

            if let Err(err) = graph.add_edge(edge) {
                warn!(
                    from = %transition.from,
                    to = %transition.to,
                    error = %err,
                    "edge rejected during graph build"
                );
            }
        }

        graph
    }

    /// Check the id, parse the config, assemble the pipeline and insert it
    /// into the registry. A parse/build failure does not burn the id.
    fn admit(
        &self,
        id: &str,
        config: &str,
        listener: Option<Arc<dyn Listener>>,
    ) -> Result<Pipeline> {
        {
            let admitted = self
                .inner
                .admitted
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if admitted.contains(id) {
                return Err(Error::DuplicatePipeline(id.to_string()));
            }
        }

        let parsed = PipelineConfig::from_yaml(config)?;
        let pipeline = self.assemble(id, &parsed, listener)?;

        {
            let mut admitted = self
                .inner
                .admitted
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if !admitted.insert(id.to_string()) {
                return Err(Error::DuplicatePipeline(id.to_string()));
            }
            self.pipelines_mut().insert(id.to_string(), pipeline.clone());
        }

        pipeline.dispatch(Event::PipelineInit);
        debug!(pipeline = %id, "pipeline admitted");

        Ok(pipeline)
    }

    fn assemble(
        &self,
        id: &str,
        config: &PipelineConfig,
        listener: Option<Arc<dyn Listener>>,
    ) -> Result<Pipeline> {
        let pipeline = Pipeline::with_id(id);

        if let Some(listener) = listener {
            pipeline.listening(listener);
        }

        pipeline.set_graph(self.build_graph(config));
        pipeline.set_params(config.param.clone());

        if !config.metadata.store_type.is_empty() {
            let store = create_store(&config.metadata)?;
            pipeline.set_metadata(store);
            pipeline.seed_metadata(
                config
                    .metadata
                    .data
                    .iter()
                    .map(|(k, v)| (k.clone(), value_to_string(v)))
                    .collect(),
            );
        }

        let provider = self
            .inner
            .provider
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match provider {
            Some(provider) => pipeline.set_executor_provider(provider),
            None if !config.executors.is_empty() => pipeline.set_executor_provider(Arc::new(
                DefaultExecutorProvider::new(config.executors.clone()),
            )),
            None => {}
        }

        let pusher = self
            .inner
            .pusher
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(pusher) = pusher {
            pipeline.set_pusher(pusher);
        }

        Ok(pipeline)
    }

    fn reap_completed(&self) {
        let mut pipelines = self.pipelines_mut();
        let before = pipelines.len();
        pipelines.retain(|_, pipeline| !pipeline.is_done());
        let removed = before - pipelines.len();
        if removed > 0 {
            debug!(removed, "reaped completed pipelines");
        }
    }

    fn pipelines(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Pipeline>> {
        self.inner
            .pipelines
            .read()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn pipelines_mut(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Pipeline>> {
        self.inner
            .pipelines
            .write()
            .unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("active", &self.pipelines().len())
            .field("done", &self.is_done())
            .finish()
    }
}
