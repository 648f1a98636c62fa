// src/dag/graph.rs

//! DAG storage, cycle-checked edge admission, and the layered traversal.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dag::edge::edge_id;
use crate::dag::{Edge, EvaluationContext, Node};
use crate::errors::{Error, Result};

#[derive(Debug, Default)]
struct GraphInner {
    /// Node arena, keyed by id. The graph owns the nodes; edges and
    /// callers share them through `Arc`.
    nodes: HashMap<String, Arc<Node>>,
    /// Outgoing adjacency, destination ids in edge-insertion order.
    adjacency: HashMap<String, Vec<String>>,
    /// Edge index keyed by `"src->dst"`, doubling as the src×dst lookup.
    edges: HashMap<String, Arc<Edge>>,
}

/// The pipeline DAG.
///
/// Mutation (`add_vertex`, `add_edge`) takes the write lock; traversal
/// snapshots under the read lock, so concurrent readers are safe while a
/// traversal is in flight.
#[derive(Debug, Default)]
pub struct Graph {
    inner: RwLock<GraphInner>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the node arena.
    pub fn nodes(&self) -> HashMap<String, Arc<Node>> {
        self.read().nodes.clone()
    }

    /// Snapshot of the edge index, keyed by edge id.
    pub fn edges(&self) -> HashMap<String, Arc<Edge>> {
        self.read().edges.clone()
    }

    /// Insert a vertex. Re-adding an id replaces the node and resets its
    /// adjacency slot; no cycle check runs here.
    pub fn add_vertex(&self, node: Node) -> Arc<Node> {
        let node = Arc::new(node);
        let mut inner = self.write();
        inner
            .adjacency
            .insert(node.id().to_string(), Vec::new());
        inner.nodes.insert(node.id().to_string(), node.clone());
        node
    }

    /// Insert an edge.
    ///
    /// Fails with [`Error::VertexMissing`] when either endpoint is absent
    /// and with [`Error::HasCycle`] when the edge would close a cycle
    /// (self-loops included). A rejected edge is rolled back, so repeated
    /// attempts fail deterministically and the visible edge set is
    /// unchanged.
    pub fn add_edge(&self, edge: Edge) -> Result<()> {
        let mut inner = self.write();

        let src = edge.source().id().to_string();
        let dst = edge.target().id().to_string();
        if !inner.nodes.contains_key(&src) {
            return Err(Error::VertexMissing(src));
        }
        if !inner.nodes.contains_key(&dst) {
            return Err(Error::VertexMissing(dst));
        }

        let id = edge.id();
        inner.adjacency.entry(src.clone()).or_default().push(dst.clone());
        inner.edges.insert(id.clone(), Arc::new(edge));

        if has_cycle(&inner) {
            if let Some(out) = inner.adjacency.get_mut(&src) {
                out.pop();
            }
            inner.edges.remove(&id);
            return Err(Error::HasCycle);
        }

        Ok(())
    }

    /// Kahn-layered concurrent traversal.
    ///
    /// Dispatches every ready node of a frontier concurrently, waits for
    /// the whole frontier (barrier), then walks each completed node's
    /// outgoing edges in insertion order: a satisfied edge decrements the
    /// target's residual in-degree (zero enqueues it for the next
    /// frontier), an unsatisfied edge is skipped without decrementing, and
    /// an evaluation failure aborts the traversal. The first worker error
    /// cancels the rest of the frontier and is returned once the frontier
    /// drains. Cancelling `cancel` prevents the next frontier from being
    /// scheduled.
    pub async fn traversal<F, Fut>(
        &self,
        cancel: &CancellationToken,
        eval_ctx: &EvaluationContext,
        visit: F,
    ) -> Result<()>
    where
        F: Fn(CancellationToken, Arc<Node>) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (nodes, adjacency, edges) = {
            let inner = self.read();
            (
                inner.nodes.clone(),
                inner.adjacency.clone(),
                inner.edges.clone(),
            )
        };

        if nodes.is_empty() {
            return Ok(());
        }

        let mut indegree: HashMap<&str, usize> =
            nodes.keys().map(|id| (id.as_str(), 0)).collect();
        for targets in adjacency.values() {
            for dst in targets {
                if let Some(count) = indegree.get_mut(dst.as_str()) {
                    *count += 1;
                }
            }
        }

        let mut frontier: Vec<String> = indegree
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| id.to_string())
            .collect();

        if frontier.is_empty() {
            // Vertices but no roots: every node is on a cycle. Build-time
            // admission rejects this; refuse to spin.
            return Err(Error::InvalidGraph);
        }

        // Frontier workers share a child token so one failure stops the
        // rest of the level without touching the caller's token.
        let run = cancel.child_token();

        while !frontier.is_empty() {
            if cancel.is_cancelled() {
                debug!("traversal cancelled before next frontier");
                return Err(Error::Cancelled);
            }

            debug!(frontier = ?frontier, "dispatching frontier");

            let mut workers = JoinSet::new();
            for id in &frontier {
                let Some(node) = nodes.get(id) else { continue };
                let node = node.clone();
                let visit = visit.clone();
                let token = run.clone();
                workers.spawn(async move { visit(token, node).await });
            }

            let mut first_err: Option<Error> = None;
            while let Some(joined) = workers.join_next().await {
                let outcome = match joined {
                    Ok(result) => result,
                    Err(join_err) if join_err.is_panic() => {
                        Err(Error::WorkerPanic(join_err.to_string()))
                    }
                    Err(_) => Err(Error::Cancelled),
                };
                if let Err(err) = outcome {
                    if first_err.is_none() {
                        warn!(error = %err, "frontier worker failed; cancelling remainder");
                        run.cancel();
                        first_err = Some(err);
                    }
                }
            }
            if let Some(err) = first_err {
                return Err(err);
            }

            let mut next = Vec::new();
            for id in &frontier {
                let Some(node) = nodes.get(id) else { continue };
                let edge_ctx = eval_ctx.with_node(node.clone());

                let targets = adjacency.get(id).map(Vec::as_slice).unwrap_or(&[]);
                for dst in targets {
                    let Some(edge) = edges.get(&edge_id(id, dst)) else {
                        continue;
                    };
                    if edge.evaluate(&edge_ctx)? {
                        if let Some(count) = indegree.get_mut(dst.as_str()) {
                            *count = count.saturating_sub(1);
                            if *count == 0 {
                                next.push(dst.clone());
                            }
                        }
                    } else {
                        debug!(edge = %edge.id(), "condition false; edge skipped");
                    }
                }
            }

            frontier = next;
        }

        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, GraphInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, GraphInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// A topological sort fails exactly when the adjacency closes a cycle.
fn has_cycle(inner: &GraphInner) -> bool {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for id in inner.nodes.keys() {
        graph.add_node(id.as_str());
    }
    for (src, targets) in &inner.adjacency {
        for dst in targets {
            if src == dst {
                // DiGraphMap cannot represent self-loops; they are cycles
                // by definition.
                return true;
            }
            graph.add_edge(src.as_str(), dst.as_str(), ());
        }
    }

    toposort(&graph, None).is_err()
}
