// src/dag/context.rs

//! Layered evaluation context for edge expressions.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::dag::Node;
use crate::pipeline::Pipeline;

/// The namespace handed to a template engine: a merged snapshot of the
/// context's layers.
pub type Namespace = HashMap<String, Value>;

/// Copy-on-write evaluation context.
///
/// `with_*` never mutate the receiver; each returns a new context carrying
/// a copy of the base data plus the new binding. The merged view is built
/// lazily by [`EvaluationContext::all`], in this order (last writer wins):
/// base params → node-derived keys → pipeline-derived keys and metadata.
#[derive(Clone, Default)]
pub struct EvaluationContext {
    data: HashMap<String, Value>,
    node: Option<Arc<Node>>,
    pipeline: Option<Pipeline>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a key in the base layer only.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Merged snapshot of all layers at call time.
    pub fn all(&self) -> Namespace {
        let mut result = self.data.clone();

        if let Some(node) = &self.node {
            result.insert("nodeId".to_string(), Value::from(node.id()));
            result.insert(
                "nodeStatus".to_string(),
                Value::from(node.status().as_str()),
            );
        }

        if let Some(pipeline) = &self.pipeline {
            result.insert("pipelineId".to_string(), Value::from(pipeline.id()));
            result.insert(
                "pipelineStatus".to_string(),
                Value::from(pipeline.status().as_str()),
            );
            for (k, v) in pipeline.metadata() {
                result.insert(k, Value::from(v));
            }
        }

        result
    }

    pub fn with_node(&self, node: Arc<Node>) -> Self {
        Self {
            data: self.data.clone(),
            node: Some(node),
            pipeline: self.pipeline.clone(),
        }
    }

    pub fn with_pipeline(&self, pipeline: Pipeline) -> Self {
        Self {
            data: self.data.clone(),
            node: self.node.clone(),
            pipeline: Some(pipeline),
        }
    }

    pub fn with_params(&self, params: HashMap<String, Value>) -> Self {
        let mut data = self.data.clone();
        data.extend(params);
        Self {
            data,
            node: self.node.clone(),
            pipeline: self.pipeline.clone(),
        }
    }
}

impl std::fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("data", &self.data)
            .field("node", &self.node.as_ref().map(|n| n.id().to_string()))
            .field(
                "pipeline",
                &self.pipeline.as_ref().map(|p| p.id().to_string()),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Status;
    use serde_json::json;

    #[test]
    fn with_params_does_not_mutate_receiver() {
        let base = EvaluationContext::new();
        let derived = base.with_params(HashMap::from([("env".to_string(), json!("prod"))]));

        assert!(base.get("env").is_none());
        assert_eq!(derived.get("env"), Some(&json!("prod")));
    }

    #[test]
    fn node_layer_overrides_base() {
        let node = Arc::new(Node::new("n1", Status::Failed));
        let ctx = EvaluationContext::new()
            .with_params(HashMap::from([("nodeId".to_string(), json!("stale"))]))
            .with_node(node);

        let all = ctx.all();
        assert_eq!(all["nodeId"], json!("n1"));
        assert_eq!(all["nodeStatus"], json!("FAILED"));
    }

    #[test]
    fn rebinding_node_replaces_derived_keys() {
        let first = Arc::new(Node::new("first", Status::Success));
        let second = Arc::new(Node::new("second", Status::Running));

        let ctx = EvaluationContext::new().with_node(first);
        let rebound = ctx.with_node(second);

        assert_eq!(ctx.all()["nodeId"], json!("first"));
        assert_eq!(rebound.all()["nodeId"], json!("second"));
        assert_eq!(rebound.all()["nodeStatus"], json!("RUNNING"));
    }
}
