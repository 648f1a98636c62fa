// src/dag/node.rs

//! Work nodes of the pipeline DAG.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;

use crate::config::{NodeConfig, StepConfig};
use crate::types::Status;

/// A single command of a node. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Step {
    pub name: String,
    pub run: String,
}

impl Step {
    pub fn new(name: impl Into<String>, run: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            run: run.into(),
        }
    }
}

impl From<&StepConfig> for Step {
    fn from(cfg: &StepConfig) -> Self {
        Step::new(cfg.name.clone(), cfg.run.clone())
    }
}

/// A vertex of the DAG: identity, status, a property bag the scheduler
/// writes results into, and the executor selection for the node's steps.
///
/// Status and properties are interior-mutable so a `Node` can be shared as
/// `Arc<Node>` between the graph, its edges and the worker currently
/// driving it. The scheduler hands a node to at most one worker at a time;
/// the locks only make concurrent readers (evaluation contexts, listeners)
/// safe.
#[derive(Debug)]
pub struct Node {
    id: String,
    status: RwLock<Status>,
    properties: RwLock<HashMap<String, Value>>,
    executor: String,
    image: String,
    steps: Vec<Step>,
    config: HashMap<String, Value>,
}

impl Node {
    /// Create a bare node with the given id and initial status.
    pub fn new(id: impl Into<String>, status: Status) -> Self {
        Self {
            id: id.into(),
            status: RwLock::new(status),
            properties: RwLock::new(HashMap::new()),
            executor: String::new(),
            image: String::new(),
            steps: Vec::new(),
            config: HashMap::new(),
        }
    }

    /// Create a node from its config entry, with the seeded status.
    pub fn from_config(id: impl Into<String>, status: Status, cfg: &NodeConfig) -> Self {
        Self {
            id: id.into(),
            status: RwLock::new(status),
            properties: RwLock::new(HashMap::new()),
            executor: cfg.executor.clone(),
            image: cfg.image.clone(),
            steps: cfg.steps.iter().map(Step::from).collect(),
            config: cfg.config.clone(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> Status {
        *self.status.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_status(&self, status: Status) {
        *self.status.write().unwrap_or_else(|e| e.into_inner()) = status;
    }

    /// Fetch a property, stringified; missing keys yield the empty string.
    pub fn get(&self, key: &str) -> String {
        let props = self.properties.read().unwrap_or_else(|e| e.into_inner());
        match props.get(key) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(v) => v.to_string(),
        }
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.properties
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), value);
    }

    pub fn executor(&self) -> &str {
        &self.executor
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn config(&self) -> &HashMap<String, Value> {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn property_bag_stringifies() {
        let node = Node::new("build", Status::Unknown);
        assert_eq!(node.get("missing"), "");

        node.set("output", json!("ok"));
        node.set("count", json!(3));
        node.set("nothing", json!(null));

        assert_eq!(node.get("output"), "ok");
        assert_eq!(node.get("count"), "3");
        assert_eq!(node.get("nothing"), "");
    }

    #[test]
    fn status_transitions() {
        let node = Node::new("deploy", Status::Unknown);
        assert_eq!(node.status(), Status::Unknown);
        node.set_status(Status::Running);
        assert_eq!(node.status(), Status::Running);
        node.set_status(Status::Success);
        assert_eq!(node.status(), Status::Success);
    }

    #[test]
    fn from_config_copies_definition() {
        let cfg = NodeConfig {
            executor: "shell".into(),
            image: "alpine:3".into(),
            steps: vec![StepConfig {
                name: "hello".into(),
                run: "echo hi".into(),
            }],
            config: HashMap::from([("k".to_string(), json!("v"))]),
        };
        let node = Node::from_config("n1", Status::Success, &cfg);
        assert_eq!(node.id(), "n1");
        assert_eq!(node.executor(), "shell");
        assert_eq!(node.image(), "alpine:3");
        assert_eq!(node.steps(), &[Step::new("hello", "echo hi")]);
        assert_eq!(node.status(), Status::Success);
    }
}
