// src/dag/edge.rs

//! Directed edges with optional condition expressions.

use std::sync::Arc;

use crate::dag::{EvaluationContext, Node};
use crate::errors::Result;
use crate::template::{RhaiTemplateEngine, TemplateEngine};

/// A directed link between two nodes of the graph.
///
/// Endpoints are shared references into the graph's node arena; the edge
/// never owns its nodes. An empty expression makes the edge unconditional.
pub struct Edge {
    source: Arc<Node>,
    target: Arc<Node>,
    expression: String,
    engine: Option<Arc<dyn TemplateEngine>>,
}

impl Edge {
    /// Create an unconditional edge.
    pub fn new(source: Arc<Node>, target: Arc<Node>) -> Self {
        Self {
            source,
            target,
            expression: String::new(),
            engine: None,
        }
    }

    /// Create a conditional edge evaluated with the default engine.
    pub fn conditional(source: Arc<Node>, target: Arc<Node>, expression: impl Into<String>) -> Self {
        Self {
            source,
            target,
            expression: expression.into(),
            engine: None,
        }
    }

    /// Create a conditional edge bound to a specific template engine.
    pub fn conditional_with_engine(
        source: Arc<Node>,
        target: Arc<Node>,
        expression: impl Into<String>,
        engine: Arc<dyn TemplateEngine>,
    ) -> Self {
        Self {
            source,
            target,
            expression: expression.into(),
            engine: Some(engine),
        }
    }

    pub fn source(&self) -> &Arc<Node> {
        &self.source
    }

    pub fn target(&self) -> &Arc<Node> {
        &self.target
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Edge identity: `"<source>-><target>"`.
    pub fn id(&self) -> String {
        edge_id(self.source.id(), self.target.id())
    }

    /// Evaluate the condition against the merged context snapshot.
    ///
    /// An empty expression is always satisfied. A non-empty expression is
    /// delegated to the installed engine, falling back to the default rhai
    /// engine when none was set on the edge.
    pub fn evaluate(&self, ctx: &EvaluationContext) -> Result<bool> {
        if self.expression.is_empty() {
            return Ok(true);
        }

        let namespace = ctx.all();
        match &self.engine {
            Some(engine) => engine.evaluate_bool(&self.expression, &namespace),
            None => RhaiTemplateEngine::new().evaluate_bool(&self.expression, &namespace),
        }
    }
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Edge")
            .field("id", &self.id())
            .field("expression", &self.expression)
            .finish()
    }
}

/// Compose the canonical edge id from endpoint ids.
pub fn edge_id(source: &str, target: &str) -> String {
    format!("{source}->{target}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Status;

    #[test]
    fn unconditional_edge_is_always_satisfied() {
        let a = Arc::new(Node::new("a", Status::Unknown));
        let b = Arc::new(Node::new("b", Status::Unknown));
        let edge = Edge::new(a, b);

        assert_eq!(edge.id(), "a->b");
        assert_eq!(edge.expression(), "");
        assert!(edge.evaluate(&EvaluationContext::new()).unwrap());
    }

    #[test]
    fn conditional_edge_consults_the_context() {
        let a = Arc::new(Node::new("a", Status::Unknown));
        let b = Arc::new(Node::new("b", Status::Unknown));
        let edge = Edge::conditional(a, b, "{{ env == 'prod' }}");

        let prod = EvaluationContext::new().with_params(
            [("env".to_string(), serde_json::json!("prod"))].into(),
        );
        let dev = EvaluationContext::new().with_params(
            [("env".to_string(), serde_json::json!("dev"))].into(),
        );

        assert!(edge.evaluate(&prod).unwrap());
        assert!(!edge.evaluate(&dev).unwrap());
    }

    #[test]
    fn invalid_expression_surfaces_an_error() {
        let a = Arc::new(Node::new("a", Status::Unknown));
        let b = Arc::new(Node::new("b", Status::Unknown));
        let edge = Edge::conditional(a, b, "{{ unclosed");

        assert!(edge.evaluate(&EvaluationContext::new()).is_err());
    }
}
