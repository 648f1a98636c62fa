// src/template.rs

//! Template-engine contract for edge expressions, plus the reference
//! implementation backed by rhai.
//!
//! Expressions use `{{ … }}` interpolation over a flat namespace, e.g.
//! `{{ env == 'prod' }}` or `{{ nodeStatus == 'SUCCESS' and env != 'dev' }}`.
//! The reference engine accepts the familiar template surface (single-quoted
//! strings, `and`/`or`/`not`) and maps it onto rhai's expression syntax
//! before compiling.

use rhai::{Dynamic, Engine, Scope};
use serde_json::Value;

use crate::dag::Namespace;
use crate::errors::{Error, Result};

/// String/bool expression evaluation over a namespace.
///
/// Implementations must support variable interpolation, equality and
/// boolean connectives over injected variables, and must surface
/// unresolved identifiers as errors rather than silently-empty output.
pub trait TemplateEngine: Send + Sync {
    /// Render the expression to a string, trimmed of surrounding
    /// whitespace.
    fn evaluate_string(&self, expression: &str, namespace: &Namespace) -> Result<String>;

    /// Render the expression and coerce the trimmed result to a boolean:
    /// empty ⇒ `false`; case-insensitive `true|1|yes|on` ⇒ `true`;
    /// `false|0|no|off` ⇒ `false`; any other non-empty string ⇒ `true`.
    fn evaluate_bool(&self, expression: &str, namespace: &Namespace) -> Result<bool>;

    /// Check the expression's syntax. An empty expression is valid.
    fn validate(&self, expression: &str) -> Result<()>;
}

/// Reference engine: rhai expression evaluation inside `{{ … }}` segments,
/// literal text passed through.
pub struct RhaiTemplateEngine {
    engine: Engine,
}

impl RhaiTemplateEngine {
    pub fn new() -> Self {
        Self {
            engine: Engine::new(),
        }
    }

    fn render(&self, template: &str, namespace: &Namespace) -> Result<String> {
        let mut out = String::new();
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                return Err(invalid(template, "unterminated `{{` expression"));
            };
            let value = self.eval_segment(template, &after[..end], namespace)?;
            out.push_str(&value);
            rest = &after[end + 2..];
        }
        out.push_str(rest);

        Ok(out)
    }

    fn eval_segment(
        &self,
        template: &str,
        segment: &str,
        namespace: &Namespace,
    ) -> Result<String> {
        if segment.trim().is_empty() {
            return Err(invalid(template, "empty expression"));
        }

        let expr = normalize(segment);
        let mut scope = build_scope(namespace);

        let result: Dynamic = self
            .engine
            .eval_expression_with_scope(&mut scope, &expr)
            .map_err(|e| invalid(template, &e.to_string()))?;

        Ok(dynamic_to_string(&result))
    }
}

impl Default for RhaiTemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine for RhaiTemplateEngine {
    fn evaluate_string(&self, expression: &str, namespace: &Namespace) -> Result<String> {
        Ok(self.render(expression, namespace)?.trim().to_string())
    }

    fn evaluate_bool(&self, expression: &str, namespace: &Namespace) -> Result<bool> {
        let rendered = self.render(expression, namespace)?;
        let trimmed = rendered.trim();

        if trimmed.is_empty() {
            return Ok(false);
        }

        match trimmed.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Ok(true),
        }
    }

    fn validate(&self, expression: &str) -> Result<()> {
        let mut rest = expression;

        while let Some(start) = rest.find("{{") {
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                return Err(invalid(expression, "unterminated `{{` expression"));
            };
            let segment = &after[..end];
            if segment.trim().is_empty() {
                return Err(invalid(expression, "empty expression"));
            }
            self.engine
                .compile_expression(&normalize(segment))
                .map_err(|e| invalid(expression, &e.to_string()))?;
            rest = &after[end + 2..];
        }

        Ok(())
    }
}

fn invalid(expression: &str, reason: &str) -> Error {
    Error::InvalidExpression {
        expression: expression.to_string(),
        reason: reason.to_string(),
    }
}

fn build_scope(namespace: &Namespace) -> Scope<'static> {
    let mut scope = Scope::new();
    for (key, value) in namespace {
        scope.push_dynamic(key.clone(), json_to_dynamic(value));
    }
    scope
}

fn json_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => (*b).into(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Dynamic::from(i)
            } else {
                Dynamic::from(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => s.clone().into(),
        Value::Array(items) => {
            let arr: rhai::Array = items.iter().map(json_to_dynamic).collect();
            Dynamic::from(arr)
        }
        Value::Object(map) => {
            let mut out = rhai::Map::new();
            for (k, v) in map {
                out.insert(k.as_str().into(), json_to_dynamic(v));
            }
            Dynamic::from(out)
        }
    }
}

fn dynamic_to_string(value: &Dynamic) -> String {
    if value.is_unit() {
        String::new()
    } else if let Some(s) = value.clone().try_cast::<String>() {
        s
    } else {
        value.to_string()
    }
}

/// Map the template surface syntax onto rhai's: single-quoted string
/// literals become double-quoted, and the word operators `and`/`or`/`not`
/// become `&&`/`||`/`!`. String literal contents are left untouched.
fn normalize(segment: &str) -> String {
    let chars: Vec<char> = segment.chars().collect();
    let mut out = String::with_capacity(segment.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' {
            out.push('"');
            i += 1;
            while i < chars.len() {
                match chars[i] {
                    '\\' if i + 1 < chars.len() => {
                        out.push('\\');
                        out.push(chars[i + 1]);
                        i += 2;
                    }
                    '\'' => {
                        out.push('"');
                        i += 1;
                        break;
                    }
                    '"' => {
                        out.push_str("\\\"");
                        i += 1;
                    }
                    other => {
                        out.push(other);
                        i += 1;
                    }
                }
            }
            continue;
        }

        if c == '"' {
            out.push(c);
            i += 1;
            while i < chars.len() {
                let c = chars[i];
                if c == '\\' && i + 1 < chars.len() {
                    out.push(c);
                    out.push(chars[i + 1]);
                    i += 2;
                    continue;
                }
                out.push(c);
                i += 1;
                if c == '"' {
                    break;
                }
            }
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            match word.as_str() {
                "and" => out.push_str("&&"),
                "or" => out.push_str("||"),
                "not" => out.push('!'),
                _ => out.push_str(&word),
            }
            continue;
        }

        out.push(c);
        i += 1;
    }

    out
}
