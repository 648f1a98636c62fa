// src/config/dsl.rs

//! Parser for the graph DSL: a subset of the state-diagram grammar.
//!
//! Recognized lines:
//!
//! ```text
//! stateDiagram-v2          (header, ignored)
//! direction LR             (ignored)
//! %% comment               (ignored)
//! note right of X … end note   (block, ignored)
//! [*] --> A                (sentinel endpoint, ignored)
//! A --> B                  (edge)
//! A --> B : label          (edge; a bracketed [expr] in the label makes
//!                           the edge conditional)
//! ```
//!
//! The parser is deliberately forgiving: lines it cannot interpret are
//! skipped, so a malformed graph yields fewer edges instead of failing the
//! build.

/// Sentinel start/end marker of the state-diagram grammar.
const SENTINEL: &str = "[*]";

/// One `From --> To` transition with its optional label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: String,
    pub to: String,
    pub label: String,
}

impl Transition {
    /// Condition expression carried by this transition's label, if any.
    pub fn expression(&self) -> Option<String> {
        extract_expression(&self.label)
    }
}

/// Parse the diagram text into transitions, dropping sentinel endpoints
/// and everything that is not a transition.
pub fn parse_transitions(text: &str) -> Vec<Transition> {
    let mut transitions = Vec::new();
    let mut in_note = false;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if in_note {
            if line == "end note" {
                in_note = false;
            }
            continue;
        }

        if line.starts_with("%%") {
            continue;
        }
        if line.starts_with("stateDiagram") || line.starts_with("direction ") {
            continue;
        }
        if line.starts_with("note ") || line == "note" {
            // Single-line notes ("note right of X: text") have no body.
            if !line.contains(':') {
                in_note = true;
            }
            continue;
        }

        let Some((from_part, rest)) = line.split_once("-->") else {
            continue;
        };

        let from = from_part.trim();
        let (to, label) = match rest.split_once(':') {
            Some((to, label)) => (to.trim(), label.trim()),
            None => (rest.trim(), ""),
        };

        if from.is_empty() || to.is_empty() {
            continue;
        }
        if from == SENTINEL || to == SENTINEL {
            continue;
        }

        transitions.push(Transition {
            from: from.to_string(),
            to: to.to_string(),
            label: label.to_string(),
        });
    }

    transitions
}

/// Extract a condition expression from an edge label.
///
/// The expression is the text between the outermost `[` and its matching
/// `]` (bracket depth is tracked, so nested brackets stay intact).
/// Returns `None` when the label carries no complete bracketed segment.
pub fn extract_expression(label: &str) -> Option<String> {
    let start = label.find('[')?;
    let mut depth = 0usize;

    for (offset, ch) in label[start..].char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    let inner = &label[start + 1..start + offset];
                    if inner.is_empty() {
                        return None;
                    }
                    return Some(inner.to_string());
                }
            }
            _ => {}
        }
    }

    None
}
