use std::collections::HashMap;

use crate::error::{FlowError, Result};

/// The result of evaluating a restricted expression against a [`Scope`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    Map(HashMap<String, Value>),
}

impl Value {
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Map(_) => "<map>".to_string(),
        }
    }
}

/// A layered name-resolution environment: project, flow defaults, and
/// per-entity frames are pushed as children of one another. Lookup walks
/// from the innermost frame outward, so a more specific frame shadows a
/// name bound further out.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    frames: Vec<HashMap<String, Value>>,
}

impl Scope {
    pub fn root() -> Self {
        Scope { frames: Vec::new() }
    }

    /// Returns a new scope with one more frame pushed on top of this one.
    pub fn child(&self, frame: HashMap<String, Value>) -> Self {
        let mut frames = self.frames.clone();
        frames.push(frame);
        Scope { frames }
    }

    /// Binds a single top-level name (e.g. `"project"`, `"flow"`) in a new
    /// frame on top of this scope.
    pub fn bind(&self, name: impl Into<String>, value: Value) -> Self {
        let mut frame = HashMap::new();
        frame.insert(name.into(), value);
        self.child(frame)
    }

    fn lookup_head(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|f| f.get(name))
    }

    /// Evaluates a restricted expression: an identifier chain (`a.b.c`), a
    /// quoted string literal, or a boolean literal.
    pub fn eval(&self, src: &str) -> Result<Value> {
        let src = src.trim();
        if src.is_empty() {
            return Err(FlowError::UnresolvedExpression(
                "empty expression".to_string(),
            ));
        }
        if src == "true" {
            return Ok(Value::Bool(true));
        }
        if src == "false" {
            return Ok(Value::Bool(false));
        }
        if let Some(lit) = string_literal(src) {
            return Ok(Value::Str(lit.to_string()));
        }
        self.eval_chain(src)
    }

    fn eval_chain(&self, src: &str) -> Result<Value> {
        let mut parts = src.split('.');
        let head = parts.next().filter(|s| is_identifier(s)).ok_or_else(|| {
            FlowError::UnresolvedExpression(format!("'{src}' is not a valid expression"))
        })?;

        let mut current = self
            .lookup_head(head)
            .cloned()
            .ok_or_else(|| FlowError::UnresolvedExpression(head.to_string()))?;

        let mut resolved_path = head.to_string();
        for segment in parts {
            if !is_identifier(segment) {
                return Err(FlowError::UnresolvedExpression(format!(
                    "'{src}' is not a valid expression"
                )));
            }
            resolved_path.push('.');
            resolved_path.push_str(segment);
            current = match current {
                Value::Map(ref map) => map
                    .get(segment)
                    .cloned()
                    .ok_or_else(|| FlowError::UnresolvedExpression(resolved_path.clone()))?,
                _ => return Err(FlowError::UnresolvedExpression(resolved_path.clone())),
            };
        }
        Ok(current)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn string_literal(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'\'' || first == b'"') && first == last {
            return Some(&s[1..s.len() - 1]);
        }
    }
    None
}

/// Merges a per-job environment map over a flow-level one: job entries win.
pub fn merge_env(
    flow_env: &HashMap<String, String>,
    job_env: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged = flow_env.clone();
    merged.extend(job_env.clone());
    merged
}

/// Unions two tag sets, deduplicating.
pub fn union_tags(
    a: impl IntoIterator<Item = String>,
    b: impl IntoIterator<Item = String>,
) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    for t in a.into_iter().chain(b) {
        seen.insert(t);
    }
    seen.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_scope() -> Scope {
        let mut flow = HashMap::new();
        flow.insert("id".to_string(), Value::Str("my-flow".to_string()));
        let mut env = HashMap::new();
        env.insert("FOO".to_string(), Value::Str("bar".to_string()));
        flow.insert("env".to_string(), Value::Map(env));

        Scope::root().bind("flow", Value::Map(flow))
    }

    #[test]
    fn resolves_identifier_chain() {
        let scope = sample_scope();
        assert_eq!(
            scope.eval("flow.id").unwrap(),
            Value::Str("my-flow".to_string())
        );
        assert_eq!(
            scope.eval("flow.env.FOO").unwrap(),
            Value::Str("bar".to_string())
        );
    }

    #[test]
    fn unknown_name_fails_with_diagnostic() {
        let scope = sample_scope();
        let err = scope.eval("flow.missing").unwrap_err();
        assert!(matches!(err, FlowError::UnresolvedExpression(ref s) if s == "flow.missing"));
    }

    #[test]
    fn literals() {
        let scope = Scope::root();
        assert_eq!(scope.eval("true").unwrap(), Value::Bool(true));
        assert_eq!(
            scope.eval("'hello'").unwrap(),
            Value::Str("hello".to_string())
        );
    }

    #[test]
    fn inner_frame_shadows_outer() {
        let outer = Scope::root().bind("x", Value::Str("outer".to_string()));
        let inner = outer.bind("x", Value::Str("inner".to_string()));
        assert_eq!(inner.eval("x").unwrap(), Value::Str("inner".to_string()));
    }

    #[test]
    fn env_merge_job_wins() {
        let mut flow_env = HashMap::new();
        flow_env.insert("A".to_string(), "flow".to_string());
        flow_env.insert("B".to_string(), "flow".to_string());
        let mut job_env = HashMap::new();
        job_env.insert("B".to_string(), "job".to_string());

        let merged = merge_env(&flow_env, &job_env);
        assert_eq!(merged.get("A").unwrap(), "flow");
        assert_eq!(merged.get("B").unwrap(), "job");
    }
}
