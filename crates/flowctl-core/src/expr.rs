use crate::error::{FlowError, Result};
use crate::scope::{Scope, Value};
use crate::types::{LocalPath, RemotePath, Uri};

/// A type a scalar YAML field may be coerced to, either directly from its
/// literal source text or from the result of evaluating a template.
pub trait ExprValue: Sized + Clone {
    /// Coerce a non-templated source string directly.
    fn from_literal(s: &str) -> Result<Self>;

    /// Coerce the value produced by evaluating `${{ <expr> }}` in a scope.
    fn from_value(v: &Value) -> Result<Self>;
}

impl ExprValue for String {
    fn from_literal(s: &str) -> Result<Self> {
        Ok(s.to_string())
    }

    fn from_value(v: &Value) -> Result<Self> {
        match v {
            Value::Str(s) => Ok(s.clone()),
            other => Ok(other.to_display_string()),
        }
    }
}

impl ExprValue for i64 {
    fn from_literal(s: &str) -> Result<Self> {
        s.parse::<i64>()
            .map_err(|_| FlowError::SchemaError(format!("'{s}' is not an integer")))
    }

    fn from_value(v: &Value) -> Result<Self> {
        match v {
            Value::Int(n) => Ok(*n),
            Value::Str(s) => Self::from_literal(s),
            other => Err(FlowError::UnresolvedExpression(format!(
                "expected integer, got {other:?}"
            ))),
        }
    }
}

impl ExprValue for f64 {
    fn from_literal(s: &str) -> Result<Self> {
        let v: f64 = s
            .parse()
            .map_err(|_| FlowError::SchemaError(format!("'{s}' is not a float")))?;
        if v.is_nan() || v.is_infinite() {
            return Err(FlowError::SchemaError(format!(
                "'{s}' is not a finite float"
            )));
        }
        Ok(v)
    }

    fn from_value(v: &Value) -> Result<Self> {
        match v {
            Value::Float(f) => Ok(*f),
            Value::Int(n) => Ok(*n as f64),
            Value::Str(s) => Self::from_literal(s),
            other => Err(FlowError::UnresolvedExpression(format!(
                "expected float, got {other:?}"
            ))),
        }
    }
}

impl ExprValue for bool {
    fn from_literal(s: &str) -> Result<Self> {
        match s {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(FlowError::SchemaError(format!(
                "'{s}' is not 'true' or 'false'"
            ))),
        }
    }

    fn from_value(v: &Value) -> Result<Self> {
        match v {
            Value::Bool(b) => Ok(*b),
            other => Err(FlowError::UnresolvedExpression(format!(
                "expected boolean, got {other:?}"
            ))),
        }
    }
}

impl ExprValue for LocalPath {
    fn from_literal(s: &str) -> Result<Self> {
        LocalPath::parse(s)
    }

    fn from_value(v: &Value) -> Result<Self> {
        LocalPath::parse(&v.to_display_string())
    }
}

impl ExprValue for RemotePath {
    fn from_literal(s: &str) -> Result<Self> {
        RemotePath::parse(s)
    }

    fn from_value(v: &Value) -> Result<Self> {
        RemotePath::parse(&v.to_display_string())
    }
}

impl ExprValue for Uri {
    fn from_literal(s: &str) -> Result<Self> {
        Uri::parse(s)
    }

    fn from_value(v: &Value) -> Result<Self> {
        Uri::parse(&v.to_display_string())
    }
}

/// A late-bound scalar: either the literal value coerced at parse time, or
/// a template whose evaluation is deferred to a scope.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression<T> {
    Literal(T),
    Template(String),
}

impl<T: ExprValue> Expression<T> {
    /// Parses `src`, detecting the `${{ <expr> }}` template form. Construction
    /// is total for templates (the inner grammar isn't checked until eval);
    /// literal construction fails immediately if coercion fails.
    pub fn parse(src: &str) -> Result<Self> {
        let trimmed = src.trim();
        if let Some(inner) = template_inner(trimmed) {
            Ok(Expression::Template(inner.to_string()))
        } else {
            Ok(Expression::Literal(T::from_literal(src)?))
        }
    }

    pub fn literal(value: T) -> Self {
        Expression::Literal(value)
    }

    pub fn eval(&self, scope: &Scope) -> Result<T> {
        match self {
            Expression::Literal(v) => Ok(v.clone()),
            Expression::Template(src) => {
                let value = scope.eval(src)?;
                T::from_value(&value)
            }
        }
    }
}

/// Returns the inner expression source if `s` is of the form `${{ ... }}`.
fn template_inner(s: &str) -> Option<&str> {
    let s = s.strip_prefix("${{")?;
    let s = s.strip_suffix("}}")?;
    Some(s.trim())
}

/// An expression that may legitimately be absent. `eval` on an absent value
/// yields `None` rather than failing.
#[derive(Debug, Clone, PartialEq)]
pub struct Opt<T>(pub Option<Expression<T>>);

impl<T: ExprValue> Opt<T> {
    pub fn absent() -> Self {
        Opt(None)
    }

    pub fn parse(src: Option<&str>) -> Result<Self> {
        match src {
            None => Ok(Opt(None)),
            Some(s) => Ok(Opt(Some(Expression::parse(s)?))),
        }
    }

    pub fn eval(&self, scope: &Scope) -> Result<Option<T>> {
        match &self.0 {
            None => Ok(None),
            Some(expr) => expr.eval(scope).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Scope;

    #[test]
    fn literal_construction_and_eval() {
        let e: Expression<i64> = Expression::parse("42").unwrap();
        let scope = Scope::root();
        assert_eq!(e.eval(&scope).unwrap(), 42);
    }

    #[test]
    fn detects_template_form() {
        let e: Expression<String> = Expression::parse("${{ flow.id }}").unwrap();
        assert!(matches!(e, Expression::Template(ref s) if s == "flow.id"));
    }

    #[test]
    fn opt_absent_yields_none() {
        let o: Opt<String> = Opt::parse(None).unwrap();
        let scope = Scope::root();
        assert_eq!(o.eval(&scope).unwrap(), None);
    }

    #[test]
    fn bool_literal_rejects_non_bool() {
        let res: Result<Expression<bool>> = Expression::parse("maybe");
        assert!(res.is_err());
    }
}
