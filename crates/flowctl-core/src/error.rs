use thiserror::Error;

/// Errors raised while parsing, validating, or evaluating a flow.
///
/// Variants line up with the error kinds a caller needs to match on
/// distinctly; `flowctl-runner` adds its own variants for discovery/remote
/// failures on top of these.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("schema error: {0}")]
    SchemaError(String),

    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    #[error("unresolved expression: {0}")]
    UnresolvedExpression(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("argument misuse: {0}")]
    ArgumentMisuse(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FlowError>;
