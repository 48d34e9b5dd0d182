use thiserror::Error;

/// Errors raised by the live controller, the graph core, and the
/// volume/image driver. Wraps [`flowctl_core::FlowError`] for the errors
/// shared with parsing/evaluation.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Flow(#[from] flowctl_core::FlowError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("argument misuse: {0}")]
    ArgumentMisuse(String),

    #[error("dependency cycle: {0}")]
    CycleError(String),

    #[error("{0}")]
    LocalDepError(String),

    #[error("Image ref '{0}' is duplicated")]
    DuplicateImageRef(String),

    #[error("authorization error: {0}")]
    Authorization(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("image '{0}' has no dockerfile")]
    MissingDockerfile(String),

    #[error("command failed ({status}): {argv}")]
    CommandFailed { argv: String, status: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RunnerError>;

impl RunnerError {
    /// True for the two role-creation outcomes that §7 says must be
    /// swallowed rather than propagated.
    pub fn is_swallowable_role_error(&self) -> bool {
        matches!(self, RunnerError::AlreadyExists(_) | RunnerError::Authorization(_))
    }
}
