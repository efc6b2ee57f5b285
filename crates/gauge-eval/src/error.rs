//! Error taxonomy for snippet evaluation

use gauge_sandbox::SandboxError;

/// Message used when a transform returns anything but an array
pub const TRANSFORM_NOT_ARRAY: &str = "The transform function must return an array.";

/// Message used when a toUrl snippet returns anything but a string
pub const TO_URL_NOT_STRING: &str = "The toUrl function must return a string";

/// Errors from validating, running and checking snippets.
///
/// `Display` is the bare human-readable message; `name()` gives the
/// error kind the collector reports alongside it.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// The snippet body was not a string. Raised before any sandbox work.
    #[error("{0}")]
    InvalidBody(String),

    /// Anything raised inside the sandbox, timeout included
    #[error("{0}")]
    FunctionBody(String),

    /// The argument bundle failed its preconditions
    #[error("{0}")]
    Args(String),

    /// A transform returned the wrong shape, or a sample failed the schema
    #[error("{0}")]
    Transform(String),

    /// Cardinality, duplicate or membership violations, and other
    /// template-level validation failures
    #[error("{0}")]
    Validation(String),

    /// A toUrl snippet did not return a string
    #[error("{0}")]
    ToUrl(String),

    #[error("Invalid status pattern {pattern:?}: {source}")]
    StatusPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl EvalError {
    /// Kind name as reported to template authors
    pub fn name(&self) -> &'static str {
        match self {
            EvalError::InvalidBody(_) | EvalError::FunctionBody(_) => "FunctionBodyError",
            EvalError::Args(_) => "ArgsError",
            EvalError::Transform(_) => "TransformError",
            EvalError::Validation(_) => "ValidationError",
            EvalError::ToUrl(_) => "ToUrlError",
            EvalError::StatusPattern { .. } => "StatusPatternError",
            EvalError::Config(_) => "ConfigError",
        }
    }
}

impl From<SandboxError> for EvalError {
    fn from(err: SandboxError) -> Self {
        EvalError::FunctionBody(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EvalError>;
