//! Gauge Sandbox - isolated snippet evaluation
//!
//! Template snippets run in a fresh V8 isolate per call. No filesystem, no
//! network, no timers, no module system, no `eval`. A watchdog enforces the
//! wall-clock budget and console output is captured, never written live.

mod capabilities;
mod console;
mod isolate;
mod runtime;

pub use capabilities::{Capability, CapabilitySet};
pub use console::{ConsoleCapture, ConsoleSink, LogLevel, StdConsole};
pub use isolate::V8Evaluator;
pub use runtime::{SandboxConfig, SandboxRuntime, DEFAULT_TIMEOUT};

use serde_json::{Map, Value};

/// Errors from sandbox operations
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("Invalid bindings: {0}")]
    InvalidBindings(String),

    #[error("Sandbox bootstrap failed: {0}")]
    Bootstrap(String),

    /// Anything the snippet raised, including syntax errors
    #[error("{name}: {message}")]
    Script { name: String, message: String },

    #[error("Error: Script execution timed out after {0}ms.")]
    Timeout(u64),

    #[error("RangeError: Heap limit exceeded")]
    HeapLimitExceeded,

    #[error("Invalid snippet output: {0}")]
    Output(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SandboxError {
    /// Build a `Script` error from the text of an uncaught exception, e.g.
    /// `Uncaught SyntaxError: Unexpected token ';'` followed by a stack.
    /// Only used when the engine error has no structured name and message.
    pub fn from_uncaught(text: &str) -> Self {
        let first_line = text.lines().next().unwrap_or("").trim();
        let line = first_line.strip_prefix("Uncaught ").unwrap_or(first_line);

        match line.split_once(": ") {
            Some((name, message))
                if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') =>
            {
                SandboxError::Script {
                    name: name.to_string(),
                    message: message.to_string(),
                }
            }
            _ => SandboxError::Script {
                name: "Error".to_string(),
                message: line.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, SandboxError>;

/// An isolated expression evaluator.
///
/// Inputs are a named mapping, the output is a single JSON value, console
/// output goes to the per-call `console` buffer and nothing else is
/// observable outside the call.
pub trait SnippetEvaluator: Send + Sync {
    /// Run `body` as the statement list of an anonymous function whose free
    /// variables are the keys of `bindings`.
    fn evaluate(
        &self,
        body: &str,
        bindings: &Map<String, Value>,
        console: &mut ConsoleCapture,
    ) -> Result<Value>;
}

/// Convert any JSON value into a binding map. Missing bindings mean an empty scope.
pub fn bindings_from_value(value: Option<&Value>) -> Result<Map<String, Value>> {
    match value {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(other) => Err(SandboxError::InvalidBindings(format!(
            "expected an object, got {}",
            json_type_name(other)
        ))),
    }
}

/// JavaScript-flavoured name of a JSON value's type
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_uncaught_syntax_error() {
        let err = SandboxError::from_uncaught(
            "Uncaught SyntaxError: Unexpected token ';'\n    at [gauge:snippet]:4:20",
        );
        match err {
            SandboxError::Script { name, message } => {
                assert_eq!(name, "SyntaxError");
                assert_eq!(message, "Unexpected token ';'");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_from_uncaught_without_name() {
        let err = SandboxError::from_uncaught("execution terminated");
        assert_eq!(err.to_string(), "Error: execution terminated");
    }

    #[test]
    fn test_timeout_message() {
        assert_eq!(
            SandboxError::Timeout(750).to_string(),
            "Error: Script execution timed out after 750ms."
        );
    }

    #[test]
    fn test_bindings_from_value() {
        assert!(bindings_from_value(None).unwrap().is_empty());
        assert!(bindings_from_value(Some(&Value::Null)).unwrap().is_empty());
        let map = bindings_from_value(Some(&json!({ "a": 1 }))).unwrap();
        assert_eq!(map["a"], json!(1));
        assert!(matches!(
            bindings_from_value(Some(&json!([1]))),
            Err(SandboxError::InvalidBindings(_))
        ));
    }
}
