//! Sandbox runtime: per-call console capture around a pluggable evaluator

use crate::capabilities::CapabilitySet;
use crate::console::{ConsoleCapture, ConsoleSink, LogLevel, StdConsole};
use crate::isolate::V8Evaluator;
use crate::{Result, SnippetEvaluator};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Wall-clock budget for a single snippet
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(750);

/// Configuration for the sandbox
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Maximum execution time
    pub timeout: Duration,
    /// V8 heap limit in bytes
    pub max_heap_size: usize,
    /// Maximum size of the encoded return value in bytes
    pub max_output_size: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_heap_size: 32 * 1024 * 1024, // 32MB
            max_output_size: 1024 * 1024,    // 1MB
        }
    }
}

/// The sandbox runtime.
///
/// Owns an evaluator and the host console sink. Every call gets its own
/// capture buffers; nothing is shared between calls except the sink, which is
/// written only after the snippet has finished.
#[derive(Clone)]
pub struct SandboxRuntime {
    evaluator: Arc<dyn SnippetEvaluator>,
    sink: Arc<dyn ConsoleSink>,
}

impl SandboxRuntime {
    /// Create a V8-backed runtime with the default (empty) capability set
    pub fn new(config: SandboxConfig) -> Self {
        Self::with_capabilities(config, CapabilitySet::default())
    }

    pub fn with_capabilities(config: SandboxConfig, capabilities: CapabilitySet) -> Self {
        Self {
            evaluator: Arc::new(V8Evaluator::new(config).with_capabilities(capabilities)),
            sink: Arc::new(StdConsole),
        }
    }

    /// Use a different evaluator, e.g. a stub in tests
    pub fn with_evaluator(evaluator: Arc<dyn SnippetEvaluator>) -> Self {
        Self {
            evaluator,
            sink: Arc::new(StdConsole),
        }
    }

    /// Send flushed snippet output somewhere other than the process console
    pub fn with_sink(mut self, sink: Arc<dyn ConsoleSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Evaluate `body` with `bindings` as its only variables.
    ///
    /// Console output from the snippet is buffered and written to the sink
    /// after the evaluation finishes, success or failure, and only when
    /// `allow_logging` is set. The return value is not validated here.
    pub fn safe_eval(
        &self,
        body: &str,
        bindings: &Map<String, Value>,
        allow_logging: bool,
    ) -> Result<Value> {
        let eval_id = Uuid::new_v4();
        let span = tracing::debug_span!("safe_eval", %eval_id, body_len = body.len());
        let _guard = span.enter();

        let mut console = ConsoleCapture::new();
        let result = self.evaluator.evaluate(body, bindings, &mut console);

        if allow_logging {
            console.flush_to(self.sink.as_ref());
        } else if !console.is_empty() {
            for level in LogLevel::ALL {
                let lines = console.lines(level).len();
                if lines > 0 {
                    tracing::debug!(level = level.as_str(), lines, "discarding snippet console output");
                }
            }
        }

        match &result {
            Ok(_) => tracing::debug!("snippet evaluation complete"),
            Err(e) => tracing::error!(error = %e, "snippet evaluation failed"),
        }
        result
    }
}
