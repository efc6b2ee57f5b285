//! V8 isolate evaluator
//!
//! Every evaluation builds a fresh `JsRuntime`, so nothing a snippet does can
//! leak into the next call. V8 isolates are `!Send`: the runtime is created,
//! used and dropped on the calling thread. Only the watchdog that enforces the
//! wall-clock budget runs elsewhere, and it is joined before the isolate goes
//! away. Once the watchdog is gone no more script runs in the isolate.

use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;

use deno_core::error::{AnyError, JsError};
use deno_core::{v8, JsRuntime, RuntimeOptions};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::capabilities::CapabilitySet;
use crate::console::{ConsoleCapture, LogLevel};
use crate::runtime::SandboxConfig;
use crate::{Result, SandboxError, SnippetEvaluator};

const BOOTSTRAP_SCRIPT: &str = "[gauge:bootstrap]";
const LOCKDOWN_SCRIPT: &str = "[gauge:lockdown]";
const SNIPPET_SCRIPT: &str = "[gauge:snippet]";

/// Installs the console shim, the `__gauge` helper and the argument bundle,
/// and evaluates to the console buffers.
///
/// The bundle arrives as JSON text and goes through `JSON.parse`, so a
/// `__proto__` key stays an own data property. Every primitive the helpers
/// use is captured before the bundle lands. The buffers and their line lists
/// have no prototype, so reading them back never reaches snippet code.
const BOOTSTRAP: &str = r#"(text, removed) => {
  const stringify = JSON.stringify;
  const parse = JSON.parse;
  const defineProperty = Object.defineProperty;
  const freeze = Object.freeze;
  const keys = Object.keys;
  const setPrototypeOf = Object.setPrototypeOf;

  const list = () => setPrototypeOf([], null);
  const buffers = { __proto__: null, log: list(), info: list(), error: list(), warn: list() };

  const format = (args) => args.map((arg) => {
    if (typeof arg === 'string') return arg;
    try {
      const text = stringify(arg);
      return text === undefined ? String(arg) : text;
    } catch (_) {
      return String(arg);
    }
  }).join(' ');
  const capture = (level) => (...args) => {
    const lines = buffers[level];
    lines[lines.length] = format(args);
  };

  const describe = (err) => {
    if (err !== null && typeof err === 'object') {
      return {
        name: typeof err.name === 'string' ? err.name : 'Error',
        message: 'message' in err ? String(err.message) : String(err),
      };
    }
    return { name: 'Error', message: String(err) };
  };

  const denied = new Set(removed);
  const bindings = parse(text);
  for (const key of keys(bindings)) {
    if (denied.has(key)) continue;
    try {
      defineProperty(globalThis, key, {
        value: bindings[key], writable: true, enumerable: true, configurable: true,
      });
    } catch (_) {}
  }

  defineProperty(globalThis, 'console', {
    value: freeze({
      log: capture('log'),
      info: capture('info'),
      error: capture('error'),
      warn: capture('warn'),
      debug: capture('log'),
    }),
    writable: true,
    configurable: true,
    enumerable: false,
  });

  defineProperty(globalThis, '__gauge', {
    value: freeze({
      ok: (value) => stringify({ ok: value === undefined ? null : value }),
      fail: (err) => stringify({ error: describe(err) }),
    }),
    writable: false,
    configurable: true,
    enumerable: false,
  });

  return buffers;
}"#;

/// Wrap a snippet body as the sole statement list of an immediately-invoked
/// function. The outer frame takes the `__gauge` helper off the global
/// object before the body runs and turns the outcome into a JSON envelope.
fn wrap_snippet(body: &str) -> String {
    format!(
        "(() => {{\n  const __gauge = globalThis.__gauge;\n  delete globalThis.__gauge;\n  try {{\n    return __gauge.ok((() => {{\n{}\n}})());\n  }} catch (e) {{\n    return __gauge.fail(e);\n  }}\n}})()",
        body
    )
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    ok: Option<Value>,
    #[serde(default)]
    error: Option<ScriptFailure>,
}

#[derive(Debug, Deserialize)]
struct ScriptFailure {
    name: String,
    message: String,
}

/// State for the near-heap-limit callback.
struct HeapLimitState {
    handle: v8::IsolateHandle,
    triggered: AtomicBool,
}

/// Terminates execution once and grants 1MB so the termination can unwind.
extern "C" fn near_heap_limit_callback(
    data: *mut c_void,
    current_heap_limit: usize,
    _initial_heap_limit: usize,
) -> usize {
    // SAFETY: `data` points at the boxed `HeapLimitState` owned by
    // `V8Evaluator::evaluate`, which drops the runtime before the box.
    let state = unsafe { &*(data as *const HeapLimitState) };
    if !state.triggered.swap(true, Ordering::SeqCst) {
        state.handle.terminate_execution();
    }
    current_heap_limit + 1024 * 1024
}

/// Evaluates snippets in a fresh V8 isolate per call
#[derive(Debug, Clone, Default)]
pub struct V8Evaluator {
    config: SandboxConfig,
    capabilities: CapabilitySet,
}

impl V8Evaluator {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            capabilities: CapabilitySet::default(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    fn create_runtime(&self) -> JsRuntime {
        let create_params = v8::CreateParams::default().heap_limits(0, self.config.max_heap_size);
        JsRuntime::new(RuntimeOptions {
            create_params: Some(create_params),
            ..Default::default()
        })
    }

    fn bootstrap_source(&self, bindings: &Map<String, Value>) -> Result<String> {
        let text = serde_json::to_string(&serde_json::to_string(bindings)?)?;
        let removed = serde_json::to_string(&self.capabilities.removed_globals())?;
        Ok(format!("({})({}, {});", BOOTSTRAP, text, removed))
    }

    fn run(
        &self,
        runtime: &mut JsRuntime,
        body: &str,
        bindings: &Map<String, Value>,
        console: &mut ConsoleCapture,
        heap_state: &HeapLimitState,
    ) -> Result<Value> {
        runtime
            .execute_script(LOCKDOWN_SCRIPT, self.capabilities.lockdown_script()?)
            .map_err(|e| SandboxError::Bootstrap(e.to_string()))?;
        let buffers = runtime
            .execute_script(BOOTSTRAP_SCRIPT, self.bootstrap_source(bindings)?)
            .map_err(|e| SandboxError::Bootstrap(e.to_string()))?;

        let (executed, timed_out) = self.execute_with_watchdog(runtime, wrap_snippet(body));

        runtime.v8_isolate().cancel_terminate_execution();
        read_console(runtime, &buffers, console);

        if heap_state.triggered.load(Ordering::SeqCst) {
            return Err(SandboxError::HeapLimitExceeded);
        }

        let raw = match executed {
            Ok(raw) => raw,
            Err(_) if timed_out => {
                return Err(SandboxError::Timeout(self.config.timeout.as_millis() as u64))
            }
            Err(err) => return Err(err),
        };

        if raw.len() > self.config.max_output_size {
            return Err(SandboxError::Output(format!(
                "result of {} bytes exceeds the {} byte limit",
                raw.len(),
                self.config.max_output_size
            )));
        }

        let envelope: Envelope = serde_json::from_str(&raw)?;
        if let Some(failure) = envelope.error {
            return Err(SandboxError::Script {
                name: failure.name,
                message: failure.message,
            });
        }
        Ok(envelope.ok.unwrap_or(Value::Null))
    }

    /// Run the wrapped snippet while a watchdog thread waits out the budget.
    /// Returns the raw envelope (or the uncaught error) and whether the
    /// watchdog fired.
    fn execute_with_watchdog(&self, runtime: &mut JsRuntime, source: String) -> (Result<String>, bool) {
        let handle = runtime.v8_isolate().thread_safe_handle();
        let timed_out = Arc::new(AtomicBool::new(false));
        let watchdog_timed_out = timed_out.clone();
        let timeout = self.config.timeout;
        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();

        let watchdog = std::thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(timeout) {
                watchdog_timed_out.store(true, Ordering::SeqCst);
                handle.terminate_execution();
            }
        });

        let executed = match runtime.execute_script(SNIPPET_SCRIPT, source) {
            Ok(value) => global_to_string(runtime, &value).ok_or_else(|| {
                SandboxError::Output("snippet envelope was not a string".to_string())
            }),
            Err(e) => Err(script_error(&e)),
        };

        // The watchdog holds an isolate handle; it must be gone before the isolate is.
        let _ = cancel_tx.send(());
        if watchdog.join().is_err() {
            tracing::warn!("sandbox watchdog thread panicked");
        }

        (executed, timed_out.load(Ordering::SeqCst))
    }
}

impl SnippetEvaluator for V8Evaluator {
    fn evaluate(
        &self,
        body: &str,
        bindings: &Map<String, Value>,
        console: &mut ConsoleCapture,
    ) -> Result<Value> {
        let mut runtime = self.create_runtime();
        let heap_state = Box::new(HeapLimitState {
            handle: runtime.v8_isolate().thread_safe_handle(),
            triggered: AtomicBool::new(false),
        });
        runtime.v8_isolate().add_near_heap_limit_callback(
            near_heap_limit_callback,
            &*heap_state as *const HeapLimitState as *mut c_void,
        );

        let outcome = self.run(&mut runtime, body, bindings, console, &heap_state);
        drop(runtime);
        outcome
    }
}

/// Map an uncaught exception to a `Script` error, preferring the structured
/// fields of the engine's `JsError`.
fn script_error(err: &AnyError) -> SandboxError {
    match err.downcast_ref::<JsError>() {
        Some(JsError {
            name: Some(name),
            message: Some(message),
            ..
        }) => SandboxError::Script {
            name: name.clone(),
            message: message.clone(),
        },
        Some(js) => SandboxError::from_uncaught(&js.exception_message),
        None => SandboxError::from_uncaught(&err.to_string()),
    }
}

/// Only string values are converted; anything else would call back into JS.
fn global_to_string(runtime: &mut JsRuntime, value: &v8::Global<v8::Value>) -> Option<String> {
    let scope = &mut runtime.handle_scope();
    let local = v8::Local::new(scope, value);
    if local.is_string() {
        Some(local.to_rust_string_lossy(scope))
    } else {
        None
    }
}

/// Copy what the snippet logged out of the prototype-less buffers through
/// the V8 API. No script runs here: prototype hooks and queued microtasks
/// left by the snippet get no further turn.
fn read_console(runtime: &mut JsRuntime, buffers: &v8::Global<v8::Value>, console: &mut ConsoleCapture) {
    let scope = &mut runtime.handle_scope();
    let buffers = v8::Local::new(scope, buffers);
    let Ok(buffers) = v8::Local::<v8::Object>::try_from(buffers) else {
        tracing::warn!("snippet console buffers missing");
        return;
    };

    for level in LogLevel::ALL {
        let Some(key) = v8::String::new(scope, level.as_str()) else {
            continue;
        };
        let Some(lines) = buffers.get(scope, key.into()) else {
            continue;
        };
        let Ok(lines) = v8::Local::<v8::Array>::try_from(lines) else {
            continue;
        };
        for index in 0..lines.length() {
            match lines.get_index(scope, index) {
                Some(line) if line.is_string() => {
                    let line = line.to_rust_string_lossy(scope);
                    console.push(level, line);
                }
                _ => {}
            }
        }
    }
}
