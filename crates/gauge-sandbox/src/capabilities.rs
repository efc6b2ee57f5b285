//! Capability-based scope policy
//!
//! A snippet starts with the language built-ins and its argument bundle,
//! nothing else. Host primitives that could reach outside the isolate, or
//! generate code at runtime, are stripped from the global scope unless a
//! capability explicitly grants them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Optional runtime primitives a snippet may be granted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// `eval`, the `Function` global and the function constructors reachable
    /// through prototype chains
    CodeGeneration,
    /// The `WebAssembly` namespace
    WebAssembly,
    /// `SharedArrayBuffer` and `Atomics`
    SharedMemory,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::CodeGeneration,
        Capability::WebAssembly,
        Capability::SharedMemory,
    ];

    /// Global bindings that belong to this capability
    pub fn globals(&self) -> &'static [&'static str] {
        match self {
            Capability::CodeGeneration => &["eval", "Function"],
            Capability::WebAssembly => &["WebAssembly"],
            Capability::SharedMemory => &["SharedArrayBuffer", "Atomics"],
        }
    }
}

/// ECMAScript global bindings a snippet always keeps. Capability globals are
/// not listed here; they survive only when granted.
pub(crate) const ECMASCRIPT_GLOBALS: &[&str] = &[
    "globalThis",
    "Infinity",
    "NaN",
    "undefined",
    "isFinite",
    "isNaN",
    "parseFloat",
    "parseInt",
    "decodeURI",
    "decodeURIComponent",
    "encodeURI",
    "encodeURIComponent",
    "escape",
    "unescape",
    "Object",
    "Array",
    "Boolean",
    "Number",
    "BigInt",
    "String",
    "Symbol",
    "Date",
    "RegExp",
    "Promise",
    "Proxy",
    "Reflect",
    "JSON",
    "Math",
    "Intl",
    "Iterator",
    "Map",
    "Set",
    "WeakMap",
    "WeakSet",
    "WeakRef",
    "FinalizationRegistry",
    "Error",
    "AggregateError",
    "EvalError",
    "RangeError",
    "ReferenceError",
    "SyntaxError",
    "TypeError",
    "URIError",
    "SuppressedError",
    "DisposableStack",
    "AsyncDisposableStack",
    "ArrayBuffer",
    "DataView",
    "Int8Array",
    "Uint8Array",
    "Uint8ClampedArray",
    "Int16Array",
    "Uint16Array",
    "Int32Array",
    "Uint32Array",
    "Float16Array",
    "Float32Array",
    "Float64Array",
    "BigInt64Array",
    "BigUint64Array",
];

/// Host bridges, scheduling and module-system names that never survive into
/// a snippet, even when the argument bundle carries a key of the same name
const ALWAYS_REMOVED: &[&str] = &[
    "Deno",
    "__bootstrap",
    "__infra",
    "require",
    "process",
    "module",
    "exports",
    "__dirname",
    "__filename",
    "fetch",
    "XMLHttpRequest",
    "WebSocket",
    "importScripts",
    "setTimeout",
    "setInterval",
    "setImmediate",
    "clearTimeout",
    "clearInterval",
    "clearImmediate",
    "queueMicrotask",
];

const SEAL_CONSTRUCTORS: &str = r#"
  for (const fn of [function () {}, async function () {}, function* () {}, async function* () {}]) {
    Object.defineProperty(Object.getPrototypeOf(fn), 'constructor', {
      value: undefined, configurable: false, writable: false,
    });
  }
"#;

/// The set of capabilities granted to a snippet. Empty by default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet {
    capabilities: HashSet<Capability>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant a capability
    pub fn grant(&mut self, cap: Capability) -> &mut Self {
        self.capabilities.insert(cap);
        self
    }

    /// Revoke a capability
    pub fn revoke(&mut self, cap: Capability) -> &mut Self {
        self.capabilities.remove(&cap);
        self
    }

    pub fn has(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }

    /// Every global name that must be gone before the snippet runs
    pub fn removed_globals(&self) -> Vec<&'static str> {
        let mut names = ALWAYS_REMOVED.to_vec();
        for cap in Capability::ALL {
            if !self.has(cap) {
                names.extend_from_slice(cap.globals());
            }
        }
        names
    }

    /// Global names allowed to stay: the ECMAScript built-ins and the
    /// globals of granted capabilities
    pub fn kept_globals(&self) -> Vec<&'static str> {
        let mut names = ECMASCRIPT_GLOBALS.to_vec();
        for cap in Capability::ALL {
            if self.has(cap) {
                names.extend_from_slice(cap.globals());
            }
        }
        names
    }

    /// Script that strips the global scope down to what this set allows.
    ///
    /// Runs before the argument bundle is installed: every own global not in
    /// [`kept_globals`](Self::kept_globals) is deleted, whatever the host
    /// runtime put there.
    pub fn lockdown_script(&self) -> serde_json::Result<String> {
        let kept = serde_json::to_string(&self.kept_globals())?;

        let mut script = String::from("(() => {\n");
        if !self.has(Capability::CodeGeneration) {
            script.push_str(SEAL_CONSTRUCTORS);
        }
        script.push_str(&format!(
            r#"  const kept = new Set({kept});
  for (const name of Object.getOwnPropertyNames(globalThis)) {{
    if (!kept.has(name)) {{
      try {{ delete globalThis[name]; }} catch (_) {{}}
    }}
  }}
"#
        ));
        script.push_str("})();\n");
        Ok(script)
    }
}

/// Builder-style grants
impl CapabilitySet {
    pub fn with_code_generation(mut self) -> Self {
        self.grant(Capability::CodeGeneration);
        self
    }

    pub fn with_web_assembly(mut self) -> Self {
        self.grant(Capability::WebAssembly);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_denies_everything() {
        let set = CapabilitySet::default();
        for cap in Capability::ALL {
            assert!(!set.has(cap));
        }
        let removed = set.removed_globals();
        assert!(removed.contains(&"eval"));
        assert!(removed.contains(&"setTimeout"));
        assert!(removed.contains(&"queueMicrotask"));
        assert!(removed.contains(&"Deno"));
        assert!(removed.contains(&"__infra"));
        assert!(removed.contains(&"require"));
    }

    #[test]
    fn test_granted_globals_are_kept() {
        let set = CapabilitySet::new().with_code_generation();
        let removed = set.removed_globals();
        assert!(!removed.contains(&"eval"));
        assert!(!removed.contains(&"Function"));
        assert!(removed.contains(&"WebAssembly"));
        assert!(removed.contains(&"setInterval"));

        let kept = set.kept_globals();
        assert!(kept.contains(&"eval"));
        assert!(!kept.contains(&"WebAssembly"));
    }

    #[test]
    fn test_revoke() {
        let mut set = CapabilitySet::new().with_web_assembly();
        assert!(set.has(Capability::WebAssembly));
        set.revoke(Capability::WebAssembly);
        assert!(!set.has(Capability::WebAssembly));
    }

    #[test]
    fn test_timers_are_not_a_capability() {
        let err = serde_json::from_str::<CapabilitySet>(r#"["timers"]"#).unwrap_err();
        assert!(err.to_string().contains("unknown variant"), "{err}");
    }

    #[test]
    fn test_kept_globals_exclude_host_names() {
        let kept = CapabilitySet::default().kept_globals();
        for name in ALWAYS_REMOVED {
            assert!(!kept.contains(name), "{name}");
        }
        assert!(!kept.contains(&"Function"));
        assert!(!kept.contains(&"console"));
        assert!(kept.contains(&"JSON"));
    }

    #[test]
    fn test_lockdown_script_seals_constructors_only_when_denied() {
        let denied = CapabilitySet::default().lockdown_script().unwrap();
        assert!(denied.contains("'constructor'"));
        assert!(!denied.contains("\"eval\""));
        assert!(denied.contains("\"Math\""));

        let granted = CapabilitySet::new().with_code_generation().lockdown_script().unwrap();
        assert!(!granted.contains("'constructor'"));
        assert!(granted.contains("\"eval\""));
    }
}
