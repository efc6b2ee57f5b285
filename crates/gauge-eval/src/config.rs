//! Evaluation settings a collector can embed in its own configuration

use crate::error::{EvalError, Result};
use crate::samples::SAMPLE_BODY_MAX_LEN;
use gauge_sandbox::{CapabilitySet, SandboxConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Wall-clock budget per snippet
    pub timeout_ms: u64,
    /// V8 heap limit per snippet
    pub max_heap_bytes: usize,
    /// Largest encoded snippet result accepted
    pub max_output_bytes: usize,
    /// Exposed to transforms as `SAMPLE_BODY_MAX_LEN`, and the
    /// `messageBody` limit of the sample schema
    pub sample_body_max_len: usize,
    /// Extra primitives granted to snippets
    pub capabilities: CapabilitySet,
}

impl Default for EvalConfig {
    fn default() -> Self {
        let sandbox = SandboxConfig::default();
        Self {
            timeout_ms: sandbox.timeout.as_millis() as u64,
            max_heap_bytes: sandbox.max_heap_size,
            max_output_bytes: sandbox.max_output_size,
            sample_body_max_len: SAMPLE_BODY_MAX_LEN,
            capabilities: CapabilitySet::default(),
        }
    }
}

impl EvalConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| EvalError::Config(e.to_string()))
    }

    pub fn sandbox_config(&self) -> SandboxConfig {
        SandboxConfig {
            timeout: Duration::from_millis(self.timeout_ms),
            max_heap_size: self.max_heap_bytes,
            max_output_size: self.max_output_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauge_sandbox::Capability;

    #[test]
    fn test_defaults() {
        let config = EvalConfig::default();
        assert_eq!(config.timeout_ms, 750);
        assert_eq!(config.sample_body_max_len, 4096);
        assert_eq!(config.sandbox_config().timeout, Duration::from_millis(750));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EvalConfig::from_json_str(r#"{"timeout_ms": 200, "capabilities": ["web_assembly"]}"#).unwrap();
        assert_eq!(config.timeout_ms, 200);
        assert_eq!(config.sample_body_max_len, 4096);
        assert!(config.capabilities.has(Capability::WebAssembly));
        assert!(!config.capabilities.has(Capability::CodeGeneration));
    }

    #[test]
    fn test_timers_capability_is_rejected() {
        let err = EvalConfig::from_json_str(r#"{"capabilities": ["timers"]}"#).unwrap_err();
        assert_eq!(err.name(), "ConfigError");
    }

    #[test]
    fn test_bad_json() {
        let err = EvalConfig::from_json_str("{ timeout_ms: ").unwrap_err();
        assert_eq!(err.name(), "ConfigError");
    }
}
