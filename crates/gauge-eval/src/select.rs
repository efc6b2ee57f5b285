//! Status-driven choice of which transform snippet runs

use crate::error::{EvalError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Display;

/// The `transform` section of a sample generator template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformDescriptor {
    /// Snippet for 2xx responses with no matching handler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Status pattern to snippet. Keys iterate in lexicographic order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_handlers: Option<BTreeMap<String, Value>>,
}

/// One `errorHandlers` key
#[derive(Debug, Clone)]
pub enum StatusPattern {
    /// All digits, e.g. `"404"`
    Exact(String),
    /// Anything else, read as an unanchored regular expression, e.g. `"5.."`
    Pattern(Regex),
}

impl StatusPattern {
    pub fn parse(key: &str) -> Result<Self> {
        if !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(StatusPattern::Exact(key.to_string()));
        }
        Regex::new(key)
            .map(StatusPattern::Pattern)
            .map_err(|source| EvalError::StatusPattern {
                pattern: key.to_string(),
                source,
            })
    }

    /// Fallback reading of the key. A literal digit string used as a
    /// pattern matches wherever it occurs in the status.
    fn is_match(&self, status: &str) -> bool {
        match self {
            StatusPattern::Exact(literal) => status.contains(literal.as_str()),
            StatusPattern::Pattern(re) => re.is_match(status),
        }
    }
}

/// Pick the snippet for `status`:
/// 1. the handler whose key equals the status,
/// 2. else the first handler, in key order, whose pattern matches,
/// 3. else `default` when the status looks like 2xx,
/// 4. else nothing.
///
/// A key that is not a valid pattern fails with `StatusPattern` only when
/// the scan reaches it without having found a match.
pub fn select_transform(descriptor: &TransformDescriptor, status: impl Display) -> Result<Option<&Value>> {
    let status = status.to_string();

    if let Some(handlers) = &descriptor.error_handlers {
        let mut pattern_match: Option<(&String, &Value)> = None;

        for (key, snippet) in handlers {
            if key == &status {
                tracing::debug!(status = %status, key = %key, "exact status handler");
                return Ok(Some(snippet));
            }
            if pattern_match.is_some() {
                continue;
            }

            if StatusPattern::parse(key)?.is_match(&status) {
                pattern_match = Some((key, snippet));
            }
        }

        if let Some((key, snippet)) = pattern_match {
            tracing::debug!(status = %status, key = %key, "pattern status handler");
            return Ok(Some(snippet));
        }
    }

    if is_success(&status) {
        tracing::debug!(status = %status, has_default = descriptor.default.is_some(), "default transform");
        return Ok(descriptor.default.as_ref());
    }

    tracing::debug!(status = %status, "no transform for status");
    Ok(None)
}

/// `2` followed by two digits anywhere in the status text
fn is_success(status: &str) -> bool {
    status
        .as_bytes()
        .windows(3)
        .any(|w| w[0] == b'2' && w[1].is_ascii_digit() && w[2].is_ascii_digit())
}
