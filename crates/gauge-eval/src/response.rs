//! Response content-type check against the template's `Accept` header

use crate::error::{EvalError, Result};
use serde_json::{Map, Value};

const ACCEPT: &str = "Accept";
/// Response header names arrive lower-cased from the HTTP client
const CONTENT_TYPE: &str = "content-type";

/// `type/subtype` split of a media type
struct MediaType<'a> {
    full: &'a str,
    kind: &'a str,
    subtype: Option<&'a str>,
}

impl<'a> MediaType<'a> {
    fn parse(full: &'a str) -> Self {
        let mut parts = full.splitn(2, '/');
        let kind = parts.next().unwrap_or_default();
        Self {
            full,
            kind,
            subtype: parts.next(),
        }
    }

    /// Whether this `Accept` entry admits `actual`
    fn accepts(&self, actual: &MediaType<'_>) -> bool {
        if self.full == actual.full || self.full == "*/*" {
            return true;
        }
        if self.kind == actual.kind && self.subtype == Some("*") {
            return true;
        }
        self.kind == "*" && self.subtype.is_some() && self.subtype == actual.subtype
    }
}

/// Check the response `content-type` against the template's `Accept` list.
///
/// Passes when either header is absent. Media type parameters (`;charset=`,
/// `;q=`) are ignored on both sides.
pub fn validate_response_type(
    template_headers: Option<&Map<String, Value>>,
    response_headers: Option<&Map<String, Value>>,
) -> Result<()> {
    let accept = template_headers.and_then(|h| h.get(ACCEPT));
    let content_type = response_headers.and_then(|h| h.get(CONTENT_TYPE));
    let (Some(accept), Some(content_type)) = (accept, content_type) else {
        return Ok(());
    };

    let accept = header_text(accept);
    let content_type = header_text(content_type);
    let content_type = content_type.split(';').next().unwrap_or_default().trim();
    tracing::debug!(accept = %accept, content_type, "validating response type");

    let actual = MediaType::parse(content_type);
    let matched = accept
        .split(',')
        .map(|entry| entry.split(';').next().unwrap_or_default().trim())
        .filter(|entry| !entry.is_empty())
        .any(|entry| MediaType::parse(entry).accepts(&actual));

    if matched {
        Ok(())
    } else {
        Err(EvalError::Validation(format!(
            "Accept {} but got {}",
            accept, content_type
        )))
    }
}

fn header_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(accept: &str, content_type: &str) -> Result<()> {
        let template = json!({ "Accept": accept });
        let response = json!({ "content-type": content_type });
        validate_response_type(template.as_object(), response.as_object())
    }

    #[test]
    fn test_missing_headers_pass() {
        let template = json!({ "Accept": "application/json" });
        let response = json!({ "content-type": "text/html" });
        assert!(validate_response_type(None, response.as_object()).is_ok());
        assert!(validate_response_type(template.as_object(), None).is_ok());
        assert!(validate_response_type(template.as_object(), json!({}).as_object()).is_ok());
        // the Accept lookup is case-sensitive
        let lower = json!({ "accept": "application/json" });
        assert!(validate_response_type(lower.as_object(), response.as_object()).is_ok());
    }

    #[test]
    fn test_exact_match() {
        assert!(check("application/json", "application/json").is_ok());
        assert!(check("application/json", "application/json; charset=utf-8").is_ok());
        assert!(check("text/plain, application/json;q=0.9", "application/json").is_ok());
    }

    #[test]
    fn test_wildcards() {
        assert!(check("text/xml,*/*", "text/html").is_ok());
        assert!(check("text/*", "text/html").is_ok());
        assert!(check("*/html", "text/html").is_ok());
    }

    #[test]
    fn test_mismatch() {
        let err = check("text/xml,application/*", "text/html").unwrap_err();
        assert_eq!(err.to_string(), "Accept text/xml,application/* but got text/html");
        assert_eq!(err.name(), "ValidationError");

        let err = check("application/json,text/xml", "text/html;charset=utf-8").unwrap_err();
        assert_eq!(err.to_string(), "Accept application/json,text/xml but got text/html");
    }
}
