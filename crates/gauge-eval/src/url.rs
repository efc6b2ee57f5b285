//! Connection settings and the toUrl result check

use crate::error::{EvalError, Result, TO_URL_NOT_STRING};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub(crate) const MISSING_URL: &str =
    "The generator template must provide either a connection.url attribute or a \"toUrl\" attribute.";

/// The `connection` section of a sample generator template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// URL template, expanded against the generator context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// toUrl snippet, as one string or as lines to join
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_url: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Map<String, Value>>,
}

/// Where a request URL comes from
#[derive(Debug, Clone, PartialEq)]
pub enum UrlSource<'a> {
    Template(&'a str),
    Snippet(Value),
}

impl Connection {
    /// `url` wins over `toUrl`; empty values count as absent
    pub fn url_source(&self) -> Result<UrlSource<'_>> {
        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            return Ok(UrlSource::Template(url));
        }
        match &self.to_url {
            Some(body) if crate::args::is_truthy(body) => Ok(UrlSource::Snippet(join_lines(body))),
            _ => Err(EvalError::Validation(MISSING_URL.to_string())),
        }
    }
}

/// A snippet given as an array of lines becomes one newline-joined body.
/// Anything else is passed through for the body check to judge.
pub fn join_lines(body: &Value) -> Value {
    match body {
        Value::Array(lines) => Value::String(
            lines
                .iter()
                .map(|line| match line {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        other => other.clone(),
    }
}

/// A toUrl snippet must produce a string; its content is not checked
pub fn validate_to_url_result(value: Value) -> Result<String> {
    match value {
        Value::String(url) => Ok(url),
        other => {
            tracing::warn!(kind = gauge_sandbox::json_type_name(&other), "toUrl returned a non-string");
            Err(EvalError::ToUrl(TO_URL_NOT_STRING.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_url_result() {
        assert_eq!(validate_to_url_result(json!("http://x")).unwrap(), "http://x");
        assert_eq!(validate_to_url_result(json!("")).unwrap(), "");
        for bad in [json!(42), json!(null), json!(["a"]), json!({ "url": "x" })] {
            let err = validate_to_url_result(bad).unwrap_err();
            assert_eq!(err.name(), "ToUrlError");
            assert_eq!(err.to_string(), "The toUrl function must return a string");
        }
    }

    #[test]
    fn test_join_lines() {
        assert_eq!(
            join_lines(&json!(["const a = 1;", "return 'u' + a;"])),
            json!("const a = 1;\nreturn 'u' + a;")
        );
        assert_eq!(join_lines(&json!("return 'u';")), json!("return 'u';"));
        assert_eq!(join_lines(&json!(7)), json!(7));
    }

    #[test]
    fn test_url_source() {
        let conn: Connection = serde_json::from_value(json!({ "url": "http://{{host}}", "toUrl": "return 'x';" })).unwrap();
        assert_eq!(conn.url_source().unwrap(), UrlSource::Template("http://{{host}}"));

        let conn: Connection = serde_json::from_value(json!({ "toUrl": ["return", "'x';"] })).unwrap();
        assert_eq!(conn.url_source().unwrap(), UrlSource::Snippet(json!("return\n'x';")));

        let err = Connection::default().url_source().unwrap_err();
        assert_eq!(err.name(), "ValidationError");
        assert_eq!(err.to_string(), MISSING_URL);
    }
}
