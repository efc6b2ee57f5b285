//! Samples: the shape schema and the relational checks applied to what a
//! transform produced.

use crate::error::{EvalError, Result, TRANSFORM_NOT_ARRAY};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// Longest `messageBody` a sample may carry, also exposed to transforms
pub const SAMPLE_BODY_MAX_LEN: usize = 4096;

const NAME_MIN_LEN: usize = 3;
const NAME_MAX_LEN: usize = 4096;
const MESSAGE_CODE_MAX_LEN: usize = 5;

/// A telemetry data point named `<subjectPath>|<aspectName>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub name: String,
    /// `Some(Value::Null)` when the transform returned `value: null`
    #[serde(default, deserialize_with = "present_value", skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_links: Option<Vec<RelatedLink>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedLink {
    pub name: String,
    pub url: String,
}

/// A present `value` key is kept even when it holds `null`; only a missing
/// key maps to `None`.
fn present_value<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Sample {
    /// Split the name into its subject path and aspect name
    pub fn parts(&self) -> Option<(&str, &str)> {
        split_name(&self.name)
    }
}

/// A schema rule a sample broke
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub path: String,
    pub message: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SchemaViolation {}

fn violation(path: impl Into<String>, message: impl Into<String>) -> SchemaViolation {
    SchemaViolation {
        path: path.into(),
        message: message.into(),
    }
}

/// Shape rules for a single sample.
///
/// `name` is a required string of 3 to 4096 characters containing a `|`.
/// `value` is a scalar, `messageCode` at most 5 characters, `messageBody` at
/// most `message_body_max_len` characters and `relatedLinks` a list of
/// `{name, url}`. Any other key is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleSchema {
    pub message_body_max_len: usize,
}

impl Default for SampleSchema {
    fn default() -> Self {
        Self {
            message_body_max_len: SAMPLE_BODY_MAX_LEN,
        }
    }
}

impl SampleSchema {
    pub fn new(message_body_max_len: usize) -> Self {
        Self { message_body_max_len }
    }

    pub fn validate(&self, sample: &Value) -> std::result::Result<(), SchemaViolation> {
        let Some(fields) = sample.as_object() else {
            return Err(violation("", "\"value\" must be an object"));
        };

        let name = match fields.get("name") {
            None => return Err(violation("name", "\"name\" is required")),
            Some(Value::String(name)) => name,
            Some(_) => return Err(violation("name", "\"name\" must be a string")),
        };
        check_len("name", name, Some(NAME_MIN_LEN), NAME_MAX_LEN)?;
        if !name.contains('|') {
            return Err(violation(
                "name",
                format!("\"name\" with value \"{}\" fails to match the required pattern: /\\|/", name),
            ));
        }

        for (key, value) in fields {
            match key.as_str() {
                "name" => {}
                "value" => {
                    if value.is_array() || value.is_object() {
                        return Err(violation(
                            "value",
                            "\"value\" must be one of [string, number, boolean, null]",
                        ));
                    }
                }
                "messageCode" => {
                    let code = expect_string(key, value)?;
                    check_len(key, code, None, MESSAGE_CODE_MAX_LEN)?;
                }
                "messageBody" => {
                    let body = expect_string(key, value)?;
                    check_len(key, body, None, self.message_body_max_len)?;
                }
                "relatedLinks" => validate_links(value)?,
                other => return Err(violation(other, format!("\"{}\" is not allowed", other))),
            }
        }
        Ok(())
    }
}

fn expect_string<'a>(key: &str, value: &'a Value) -> std::result::Result<&'a str, SchemaViolation> {
    value
        .as_str()
        .ok_or_else(|| violation(key, format!("\"{}\" must be a string", key)))
}

fn check_len(
    key: &str,
    value: &str,
    min: Option<usize>,
    max: usize,
) -> std::result::Result<(), SchemaViolation> {
    let len = value.chars().count();
    if let Some(min) = min {
        if len < min {
            return Err(violation(
                key,
                format!("\"{}\" length must be at least {} characters long", key, min),
            ));
        }
    }
    if len > max {
        return Err(violation(
            key,
            format!("\"{}\" length must be less than or equal to {} characters long", key, max),
        ));
    }
    Ok(())
}

fn validate_links(links: &Value) -> std::result::Result<(), SchemaViolation> {
    let Some(links) = links.as_array() else {
        return Err(violation("relatedLinks", "\"relatedLinks\" must be an array"));
    };
    for (n, link) in links.iter().enumerate() {
        let path = format!("relatedLinks.{}", n);
        let Some(link) = link.as_object() else {
            return Err(violation(path.clone(), format!("\"{}\" must be an object", n)));
        };
        for key in ["name", "url"] {
            match link.get(key) {
                Some(Value::String(_)) => {}
                Some(_) => return Err(violation(format!("{}.{}", path, key), format!("\"{}\" must be a string", key))),
                None => return Err(violation(format!("{}.{}", path, key), format!("\"{}\" is required", key))),
            }
        }
        if let Some(extra) = link.keys().find(|k| *k != "name" && *k != "url") {
            return Err(violation(format!("{}.{}", path, extra), format!("\"{}\" is not allowed", extra)));
        }
    }
    Ok(())
}

/// Exactly one `|` with text on both sides
pub fn split_name(name: &str) -> Option<(&str, &str)> {
    let (subject, aspect) = name.split_once('|')?;
    if subject.is_empty() || aspect.is_empty() || aspect.contains('|') {
        return None;
    }
    Some((subject, aspect))
}

/// Check what a transform returned against the subjects and aspects it was
/// given: an array, no more than `subjects × aspects` entries, every entry a
/// schema-valid sample named after a known subject and aspect, no
/// case-insensitive duplicates.
pub fn validate_samples(produced: &Value, args: &Value, schema: &SampleSchema) -> Result<()> {
    tracing::debug!("validating samples");
    let Some(samples) = produced.as_array() else {
        return Err(EvalError::Transform(TRANSFORM_NOT_ARRAY.to_string()));
    };

    let subjects = subject_paths(args)?;
    let aspects: Vec<String> = args
        .get("aspects")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|a| a.get("name").and_then(Value::as_str))
                .map(str::to_lowercase)
                .collect()
        })
        .unwrap_or_default();

    if samples.len() > subjects.len() * aspects.len() {
        return Err(EvalError::Validation(format!(
            "Number of samples more than expected. Samples count: {}, Subjects count: {}, Aspects count: {}",
            samples.len(),
            subjects.len(),
            aspects.len()
        )));
    }

    let mut seen = HashSet::with_capacity(samples.len());
    for sample in samples {
        schema
            .validate(sample)
            .map_err(|v| EvalError::Transform(v.message))?;

        // schema guarantees a string name
        let name = sample.get("name").and_then(Value::as_str).unwrap_or_default();
        let lower = name.to_lowercase();

        if seen.contains(&lower) {
            return Err(EvalError::Validation(format!("Duplicate sample found: {}", lower)));
        }

        let Some((subject, aspect)) = split_name(&lower) else {
            return Err(EvalError::Validation(format!("Invalid sample name: {}", name)));
        };
        if !subjects.iter().any(|s| s == subject) || !aspects.iter().any(|a| a == aspect) {
            return Err(EvalError::Validation(format!(
                "Unknown subject or aspect for sample: {}",
                name
            )));
        }
        seen.insert(lower);
    }

    tracing::debug!(count = samples.len(), "sample validation passed");
    Ok(())
}

fn subject_paths(args: &Value) -> Result<Vec<String>> {
    let lower_path = |s: &Value| s.get("absolutePath").and_then(Value::as_str).map(str::to_lowercase);

    match (args.get("subjects"), args.get("subject")) {
        (Some(Value::Array(subjects)), _) => Ok(subjects.iter().filter_map(lower_path).collect()),
        (_, Some(subject @ Value::Object(_))) => Ok(lower_path(subject).into_iter().collect()),
        _ => Err(EvalError::Validation(
            "Generator passed to validateSamples should have \"subjects\" or \"subject\"".into(),
        )),
    }
}

/// Convert schema-checked sample values into typed samples
pub(crate) fn into_samples(produced: Value) -> Result<Vec<Sample>> {
    serde_json::from_value(produced).map_err(|e| EvalError::Transform(e.to_string()))
}
