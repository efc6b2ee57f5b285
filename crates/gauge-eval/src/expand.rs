//! Template expansion plumbing for URLs and headers

use serde_json::{Map, Value};

/// Header sent when the template sets none
pub const DEFAULT_ACCEPT: &str = "application/json";

/// A string-template expander, e.g. `{{ctx.host}}` substitution.
///
/// Expansion itself belongs to the collector; any
/// `Fn(&str, &Value) -> String` closure implements this trait.
pub trait TemplateExpander: Send + Sync {
    fn expand(&self, template: &str, ctx: &Value) -> String;
}

impl<F> TemplateExpander for F
where
    F: Fn(&str, &Value) -> String + Send + Sync,
{
    fn expand(&self, template: &str, ctx: &Value) -> String {
        self(template, ctx)
    }
}

/// Deep copy of `value` with every string leaf expanded against `ctx`
pub fn expand_object(value: &Value, ctx: &Value, expander: &dyn TemplateExpander) -> Value {
    match value {
        Value::String(s) => Value::String(expander.expand(s, ctx)),
        Value::Array(items) => Value::Array(items.iter().map(|v| expand_object(v, ctx, expander)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), expand_object(v, ctx, expander)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Request headers: `Accept: application/json` plus the template's own
/// headers, each expanded against `ctx`. Template headers win.
pub fn prepare_headers(
    headers: Option<&Map<String, Value>>,
    ctx: &Value,
    expander: &dyn TemplateExpander,
) -> Map<String, Value> {
    let mut prepared = Map::new();
    prepared.insert("Accept".to_string(), Value::String(DEFAULT_ACCEPT.to_string()));

    for (key, value) in headers.into_iter().flatten() {
        let expanded = match value {
            Value::String(template) => Value::String(expander.expand(template, ctx)),
            other => expand_object(other, ctx, expander),
        };
        prepared.insert(key.clone(), expanded);
    }
    tracing::debug!(count = prepared.len(), "prepared headers");
    prepared
}
