//! The composed transform and toUrl pipelines

use crate::args::{is_truthy, validate_to_url_args, validate_transform_args};
use crate::config::EvalConfig;
use crate::error::{EvalError, Result};
use crate::expand::TemplateExpander;
use crate::redact::redact;
use crate::samples::{into_samples, validate_samples, Sample, SampleSchema};
use crate::url::{validate_to_url_result, Connection, UrlSource};
use gauge_sandbox::{bindings_from_value, SandboxRuntime};
use serde_json::{Map, Value};

/// Global name under which transforms see the `messageBody` limit
pub const SAMPLE_BODY_MAX_LEN_BINDING: &str = "SAMPLE_BODY_MAX_LEN";

const TRANSFORM_BODY_NOT_STRING: &str = "Transform function body must be a string";
const TO_URL_BODY_NOT_STRING: &str = "toUrl function body must be a string";

/// Runs template snippets: validate the arguments, evaluate in the
/// sandbox, validate the result.
///
/// Cheap to clone. Each call builds its own isolate, so one runner can
/// serve concurrent callers.
#[derive(Clone)]
pub struct SnippetRunner {
    sandbox: SandboxRuntime,
    schema: SampleSchema,
    config: EvalConfig,
}

impl SnippetRunner {
    pub fn new(config: EvalConfig) -> Self {
        let sandbox = SandboxRuntime::with_capabilities(config.sandbox_config(), config.capabilities.clone());
        Self::with_sandbox(sandbox, config)
    }

    /// Use a preconfigured sandbox, e.g. one with a different console sink
    pub fn with_sandbox(sandbox: SandboxRuntime, config: EvalConfig) -> Self {
        Self {
            sandbox,
            schema: SampleSchema::new(config.sample_body_max_len),
            config,
        }
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// The schema every transform sample must satisfy
    pub fn sample_schema(&self) -> &SampleSchema {
        &self.schema
    }

    /// Run a transform snippet over a response.
    ///
    /// `args` holds `ctx`, `res`, `aspects` and one of `subjects`/`subject`;
    /// the snippet also sees `SAMPLE_BODY_MAX_LEN`.
    pub fn safe_transform(&self, body: &Value, args: &Value, allow_logging: bool) -> Result<Vec<Sample>> {
        let Value::String(body) = body else {
            return Err(EvalError::InvalidBody(TRANSFORM_BODY_NOT_STRING.to_string()));
        };
        validate_transform_args(args)?;

        let mut bindings = bindings_from_value(Some(args))?;
        bindings.insert(
            SAMPLE_BODY_MAX_LEN_BINDING.to_string(),
            Value::from(self.config.sample_body_max_len),
        );

        let produced = self.sandbox.safe_eval(body, &bindings, allow_logging)?;
        if let Some(items) = produced.as_array() {
            tracing::debug!(count = items.len(), "transform produced samples");
        }

        validate_samples(&produced, args, &self.schema)?;
        into_samples(produced)
    }

    /// Run a toUrl snippet; it must return a string
    pub fn safe_to_url(&self, body: &Value, args: &Value, allow_logging: bool) -> Result<String> {
        let Value::String(body) = body else {
            return Err(EvalError::InvalidBody(TO_URL_BODY_NOT_STRING.to_string()));
        };
        validate_to_url_args(args)?;

        let mut bindings = bindings_from_value(Some(args))?;
        if !bindings.get("ctx").is_some_and(is_truthy) {
            bindings.insert("ctx".to_string(), Value::Object(Map::new()));
        }

        let url = validate_to_url_result(self.sandbox.safe_eval(body, &bindings, allow_logging)?)?;
        tracing::debug!(len = url.len(), "toUrl produced a url");
        Ok(url)
    }

    /// Build the request URL for a connection: expand `url` against the
    /// context (with `aspects` and `subjects` added to it), or else run the
    /// `toUrl` snippet.
    pub fn prepare_url(
        &self,
        ctx: &Value,
        aspects: &Value,
        subjects: &Value,
        connection: &Connection,
        expander: &dyn TemplateExpander,
        allow_logging: bool,
    ) -> Result<String> {
        tracing::debug!(ctx = %redact(ctx), "preparing url");

        match connection.url_source()? {
            UrlSource::Template(url) => {
                let mut expanded_ctx = match ctx {
                    Value::Object(map) => map.clone(),
                    _ => Map::new(),
                };
                expanded_ctx.insert("aspects".to_string(), aspects.clone());
                expanded_ctx.insert("subjects".to_string(), subjects.clone());
                Ok(expander.expand(url, &Value::Object(expanded_ctx)))
            }
            UrlSource::Snippet(body) => {
                let args = serde_json::json!({
                    "ctx": ctx,
                    "aspects": aspects,
                    "subjects": subjects,
                });
                self.safe_to_url(&body, &args, allow_logging)
            }
        }
    }

    /// `safe_transform` on the blocking pool, for async collectors
    pub async fn transform_task(&self, body: Value, args: Value, allow_logging: bool) -> Result<Vec<Sample>> {
        let runner = self.clone();
        tokio::task::spawn_blocking(move || runner.safe_transform(&body, &args, allow_logging))
            .await
            .map_err(|e| EvalError::FunctionBody(format!("Task join error: {e}")))?
    }

    /// `safe_to_url` on the blocking pool, for async collectors
    pub async fn to_url_task(&self, body: Value, args: Value, allow_logging: bool) -> Result<String> {
        let runner = self.clone();
        tokio::task::spawn_blocking(move || runner.safe_to_url(&body, &args, allow_logging))
            .await
            .map_err(|e| EvalError::FunctionBody(format!("Task join error: {e}")))?
    }
}

impl Default for SnippetRunner {
    fn default() -> Self {
        Self::new(EvalConfig::default())
    }
}
