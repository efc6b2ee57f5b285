//! Gauge Eval - safe execution of sample generator snippets
//!
//! A sample generator template carries small code snippets: `transform`
//! turns a remote response into samples, `toUrl` computes the request URL.
//! This crate validates a snippet's arguments, runs it in the
//! [`gauge_sandbox`] isolate and validates what it returned.
//!
//! ```no_run
//! use gauge_eval::SnippetRunner;
//! use serde_json::json;
//!
//! let runner = SnippetRunner::default();
//! let samples = runner.safe_transform(
//!     &json!("return [{ name: subjects[0].absolutePath + '|A1' }];"),
//!     &json!({
//!         "ctx": {},
//!         "res": {},
//!         "subjects": [{ "absolutePath": "abc" }],
//!         "aspects": [{ "name": "A1" }],
//!     }),
//!     false,
//! )?;
//! assert_eq!(samples[0].name, "abc|A1");
//! # Ok::<(), gauge_eval::EvalError>(())
//! ```

mod args;
mod config;
mod error;
mod expand;
mod redact;
mod response;
mod runner;
mod samples;
mod select;
mod url;

pub use args::{validate_to_url_args, validate_transform_args};
pub use config::EvalConfig;
pub use error::{EvalError, Result, TO_URL_NOT_STRING, TRANSFORM_NOT_ARRAY};
pub use expand::{expand_object, prepare_headers, TemplateExpander, DEFAULT_ACCEPT};
pub use redact::{is_secret_key, redact, REDACTED};
pub use response::validate_response_type;
pub use runner::{SnippetRunner, SAMPLE_BODY_MAX_LEN_BINDING};
pub use samples::{
    split_name, validate_samples, RelatedLink, Sample, SampleSchema, SchemaViolation,
    SAMPLE_BODY_MAX_LEN,
};
pub use select::{select_transform, StatusPattern, TransformDescriptor};
pub use url::{join_lines, validate_to_url_result, Connection, UrlSource};

pub use gauge_sandbox::{
    Capability, CapabilitySet, ConsoleSink, LogLevel, SandboxConfig, SandboxRuntime, StdConsole,
};
