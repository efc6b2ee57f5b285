//! Argument bundle preconditions
//!
//! Presence checks follow JavaScript truthiness: `null`, `false`, `0` and
//! `""` count as missing, while an empty array is present.

use crate::error::{EvalError, Result};
use crate::redact::redact;
use serde_json::Value;

/// Check the bundle handed to a transform snippet: `ctx`, `res`, `aspects`
/// and exactly one of `subjects`/`subject`.
pub fn validate_transform_args(args: &Value) -> Result<()> {
    tracing::debug!(args = %redact(args), "validating transform args");
    require_bundle(args)?;

    is_object("ctx", args.get("ctx"))?;
    is_object("res", args.get("res"))?;
    validate_aspects(args.get("aspects"))?;
    validate_subject_args(args)
}

/// Check the bundle handed to a toUrl snippet. `ctx` may be absent;
/// `subjects` must be an array but may be empty.
pub fn validate_to_url_args(args: &Value) -> Result<()> {
    tracing::debug!(args = %redact(args), "validating toUrl args");
    require_bundle(args)?;

    match args.get("ctx") {
        Some(ctx) if is_truthy(ctx) => is_object("ctx", Some(ctx))?,
        _ => {}
    }
    validate_aspects(args.get("aspects"))?;
    validate_subjects(args.get("subjects"))
}

fn require_bundle(args: &Value) -> Result<()> {
    if !is_truthy(args) {
        return Err(EvalError::Args("Missing args.".into()));
    }
    if !args.is_object() {
        return Err(EvalError::Args("args must be an object.".into()));
    }
    Ok(())
}

fn is_object(name: &str, value: Option<&Value>) -> Result<()> {
    match value {
        None | Some(Value::Null) => Err(EvalError::Args(format!("Missing \"{}\" attribute.", name))),
        Some(Value::Object(_)) => Ok(()),
        Some(_) => Err(EvalError::Args(format!("\"{}\" attribute must be an object.", name))),
    }
}

fn validate_aspects(aspects: Option<&Value>) -> Result<()> {
    let aspects = match aspects {
        Some(value) if is_truthy(value) => value,
        _ => return Err(EvalError::Args("Must include an \"aspects\" attribute.".into())),
    };

    let items = match aspects.as_array() {
        Some(items) if !items.is_empty() => items,
        _ => {
            return Err(EvalError::Args(
                "\"aspects\" attribute must be an array of one or more aspects.".into(),
            ))
        }
    };

    for (n, aspect) in items.iter().enumerate() {
        is_object(&format!("aspects[{}]", n), Some(aspect))?;
        match aspect.get("name").and_then(Value::as_str) {
            Some(name) if !name.is_empty() => {}
            _ => {
                return Err(EvalError::Args(
                    "Every element in the \"aspects\" array must contain an aspect name.".into(),
                ))
            }
        }
    }
    Ok(())
}

fn validate_subject_args(args: &Value) -> Result<()> {
    let subjects = args.get("subjects").filter(|v| is_truthy(v));
    let subject = args.get("subject").filter(|v| is_truthy(v));

    match (subjects, subject) {
        (None, None) => Err(EvalError::Args(
            "Must include either \"subjects\" or \"subject\".".into(),
        )),
        (Some(_), Some(_)) => Err(EvalError::Args(
            "Must not include both \"subjects\" and \"subject\".".into(),
        )),
        (Some(subjects), None) => validate_subjects(Some(subjects)),
        (None, Some(subject)) => validate_subject(Some(subject)),
    }
}

fn validate_subjects(subjects: Option<&Value>) -> Result<()> {
    let items = match subjects {
        Some(value) if is_truthy(value) => value.as_array(),
        _ => None,
    };
    let Some(items) = items else {
        return Err(EvalError::Args(
            "Must include a \"subjects\" attribute with an array of zero or more subjects.".into(),
        ));
    };

    for (n, subject) in items.iter().enumerate() {
        is_object(&format!("subjects[{}]", n), Some(subject))?;
        if !subject.get("absolutePath").is_some_and(Value::is_string) {
            return Err(EvalError::Args(
                "Every element in the \"subjects\" array must be a valid subject.".into(),
            ));
        }
    }
    Ok(())
}

fn validate_subject(subject: Option<&Value>) -> Result<()> {
    let subject = match subject {
        Some(value) if is_truthy(value) => value,
        _ => return Err(EvalError::Args("Must include a \"subject\" attribute.".into())),
    };

    is_object("subject", Some(subject))?;
    if !subject.get("absolutePath").is_some_and(Value::is_string) {
        return Err(EvalError::Args(
            "\"subject\" attribute must be a valid subject.".into(),
        ));
    }
    Ok(())
}

pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args_message(result: Result<()>) -> String {
        match result {
            Err(EvalError::Args(msg)) => msg,
            other => panic!("expected ArgsError, got {other:?}"),
        }
    }

    fn transform_args() -> Value {
        json!({
            "ctx": {},
            "res": {},
            "aspects": [{ "name": "A1" }],
            "subjects": [{ "absolutePath": "abc" }],
        })
    }

    #[test]
    fn test_transform_args_ok() {
        assert!(validate_transform_args(&transform_args()).is_ok());

        let single = json!({
            "ctx": {}, "res": {},
            "aspects": [{ "name": "A1" }],
            "subject": { "absolutePath": "abc" },
        });
        assert!(validate_transform_args(&single).is_ok());
    }

    #[test]
    fn test_missing_or_malformed_args() {
        assert_eq!(args_message(validate_transform_args(&Value::Null)), "Missing args.");
        assert_eq!(args_message(validate_transform_args(&json!(false))), "Missing args.");
        assert_eq!(args_message(validate_transform_args(&json!(true))), "args must be an object.");
        assert_eq!(args_message(validate_transform_args(&json!([1, 2]))), "args must be an object.");
        assert_eq!(args_message(validate_to_url_args(&json!("abc"))), "args must be an object.");
    }

    #[test]
    fn test_ctx_and_res_must_be_objects() {
        let mut args = transform_args();
        args.as_object_mut().unwrap().remove("ctx");
        assert_eq!(args_message(validate_transform_args(&args)), "Missing \"ctx\" attribute.");

        let mut args = transform_args();
        args["res"] = json!([]);
        assert_eq!(
            args_message(validate_transform_args(&args)),
            "\"res\" attribute must be an object."
        );
    }

    #[test]
    fn test_aspects_rules() {
        let mut args = transform_args();
        args.as_object_mut().unwrap().remove("aspects");
        assert_eq!(
            args_message(validate_transform_args(&args)),
            "Must include an \"aspects\" attribute."
        );

        args["aspects"] = json!([]);
        assert_eq!(
            args_message(validate_transform_args(&args)),
            "\"aspects\" attribute must be an array of one or more aspects."
        );

        args["aspects"] = json!({ "name": "A1" });
        assert_eq!(
            args_message(validate_transform_args(&args)),
            "\"aspects\" attribute must be an array of one or more aspects."
        );

        args["aspects"] = json!(["A1"]);
        assert_eq!(
            args_message(validate_transform_args(&args)),
            "\"aspects[0]\" attribute must be an object."
        );

        args["aspects"] = json!([{ "name": "A1" }, { "name": "" }]);
        assert_eq!(
            args_message(validate_transform_args(&args)),
            "Every element in the \"aspects\" array must contain an aspect name."
        );
    }

    #[test]
    fn test_exactly_one_of_subject_and_subjects() {
        let mut args = transform_args();
        args["subject"] = json!({ "absolutePath": "abc" });
        assert_eq!(
            args_message(validate_transform_args(&args)),
            "Must not include both \"subjects\" and \"subject\"."
        );

        let mut args = transform_args();
        args.as_object_mut().unwrap().remove("subjects");
        assert_eq!(
            args_message(validate_transform_args(&args)),
            "Must include either \"subjects\" or \"subject\"."
        );
    }

    #[test]
    fn test_subject_shapes() {
        let mut args = transform_args();
        args["subjects"] = json!([{ "absolutePath": "abc" }, { "name": "x" }]);
        assert_eq!(
            args_message(validate_transform_args(&args)),
            "Every element in the \"subjects\" array must be a valid subject."
        );

        args["subjects"] = json!("abc");
        assert_eq!(
            args_message(validate_transform_args(&args)),
            "Must include a \"subjects\" attribute with an array of zero or more subjects."
        );

        let mut args = transform_args();
        args.as_object_mut().unwrap().remove("subjects");
        args["subject"] = json!({ "absolutePath": 3 });
        assert_eq!(
            args_message(validate_transform_args(&args)),
            "\"subject\" attribute must be a valid subject."
        );

        args["subject"] = json!(["abc"]);
        assert_eq!(
            args_message(validate_transform_args(&args)),
            "\"subject\" attribute must be an object."
        );
    }

    #[test]
    fn test_to_url_args() {
        let args = json!({ "aspects": [{ "name": "A1" }], "subjects": [] });
        assert!(validate_to_url_args(&args).is_ok());

        let args = json!({ "ctx": null, "aspects": [{ "name": "A1" }], "subjects": [] });
        assert!(validate_to_url_args(&args).is_ok());

        let args = json!({ "ctx": "x", "aspects": [{ "name": "A1" }], "subjects": [] });
        assert_eq!(
            args_message(validate_to_url_args(&args)),
            "\"ctx\" attribute must be an object."
        );

        let args = json!({ "ctx": {}, "aspects": [{ "name": "A1" }] });
        assert_eq!(
            args_message(validate_to_url_args(&args)),
            "Must include a \"subjects\" attribute with an array of zero or more subjects."
        );

        let args = json!({ "ctx": {}, "aspects": [{ "name": "A1" }], "subject": { "absolutePath": "a" } });
        assert!(validate_to_url_args(&args).is_err());
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!({})));
        assert!(is_truthy(&json!(-1.5)));
    }
}
