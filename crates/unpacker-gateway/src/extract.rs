//! Turning raw model text into structured output.

use serde_json::{json, Value};
use unpacker_core::{InvocationError, OutputSchema, Structured};

/// Strip a surrounding Markdown code fence, if any.
pub fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Find the outermost JSON object or array embedded in chatter.
fn embedded_json(text: &str) -> Option<Value> {
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Parse model text into a value of the requested shape.
///
/// Diagnosis output may come back as bare prose; it is wrapped as
/// `{"summary": ..}`.
pub fn parse_output(raw: &str, schema: OutputSchema) -> Result<Structured, InvocationError> {
    let body = strip_fences(raw);
    let parsed = serde_json::from_str::<Value>(body)
        .ok()
        .or_else(|| embedded_json(body));

    let mut value = match (parsed, schema) {
        (Some(value), _) => value,
        (None, OutputSchema::Diagnosis) if !body.is_empty() => json!({ "summary": body }),
        (None, _) => {
            return Err(InvocationError::schema_violation(
                schema,
                "response is not valid JSON",
            ))
        }
    };

    if schema == OutputSchema::Draft {
        normalize_draft(&mut value);
    }
    check_shape(&value, schema)?;
    Ok(value)
}

fn normalize_draft(value: &mut Value) {
    if let Some(obj) = value.as_object_mut() {
        if !obj.contains_key("text") {
            if let Some(content) = obj.remove("content") {
                obj.insert("text".to_string(), content);
            }
        }
    }
}

fn check_shape(value: &Value, schema: OutputSchema) -> Result<(), InvocationError> {
    if schema == OutputSchema::IdeaList {
        let list = value
            .as_array()
            .or_else(|| value.get("ideas").and_then(Value::as_array));
        return match list {
            Some(_) => Ok(()),
            None => Err(InvocationError::schema_violation(
                schema,
                "expected an array of ideas",
            )),
        };
    }

    let Some(obj) = value.as_object() else {
        return Err(InvocationError::schema_violation(schema, "expected a JSON object"));
    };
    match schema
        .required_keys()
        .iter()
        .find(|key| !obj.contains_key(**key))
    {
        Some(missing) => Err(InvocationError::schema_violation(
            schema,
            format!("missing key `{missing}`"),
        )),
        None => Ok(()),
    }
}
