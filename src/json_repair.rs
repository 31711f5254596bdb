//! Recovery of structured arrays from model output
//!
//! Streaming model responses arrive as free text that usually contains a JSON
//! array, often wrapped in a markdown code fence and sometimes truncated
//! mid-stream. This module extracts the array portion and, when the bracket
//! structure is unbalanced, appends the missing closers before parsing.
//! Repair is strictly append-only: well-formed input parses unchanged.

use crate::error::{Result, RoistatError};
use serde_json::Value;
use tracing::debug;

/// Extract and parse a JSON array from raw model output.
///
/// Strips markdown code fences, isolates the first `[...]` span, balances
/// truncated brackets, then parses. Fails with [`RoistatError::AiResponse`]
/// when no array can be recovered.
///
/// # Examples
/// ```
/// use roistat::json_repair::parse_model_array;
///
/// let raw = "```json\n[{\"name\": \"a\", \"minutes\": 3}]\n```";
/// let values = parse_model_array(raw).unwrap();
/// assert_eq!(values.len(), 1);
/// ```
pub fn parse_model_array(raw: &str) -> Result<Vec<Value>> {
    let stripped = strip_code_fences(raw);
    let candidate = extract_array_span(&stripped)
        .ok_or_else(|| RoistatError::AiResponse("no array found in response".to_string()))?;
    let repaired = balance_brackets(candidate);
    if repaired.len() != candidate.len() {
        debug!(
            appended = repaired.len() - candidate.len(),
            "repaired truncated array from model output"
        );
    }

    let parsed: Value = serde_json::from_str(&repaired)
        .map_err(|e| RoistatError::AiResponse(format!("array did not parse: {e}")))?;
    match parsed {
        Value::Array(items) => Ok(items),
        other => Err(RoistatError::AiResponse(format!(
            "expected an array, got {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Remove markdown code fences (```json ... ``` or bare ```) around the
/// payload, leaving the inner text untouched.
fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.contains("```") {
        return trimmed.to_string();
    }
    trimmed
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Find the span from the first `[` to the last `]`; when the closing bracket
/// is missing (truncated stream) the span runs to the end of the text.
fn extract_array_span(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    match text.rfind(']') {
        Some(end) if end > start => Some(&text[start..=end]),
        _ => Some(&text[start..]),
    }
}

/// Append the closers a truncated array is missing: one `}` per unclosed
/// object, then one `]` per unclosed array. Bracket characters inside string
/// literals are ignored.
fn balance_brackets(candidate: &str) -> String {
    let mut open_arrays = 0i64;
    let mut open_objects = 0i64;
    let mut in_string = false;
    let mut escaped = false;

    for ch in candidate.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' => open_arrays += 1,
            ']' => open_arrays -= 1,
            '{' => open_objects += 1,
            '}' => open_objects -= 1,
            _ => {}
        }
    }

    let mut repaired = candidate.to_string();
    // A string cut off mid-literal cannot be recovered; close it and let the
    // parser decide whether the result makes sense.
    if in_string {
        repaired.push('"');
    }
    for _ in 0..open_objects.max(0) {
        repaired.push('}');
    }
    for _ in 0..open_arrays.max(0) {
        repaired.push(']');
    }
    repaired
}
