//! Response parsing and sentinel normalization.

use serde_json::Value;

use super::ExtractError;
use crate::fields::{Field, FieldKind, FieldMap, FieldValue};

/// Slice the single JSON object embedded in a free-form response.
///
/// Completion models wrap their JSON in prose and markdown fences, so the
/// span from the first `{` to the last `}` is taken and parsed as-is.
pub fn extract_json_object(response: &str) -> Result<Value, ExtractError> {
    let start = response.find('{').ok_or(ExtractError::NoJsonObject)?;
    let end = response.rfind('}').ok_or(ExtractError::NoJsonObject)?;
    if end < start {
        return Err(ExtractError::NoJsonObject);
    }
    Ok(serde_json::from_str(&response[start..=end])?)
}

/// Normalize a parsed response into a complete [`FieldMap`].
///
/// Every expected field ends up present: absent or unusable values fall back
/// to the sentinel. Dosage entries arrive as `{Medicine, Dosage Instructions}`
/// objects and are kept as an ordered list, one `"Medicine: Instructions"`
/// element per entry; medicine names stay an ordered list of strings.
pub fn normalize(response: &Value) -> FieldMap {
    let mut map = FieldMap::with_sentinels();
    for field in Field::ALL {
        let Some(raw) = response.get(field.label()) else {
            continue;
        };
        let value = match field.kind() {
            FieldKind::Text => scalar_text(raw).map(FieldValue::Text),
            FieldKind::List => match field {
                Field::RecommendedDoses => dose_list(raw).map(FieldValue::List),
                _ => string_list(raw).map(FieldValue::List),
            },
        };
        if let Some(value) = value {
            // Shape is chosen from the field's kind above, so set cannot fail.
            let _ = map.set(field, value);
        }
    }
    map
}

/// Render a scalar response value as text. Models report ages as numbers and
/// occasionally return symptom arrays; both are accepted.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(scalar_text).collect();
            if parts.is_empty() { None } else { Some(parts.join(", ")) }
        }
        _ => None,
    }
}

/// An ordered list of strings; non-array or empty values fall back to the sentinel.
fn string_list(value: &Value) -> Option<Vec<String>> {
    let items = value.as_array()?;
    let list: Vec<String> = items.iter().filter_map(scalar_text).collect();
    if list.is_empty() { None } else { Some(list) }
}

/// Dosage entries: objects become `"Medicine: Instructions"`, plain strings
/// pass through unchanged.
fn dose_list(value: &Value) -> Option<Vec<String>> {
    let items = value.as_array()?;
    let list: Vec<String> = items
        .iter()
        .filter_map(|entry| match entry {
            Value::Object(obj) => {
                let medicine = obj.get("Medicine").and_then(scalar_text)?;
                let instructions = obj.get("Dosage Instructions").and_then(scalar_text);
                Some(match instructions {
                    Some(instructions) => format!("{}: {}", medicine, instructions),
                    None => medicine,
                })
            }
            other => scalar_text(other),
        })
        .collect();
    if list.is_empty() { None } else { Some(list) }
}

/// Instruction template sent with every extraction request. Transcription
/// mistakes in medical terms are corrected before extraction so the fields
/// come from the cleaned text.
pub fn build_prompt(transcript: &str) -> String {
    format!(
        "Please rectify any mistakes in the following text, especially in medicine names or test names:\n\
         {transcript}\n\n\
         Then extract the following details from the corrected text:\n\
         1. Name of the person\n\
         2. Age of the person\n\
         3. Gender of the person\n\
         4. Name of the doctor\n\
         5. Past tests\n\
         6. Symptoms\n\
         7. Recommended doses: Provide an array of objects, each containing \"Medicine\" and \"Dosage Instructions\"\n\
         8. Medicine names: Provide an array of medicine names\n\n\
         Provide the results in the form of JSON, using the exact field names given above."
    )
}
