//! Forgiving deserializers for TTP knowledge-base exports.
//!
//! Exports seen in the wild mix `null`, numbers and strings for the same field, and
//! sometimes emit `"technique": null` instead of an empty list. These helpers keep the
//! record model strongly typed while accepting those variations.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Deserializes a text field, accepting strings, numbers, booleans and `null`.
///
/// # Accepted Formats
///
/// * **String**: kept as-is
/// * **Number / bool**: rendered with its JSON text (`42` → `"42"`)
/// * **Null / missing**: empty string
///
/// # Errors
///
/// Returns an error for arrays and objects.
pub fn de_string_forgiving<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(other) => Err(D::Error::custom(format!(
            "expected a string, found {}",
            json_kind(&other)
        ))),
    }
}

/// Like [`de_string_forgiving`] but maps empty and whitespace-only values to `None`.
pub fn de_option_string_forgiving<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = de_string_forgiving(deserializer)?;
    if s.trim().is_empty() {
        Ok(None)
    } else {
        Ok(Some(s))
    }
}

/// Deserializes a list, treating `null` as empty.
pub fn de_vec_or_null<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "de_string_forgiving")]
        text: String,
        #[serde(default, deserialize_with = "de_option_string_forgiving")]
        id: Option<String>,
        #[serde(default, deserialize_with = "de_vec_or_null")]
        items: Vec<u8>,
    }

    #[test]
    fn null_and_missing_become_defaults() {
        let p: Probe = serde_json::from_str(r#"{"text": null, "items": null}"#).unwrap();
        assert_eq!(p.text, "");
        assert_eq!(p.id, None);
        assert!(p.items.is_empty());
    }

    #[test]
    fn numbers_are_rendered_as_text() {
        let p: Probe = serde_json::from_str(r#"{"text": 12, "id": 7}"#).unwrap();
        assert_eq!(p.text, "12");
        assert_eq!(p.id.as_deref(), Some("7"));
    }

    #[test]
    fn blank_id_is_none() {
        let p: Probe = serde_json::from_str(r#"{"id": "   "}"#).unwrap();
        assert_eq!(p.id, None);
    }

    #[test]
    fn objects_are_rejected() {
        let err = serde_json::from_str::<Probe>(r#"{"text": {"a": 1}}"#).unwrap_err();
        assert!(err.to_string().contains("an object"));
    }
}
