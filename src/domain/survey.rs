//! Survey question normalization.
//!
//! Survey definitions accumulated in several loose shapes: the `questions`
//! column sometimes holds a JSON-encoded *string* instead of a native array,
//! questions appear both as bare strings and as objects, and options appear
//! both as strings and as `{"text": ...}` objects. All of them collapse into
//! [`Question`] here, at the data-access boundary, so nothing downstream has
//! to care.

use crate::domain::models::Question;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("questions payload is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("questions must be an array, got {0}")]
    NotAnArray(&'static str),
    #[error("question {0} is malformed")]
    BadQuestion(usize),
}

pub fn normalize_questions(raw: &Value) -> Result<Vec<Question>, SchemaError> {
    let parsed;
    let items = match raw {
        // Legacy rows stored the array JSON-encoded a second time.
        Value::String(s) => {
            parsed = serde_json::from_str::<Value>(s)?;
            match &parsed {
                Value::Array(items) => items,
                other => return Err(SchemaError::NotAnArray(type_name(other))),
            }
        }
        Value::Array(items) => items,
        Value::Null => return Ok(Vec::new()),
        other => return Err(SchemaError::NotAnArray(type_name(other))),
    };

    items
        .iter()
        .enumerate()
        .map(|(idx, item)| normalize_question(idx, item))
        .collect()
}

/// Canonical storage form for a question list.
pub fn questions_to_value(questions: &[Question]) -> Value {
    serde_json::to_value(questions).unwrap_or_else(|_| Value::Array(Vec::new()))
}

fn normalize_question(idx: usize, item: &Value) -> Result<Question, SchemaError> {
    match item {
        Value::String(text) => Ok(Question {
            id: idx as u32,
            text: text.clone(),
            options: Vec::new(),
            multiple: false,
        }),
        Value::Object(obj) => {
            let text = obj
                .get("text")
                .and_then(Value::as_str)
                .ok_or(SchemaError::BadQuestion(idx))?;
            let id = obj
                .get("id")
                .and_then(Value::as_u64)
                .map(|v| v as u32)
                .unwrap_or(idx as u32);
            let options = match obj.get("options") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(opts)) => opts
                    .iter()
                    .map(|opt| normalize_option(idx, opt))
                    .collect::<Result<_, _>>()?,
                Some(_) => return Err(SchemaError::BadQuestion(idx)),
            };
            let multiple = obj
                .get("multiple")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            Ok(Question {
                id,
                text: text.to_string(),
                options,
                multiple,
            })
        }
        _ => Err(SchemaError::BadQuestion(idx)),
    }
}

fn normalize_option(question_idx: usize, opt: &Value) -> Result<String, SchemaError> {
    match opt {
        Value::String(s) => Ok(s.clone()),
        Value::Object(obj) => obj
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(SchemaError::BadQuestion(question_idx)),
        _ => Err(SchemaError::BadQuestion(question_idx)),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn native_array_of_objects() {
        let raw = json!([
            { "id": 1, "text": "Q1", "options": ["A", "B"] },
            { "text": "Q2", "options": ["C"], "multiple": true }
        ]);
        let questions = normalize_questions(&raw).unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].id, 1);
        assert_eq!(questions[0].options, vec!["A", "B"]);
        assert!(!questions[0].multiple);
        // Missing id falls back to the positional index.
        assert_eq!(questions[1].id, 1);
        assert!(questions[1].multiple);
    }

    #[test]
    fn string_encoded_matches_native() {
        let native = json!([{ "text": "Q1", "options": ["A", "B"] }]);
        let encoded = Value::String(native.to_string());
        assert_eq!(
            normalize_questions(&native).unwrap(),
            normalize_questions(&encoded).unwrap()
        );
    }

    #[test]
    fn bare_string_questions() {
        let raw = json!(["¿Tu empresa usa reportes básicos?", "¿Se aplican análisis avanzados?"]);
        let questions = normalize_questions(&raw).unwrap();
        assert_eq!(questions[0].id, 0);
        assert_eq!(questions[1].id, 1);
        assert!(questions[0].options.is_empty());
    }

    #[test]
    fn option_objects_with_text_field() {
        let raw = json!([{ "text": "Q1", "options": [{ "text": "Sí" }, "No"] }]);
        let questions = normalize_questions(&raw).unwrap();
        assert_eq!(questions[0].options, vec!["Sí", "No"]);
    }

    #[test]
    fn null_means_no_questions() {
        assert!(normalize_questions(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn rejects_non_array_shapes() {
        assert!(matches!(
            normalize_questions(&json!({"text": "Q1"})),
            Err(SchemaError::NotAnArray("object"))
        ));
        assert!(matches!(
            normalize_questions(&Value::String("42".into())),
            Err(SchemaError::NotAnArray("number"))
        ));
    }

    #[test]
    fn rejects_question_without_text() {
        let raw = json!([{ "options": ["A"] }]);
        assert!(matches!(
            normalize_questions(&raw),
            Err(SchemaError::BadQuestion(0))
        ));
    }

    #[test]
    fn round_trips_through_canonical_form() {
        let raw = json!([{ "id": 3, "text": "Q", "options": ["A"], "multiple": true }]);
        let questions = normalize_questions(&raw).unwrap();
        let stored = questions_to_value(&questions);
        assert_eq!(normalize_questions(&stored).unwrap(), questions);
    }
}
