//! Transient answer selection state for one survey fill-out.
//!
//! The sheet lives only between receiving a submission payload and writing
//! the response row; it is never persisted on its own. Scoring counts
//! answered questions, one point each, regardless of which options were
//! chosen or how many — a placeholder policy, not a quality measure.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// An incoming answer: a single value or a list of values, exactly as the
/// client serialized it.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Selection {
    Single(String),
    Multiple(Vec<String>),
}

#[derive(Debug, Clone, Default)]
pub struct AnswerSheet {
    entries: BTreeMap<String, Selection>,
}

impl AnswerSheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonicalize a submission payload: duplicate multi-select values
    /// collapse, selections left empty disappear.
    pub fn from_payload(answers: BTreeMap<String, AnswerValue>) -> Self {
        let mut sheet = Self::new();
        for (question, value) in answers {
            match value {
                AnswerValue::One(v) => sheet.select(&question, &v),
                AnswerValue::Many(values) => {
                    let mut seen = Vec::new();
                    for v in values {
                        if !seen.contains(&v) {
                            seen.push(v);
                        }
                    }
                    if !seen.is_empty() {
                        sheet.entries.insert(question, Selection::Multiple(seen));
                    }
                }
            }
        }
        sheet
    }

    /// Single-select: replaces any prior value for the question.
    pub fn select(&mut self, question: &str, value: &str) {
        self.entries
            .insert(question.to_string(), Selection::Single(value.to_string()));
    }

    /// Multi-select: adds the value if absent, removes it if present. A
    /// selection toggled down to nothing drops the question entirely.
    pub fn toggle(&mut self, question: &str, value: &str) {
        let mut values = match self.entries.remove(question) {
            Some(Selection::Multiple(values)) => values,
            // Toggling over a single selection restarts it as a set.
            Some(Selection::Single(prev)) => vec![prev],
            None => Vec::new(),
        };
        if let Some(pos) = values.iter().position(|v| v == value) {
            values.remove(pos);
        } else {
            values.push(value.to_string());
        }
        if !values.is_empty() {
            self.entries
                .insert(question.to_string(), Selection::Multiple(values));
        }
    }

    /// One point per answered question.
    pub fn answered_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// The JSON shape stored on the response row.
    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (question, selection) in &self.entries {
            let value = match selection {
                Selection::Single(v) => Value::String(v.clone()),
                Selection::Multiple(values) => Value::Array(
                    values.iter().cloned().map(Value::String).collect(),
                ),
            };
            map.insert(question.clone(), value);
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn toggle_twice_clears_the_selection() {
        let mut sheet = AnswerSheet::new();
        sheet.toggle("0", "A");
        sheet.toggle("0", "A");
        assert!(sheet.is_empty());
        assert_eq!(sheet.answered_count(), 0);
    }

    #[test]
    fn toggle_accumulates_distinct_values() {
        let mut sheet = AnswerSheet::new();
        sheet.toggle("2", "A");
        sheet.toggle("2", "B");
        sheet.toggle("2", "A");
        assert_eq!(sheet.to_value(), json!({ "2": ["B"] }));
    }

    #[test]
    fn select_replaces_prior_value() {
        let mut sheet = AnswerSheet::new();
        sheet.select("1", "A");
        sheet.select("1", "B");
        assert_eq!(sheet.answered_count(), 1);
        assert_eq!(sheet.to_value(), json!({ "1": "B" }));
    }

    #[test]
    fn score_counts_keys_not_cardinality() {
        let payload: BTreeMap<String, AnswerValue> = serde_json::from_value(json!({
            "0": ["A", "B", "C"],
            "1": "D",
            "2": ["E"]
        }))
        .unwrap();
        let sheet = AnswerSheet::from_payload(payload);
        assert_eq!(sheet.answered_count(), 3);
    }

    #[test]
    fn payload_with_single_multi_value() {
        // Survey {id:1, questions:[{text:"Q1", options:["A","B"]}]}, submit {0:["A"]}.
        let payload: BTreeMap<String, AnswerValue> =
            serde_json::from_value(json!({ "0": ["A"] })).unwrap();
        let sheet = AnswerSheet::from_payload(payload);
        assert_eq!(sheet.answered_count(), 1);
        assert_eq!(sheet.to_value(), json!({ "0": ["A"] }));
    }

    #[test]
    fn payload_duplicates_and_empties_collapse() {
        let payload: BTreeMap<String, AnswerValue> = serde_json::from_value(json!({
            "0": ["A", "A"],
            "1": []
        }))
        .unwrap();
        let sheet = AnswerSheet::from_payload(payload);
        assert_eq!(sheet.answered_count(), 1);
        assert_eq!(sheet.to_value(), json!({ "0": ["A"] }));
    }
}
