//! Lenient accessors over annotated input records.
//!
//! Records arrive as arbitrary JSON objects. Every accessor here returns
//! `None` (or an empty iterator) instead of failing when a field is missing
//! or has an unexpected shape.

use serde_json::Value;
use std::collections::VecDeque;

/// Field names tried, in order, when a record has no numeric row index.
pub const ID_FIELDS: [&str; 5] = ["doc_id", "document_id", "id", "source_id", "docId"];

/// Returns the field's value only when it is a JSON string.
pub fn text_field<'a>(record: &'a Value, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str)
}

/// First non-blank string value among `keys`.
pub fn first_text<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| text_field(record, key))
        .find(|value| !value.trim().is_empty())
}

/// Renders strings, numbers and booleans as text. Objects, arrays and null
/// have no text form.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Breadth-first walk over every `tokens` array nested anywhere in a record.
pub struct TokenArrays<'a> {
    queue: VecDeque<&'a Value>,
}

impl<'a> TokenArrays<'a> {
    pub fn new(root: &'a Value) -> Self {
        let mut queue = VecDeque::new();
        if root.is_object() || root.is_array() {
            queue.push_back(root);
        }
        Self { queue }
    }
}

impl<'a> Iterator for TokenArrays<'a> {
    type Item = &'a [Value];

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current) = self.queue.pop_front() {
            let found = current
                .get("tokens")
                .and_then(Value::as_array)
                .map(Vec::as_slice);

            match current {
                Value::Object(map) => self.queue.extend(map.values()),
                Value::Array(items) => self.queue.extend(items.iter()),
                _ => {}
            }

            if found.is_some() {
                return found;
            }
        }
        None
    }
}

/// One token's surface word, or `""` when absent.
pub fn token_word(token: &Value) -> String {
    token.get("word").and_then(scalar_text).unwrap_or_default()
}

/// One token's named-entity tag; anything other than a string counts as `"O"`.
pub fn token_tag(token: &Value) -> &str {
    token.get("ner").and_then(Value::as_str).unwrap_or("O")
}
