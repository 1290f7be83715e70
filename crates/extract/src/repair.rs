//! Best-effort repair of near-JSON model output.

use crate::error::ParseFailure;
use crate::ontology::DEFAULT_ENTITY_TYPE;
use crate::schema::{Entity, GraphFragment, Relation};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static LEADING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^```(?:json)?\s*").unwrap());
static TRAILING_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*```$").unwrap());
static TRAILING_COMMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",\s*([}\]])").unwrap());

/// Parses raw model text into a fragment. Relation confidences stay as the
/// model gave them; the normalizer fills and clamps them.
pub fn parse(raw: &str) -> Result<GraphFragment, ParseFailure> {
    let unfenced = strip_fences(raw);
    let plain = remove_trailing_commas(&unfenced);
    let folded = remove_trailing_commas(&unfenced.replace('\'', "\""));

    // Unfolded first so apostrophes inside valid JSON strings survive
    let mut candidates = vec![plain];
    if folded != candidates[0] {
        candidates.push(folded);
    }

    candidates
        .iter()
        .find_map(|candidate| parse_candidate(candidate))
        .ok_or_else(|| ParseFailure { raw: raw.to_string() })
}

fn strip_fences(raw: &str) -> String {
    let text = raw.trim();
    let text = LEADING_FENCE.replace(text, "");
    TRAILING_FENCE.replace(&text, "").trim().to_string()
}

fn remove_trailing_commas(text: &str) -> String {
    TRAILING_COMMA.replace_all(text, "$1").into_owned()
}

/// Whole text first, then the span from the first `{` to the last `}`.
fn parse_candidate(text: &str) -> Option<GraphFragment> {
    if let Some(fragment) = parse_object(text) {
        return Some(fragment);
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_object(&text[start..=end])
}

fn parse_object(text: &str) -> Option<GraphFragment> {
    let value: Value = serde_json::from_str(text).ok()?;
    fragment_from_value(&value)
}

/// Lenient field extraction. Only a non-object top level is rejected.
pub fn fragment_from_value(value: &Value) -> Option<GraphFragment> {
    let object = value.as_object()?;

    let entities = object
        .get("entities")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(entity_from_value).collect())
        .unwrap_or_default();

    let relations = object
        .get("relations")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(relation_from_value).collect())
        .unwrap_or_default();

    let intent = object
        .get("intent")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Some(GraphFragment { entities, relations, intent })
}

fn entity_from_value(value: &Value) -> Option<Entity> {
    let name = value.get("name").and_then(scalar_text)?;
    let entity_type = value
        .get("type")
        .and_then(scalar_text)
        .unwrap_or_else(|| DEFAULT_ENTITY_TYPE.to_string());
    Some(Entity::new(name, entity_type))
}

fn relation_from_value(value: &Value) -> Option<Relation> {
    value.as_object()?;

    let field = |key: &str| value.get(key).and_then(scalar_text).unwrap_or_default();
    let confidence = value.get("confidence").and_then(|c| match c {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    });

    Some(Relation::new(field("head"), field("relation"), field("tail"), confidence))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
