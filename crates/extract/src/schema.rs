use ingest::ExtractionUnit;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
}

impl Entity {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub head: String,
    pub relation: String,
    pub tail: String,
    /// Absent until the normalizer fills it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Relation {
    pub fn new(
        head: impl Into<String>,
        relation: impl Into<String>,
        tail: impl Into<String>,
        confidence: Option<f64>,
    ) -> Self {
        Self {
            head: head.into(),
            relation: relation.into(),
            tail: tail.into(),
            confidence,
        }
    }
}

/// Entities, relations and intent parsed from one model response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphFragment {
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
    pub intent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFallback {
    pub raw: String,
}

/// One emitted output row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub doc_id: String,
    pub chunk_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub text: String,
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
    pub intent: String,
    /// Present only when the model output could not be parsed at all
    #[serde(rename = "_llm_raw", default, skip_serializing_if = "Option::is_none")]
    pub llm_raw: Option<RawFallback>,
}

impl ResultRecord {
    pub fn from_unit(unit: &ExtractionUnit, fragment: GraphFragment) -> Self {
        Self {
            doc_id: unit.doc_id.clone(),
            chunk_id: unit.chunk_id.clone(),
            question: unit.question.clone(),
            answer: unit.answer.clone(),
            category: unit.category.clone(),
            text: unit.text.clone(),
            entities: fragment.entities,
            relations: fragment.relations,
            intent: fragment.intent,
            llm_raw: None,
        }
    }

    /// Empty-graph record carrying the untouched model output.
    pub fn degraded(unit: &ExtractionUnit, raw: String) -> Self {
        Self {
            llm_raw: Some(RawFallback { raw }),
            ..Self::from_unit(unit, GraphFragment::default())
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.llm_raw.is_some()
    }
}
