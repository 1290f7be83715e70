use crate::ontology::{ONTOLOGY, RELATIONS};
use ingest::ExtractionUnit;
use std::fmt::Write;
use std::sync::LazyLock;

const OUTPUT_SCHEMA: &str = r#"{
  "entities": [{"name": "...", "type": "..."}],
  "relations": [{"head": "...", "relation": "...", "tail": "...", "confidence": 0.0}],
  "intent": "..."
}"#;

static SYSTEM_PROMPT: LazyLock<String> = LazyLock::new(|| {
    let ontology = ONTOLOGY.join(", ");
    let relations = RELATIONS.join(", ");

    format!(
        r#"You are a precise information extraction system that builds a knowledge graph.
From the given TEXT (it may contain a Question and an Answer) and optional HINTS (from NER),
return ONLY a valid JSON object that follows the SCHEMA. No explanations, no prose, no code fences.

RULES:
1. Extract every relevant entity (apps, plans, features, benefits, payment methods, organizations, products). Each entity has {{name, type}}.
2. Entity types must come from: [{ontology}]. Map loosely to the closest type when unsure.
3. Actions, services or capabilities offered by an app, plan or system are FEATURE entities. Infer the feature name from the action ('set up auto-pay' -> 'auto-pay').
4. Split coordinated mentions: 'bank account or credit card' is two entities, 'bank account' and 'credit card'. Never put 'or'/'and' inside a name.
5. Relations have {{head, relation, tail, confidence}}. Use only: [{relations}]. head and tail must exactly match entity names.
6. Direction follows natural semantics: APP -> FEATURE (supports), FEATURE -> PAYMENT_METHOD (accepts_method), PLAN -> BENEFIT/PRODUCT (includes).
7. Terms naming credits, allowances, bonuses or benefits are BENEFIT, not PRODUCT. PRODUCT is for tangible, purchasable items.
8. confidence is a number in [0,1]; use 0.75 when plausible but not certain.
9. intent is a short snake_case task label, e.g. 'auto_payment_setup' or 'plan_benefits_query'.

SCHEMA:
{OUTPUT_SCHEMA}"#
    )
});

/// The two messages sent for one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

pub fn system_prompt() -> &'static str {
    SYSTEM_PROMPT.as_str()
}

pub fn build_prompt(unit: &ExtractionUnit) -> Prompt {
    Prompt {
        system: system_prompt().to_string(),
        user: build_user_prompt(unit),
    }
}

pub fn build_user_prompt(unit: &ExtractionUnit) -> String {
    let mut prompt = format!("TEXT:\n{}\n\n", unit.text);

    if !unit.hints.is_empty() {
        prompt.push_str("HINTS (NER):\n");
        for hint in &unit.hints {
            // Writing to a String cannot fail
            let _ = writeln!(prompt, "- {} :: {}", hint.name, hint.hint_type);
        }
        prompt.push('\n');
    }

    if let Some(category) = unit.category.as_deref().filter(|c| !c.trim().is_empty()) {
        let _ = writeln!(prompt, "CATEGORY (from source): {}\n", category);
    }

    let _ = writeln!(prompt, "Allowed entity types: {}", ONTOLOGY.join(", "));
    let _ = writeln!(prompt, "Allowed relations: {}\n", RELATIONS.join(", "));
    let _ = writeln!(prompt, "SCHEMA (return exactly this JSON shape):\n{}", OUTPUT_SCHEMA);

    prompt
}
