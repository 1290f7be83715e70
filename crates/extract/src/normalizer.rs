use crate::ontology::{
    canonical_relation, ACCEPTS_METHOD, APP_TYPE, BENEFIT_TRIGGERS, BENEFIT_TYPE,
    DEFAULT_CONFIDENCE, DEFAULT_ENTITY_TYPE, FEATURE_PHRASE, FEATURE_TYPE, PRODUCT_TYPE,
    REDIRECTED_CONFIDENCE, SUPPORTS, SYNTHESIZED_CONFIDENCE,
};
use crate::schema::{Entity, GraphFragment, Relation};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, trace};

// Only a standalone word: "Buy-and-Save" stays whole
static COORDINATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\s+(?:or|and)\s+").unwrap());

/// Working state threaded through the passes.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft<'a> {
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
    pub source_text: &'a str,
}

pub type Pass = fn(&mut Draft<'_>);

/// Order matters: each pass relies on the invariants of the ones before it.
pub const PASSES: [(&str, Pass); 8] = [
    ("coordination_split", split_coordinated),
    ("dedup", dedup_entities),
    ("retype", retype_benefits),
    ("feature_synthesis", synthesize_feature),
    ("relation_redirect", redirect_feature_relations),
    ("vocabulary", fold_relation_vocabulary),
    ("confidence", clamp_confidence),
    ("referential_prune", prune_dangling_relations),
];

/// Deterministic post-processing that makes a parsed fragment graph-consistent.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsistencyNormalizer;

impl ConsistencyNormalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(&self, fragment: GraphFragment, source_text: &str) -> GraphFragment {
        let GraphFragment { entities, relations, intent } = fragment;
        let mut draft = Draft { entities, relations, source_text };

        for (name, pass) in PASSES {
            pass(&mut draft);
            trace!(
                pass = name,
                entities = draft.entities.len(),
                relations = draft.relations.len(),
                "Applied normalization pass"
            );
        }

        GraphFragment {
            entities: draft.entities,
            relations: draft.relations,
            intent,
        }
    }
}

/// Case folding shared by every name and label comparison below.
fn fold(text: &str) -> String {
    text.to_lowercase()
}

fn same(a: &str, b: &str) -> bool {
    a == b || fold(a) == fold(b)
}

/// True when `label` folds to the canonical relation `canonical`.
fn is_relation(label: &str, canonical: &str) -> bool {
    canonical_relation(label).unwrap_or(label) == canonical
}

fn find_entity<'e>(entities: &'e [Entity], name: &str) -> Option<&'e Entity> {
    entities.iter().find(|e| same(&e.name, name))
}

/// "bank account or credit card" becomes two entities of the same type.
pub fn split_coordinated(draft: &mut Draft<'_>) {
    let entities = std::mem::take(&mut draft.entities);

    for entity in entities {
        if !COORDINATOR.is_match(&entity.name) {
            draft.entities.push(entity);
            continue;
        }

        for part in COORDINATOR.split(&entity.name) {
            let part = part.trim_matches(|c: char| c.is_whitespace() || matches!(c, ',' | '/' | '&' | ';'));
            if !part.is_empty() {
                draft.entities.push(Entity::new(part, entity.entity_type.clone()));
            }
        }
    }
}

/// First occurrence of each case-insensitive (name, type) wins. Blank names
/// are dropped and blank types get the generic label.
pub fn dedup_entities(draft: &mut Draft<'_>) {
    let mut seen = HashSet::new();
    let entities = std::mem::take(&mut draft.entities);

    for entity in entities {
        let name = entity.name.trim();
        if name.is_empty() {
            continue;
        }
        let entity_type = match entity.entity_type.trim() {
            "" => DEFAULT_ENTITY_TYPE,
            t => t,
        };

        let key = (fold(name), fold(entity_type));
        if seen.insert(key) {
            draft.entities.push(Entity::new(name, entity_type));
        }
    }
}

pub fn retype_benefits(draft: &mut Draft<'_>) {
    for entity in &mut draft.entities {
        if !same(&entity.entity_type, PRODUCT_TYPE) {
            continue;
        }
        let name = fold(&entity.name);
        if BENEFIT_TRIGGERS.iter().any(|trigger| name.contains(trigger)) {
            entity.entity_type = BENEFIT_TYPE.to_string();
        }
    }
}

/// Adds the feature entity when the text mentions it, then dedups again since
/// retyping may have produced new (name, type) collisions.
pub fn synthesize_feature(draft: &mut Draft<'_>) {
    let mentioned = fold(draft.source_text).contains(FEATURE_PHRASE);
    if mentioned && find_entity(&draft.entities, FEATURE_PHRASE).is_none() {
        draft.entities.push(Entity::new(FEATURE_PHRASE, FEATURE_TYPE));
    }
    dedup_entities(draft);
}

/// APP supports the feature; legacy `APP accepts_method X` edges move to
/// `feature accepts_method X`.
pub fn redirect_feature_relations(draft: &mut Draft<'_>) {
    let Some(feature) = find_entity(&draft.entities, FEATURE_PHRASE).map(|e| e.name.clone()) else {
        return;
    };
    let Some(app) = draft
        .entities
        .iter()
        .find(|e| same(&e.entity_type, APP_TYPE))
        .map(|e| e.name.clone())
    else {
        return;
    };

    let already_linked = draft.relations.iter().any(|r| {
        same(&r.head, &app) && is_relation(&r.relation, SUPPORTS) && same(&r.tail, &feature)
    });
    if !already_linked {
        draft.relations.push(Relation::new(
            app.clone(),
            SUPPORTS,
            feature.clone(),
            Some(SYNTHESIZED_CONFIDENCE),
        ));
    }

    for relation in &mut draft.relations {
        if is_relation(&relation.relation, ACCEPTS_METHOD) && same(&relation.head, &app) {
            relation.head = feature.clone();
            relation.confidence.get_or_insert(REDIRECTED_CONFIDENCE);
        }
    }
}

pub fn fold_relation_vocabulary(draft: &mut Draft<'_>) {
    for relation in &mut draft.relations {
        if let Some(canonical) = canonical_relation(&relation.relation) {
            relation.relation = canonical.to_string();
        }
    }
}

/// Missing, non-finite or non-positive confidences get the default; values
/// above 1 are clamped.
pub fn clamp_confidence(draft: &mut Draft<'_>) {
    for relation in &mut draft.relations {
        let confidence = match relation.confidence {
            Some(c) if c.is_finite() && c > 0.0 => c.min(1.0),
            _ => DEFAULT_CONFIDENCE,
        };
        relation.confidence = Some(confidence);
    }
}

/// Drops relations whose head or tail is not a known entity name.
pub fn prune_dangling_relations(draft: &mut Draft<'_>) {
    let names: HashSet<String> = draft.entities.iter().map(|e| fold(&e.name)).collect();

    draft.relations.retain(|r| {
        let valid = names.contains(&fold(&r.head)) && names.contains(&fold(&r.tail));
        if !valid {
            debug!(head = %r.head, relation = %r.relation, tail = %r.tail, "Dropping relation with unknown endpoint");
        }
        valid
    });
}
