//! Static vocabularies shared by prompt rendering and post-processing.

/// Entity type labels offered to the model. Softly enforced: other labels are
/// accepted and only selectively remapped.
pub const ONTOLOGY: [&str; 7] = [
    "APP",
    "PLAN",
    "FEATURE",
    "BENEFIT",
    "PAYMENT_METHOD",
    "ORG",
    "PRODUCT",
];

/// Closed relation vocabulary.
pub const RELATIONS: [&str; 6] = [
    "supports",
    "enables",
    "includes",
    "accepts_method",
    "belongs_to",
    "uses",
];

/// Type given to entities the model returned without one.
pub const DEFAULT_ENTITY_TYPE: &str = "Entity";

pub const APP_TYPE: &str = "APP";
pub const FEATURE_TYPE: &str = "FEATURE";
pub const PRODUCT_TYPE: &str = "PRODUCT";
pub const BENEFIT_TYPE: &str = "BENEFIT";

/// Lowercase substrings that move a PRODUCT entity to BENEFIT.
pub const BENEFIT_TRIGGERS: [&str; 3] = ["allowance", "benefit", "credit"];

/// Feature phrase synthesized as an entity whenever the source text mentions it.
pub const FEATURE_PHRASE: &str = "auto-pay";

pub const SUPPORTS: &str = "supports";
pub const ACCEPTS_METHOD: &str = "accepts_method";

pub const DEFAULT_CONFIDENCE: f64 = 0.75;
pub const SYNTHESIZED_CONFIDENCE: f64 = 0.9;
pub const REDIRECTED_CONFIDENCE: f64 = 0.85;

/// Folds a relation label into the closed vocabulary. Unknown labels are
/// returned unchanged.
pub fn canonical_relation(label: &str) -> Option<&'static str> {
    let folded = match label.trim().to_lowercase().as_str() {
        "include" | "includes" | "contain" | "contains" => "includes",
        "support" | "supports" => "supports",
        "enable" | "enables" => "enables",
        "use" | "uses" => "uses",
        "accepts_method" => "accepts_method",
        "belongs_to" => "belongs_to",
        _ => return None,
    };
    Some(folded)
}
