pub mod error;
pub mod llm;
pub mod normalizer;
pub mod ontology;
pub mod prompt;
pub mod repair;
pub mod schema;

pub use error::{ParseFailure, TransportError};
pub use llm::{ChatClient, ClientOptions, OllamaClient};
pub use normalizer::ConsistencyNormalizer;
pub use prompt::Prompt;
pub use schema::{Entity, GraphFragment, RawFallback, Relation, ResultRecord};

use ingest::ExtractionUnit;
use tracing::warn;

/// Turns units into prompts and model responses into output records. Holds no
/// per-unit state, so one instance is shared by every worker.
#[derive(Debug, Default, Clone)]
pub struct Extractor {
    normalizer: ConsistencyNormalizer,
}

impl Extractor {
    pub fn new() -> Self {
        Self {
            normalizer: ConsistencyNormalizer::new(),
        }
    }

    pub fn build_prompt(&self, unit: &ExtractionUnit) -> Prompt {
        prompt::build_prompt(unit)
    }

    /// Repair, normalize and package one response. Never fails: unparsable
    /// output becomes a degraded record carrying the raw text.
    pub fn record_from_response(&self, unit: &ExtractionUnit, content: &str) -> ResultRecord {
        match repair::parse(content) {
            Ok(fragment) => {
                let fragment = self.normalizer.normalize(fragment, &unit.text);
                ResultRecord::from_unit(unit, fragment)
            }
            Err(failure) => {
                warn!(
                    doc_id = %unit.doc_id,
                    chunk_id = %unit.chunk_id,
                    error = %failure,
                    "Model output could not be parsed, emitting raw fallback"
                );
                ResultRecord::degraded(unit, failure.raw)
            }
        }
    }
}
