use crate::hints::Hint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One normalized piece of work submitted for knowledge extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionUnit {
    pub doc_id: String,
    pub chunk_id: String,
    pub question: Option<String>,
    pub answer: Option<String>,
    #[serde(rename = "type")]
    pub category: Option<String>,
    pub text: String,
    pub hints: Vec<Hint>,
}

impl ExtractionUnit {
    pub fn new(
        doc_id: String,
        line_no: usize,
        text: String,
    ) -> Self {
        let chunk_id = Self::generate_chunk_id(&doc_id, line_no);

        Self {
            doc_id,
            chunk_id,
            question: None,
            answer: None,
            category: None,
            text,
            hints: Vec::new(),
        }
    }

    /// 16 hex chars from `doc_id` and the record's line position. Stable for a
    /// given input file, not unique across differently ordered inputs.
    pub fn generate_chunk_id(doc_id: &str, line_no: usize) -> String {
        let mut hasher = Sha256::new();
        hasher.update(doc_id.as_bytes());
        hasher.update(b"||");
        hasher.update(line_no.to_string().as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..8])
    }

    pub fn with_qa(mut self, question: Option<String>, answer: Option<String>) -> Self {
        self.question = question;
        self.answer = answer;
        self
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }

    pub fn with_hints(mut self, hints: Vec<Hint>) -> Self {
        self.hints = hints;
        self
    }
}
