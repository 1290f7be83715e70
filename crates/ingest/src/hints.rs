use crate::record::{token_tag, token_word, TokenArrays};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

const OUTSIDE: &str = "O";

/// A named-entity span surfaced to the model as an extraction hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hint {
    pub name: String,
    #[serde(rename = "type")]
    pub hint_type: String,
}

/// Collects contiguous same-tag entity spans from every token array in a record.
pub struct HintCollector {
    max_hints: usize,
}

impl HintCollector {
    pub fn new(max_hints: usize) -> Self {
        Self { max_hints }
    }

    /// Hints in first-seen order, deduplicated by lowercase `name|type`,
    /// capped at `max_hints`.
    pub fn collect(&self, record: &Value) -> Vec<Hint> {
        let mut sink = HintSink {
            hints: Vec::new(),
            seen: HashSet::new(),
            limit: self.max_hints,
        };

        for tokens in TokenArrays::new(record) {
            if sink.is_full() {
                break;
            }

            let mut span = Span::default();
            for token in tokens {
                let tag = token_tag(token);
                let word = token_word(token);

                if tag != OUTSIDE && !word.trim().is_empty() {
                    if span.tag.as_deref().is_some_and(|current| current != tag) {
                        span.flush_into(&mut sink);
                    }
                    span.words.push(word);
                    span.tag = Some(tag.to_string());
                } else {
                    span.flush_into(&mut sink);
                }

                if sink.is_full() {
                    break;
                }
            }
            // End of array closes any open span
            span.flush_into(&mut sink);
        }

        sink.hints
    }
}

#[derive(Default)]
struct Span {
    words: Vec<String>,
    tag: Option<String>,
}

impl Span {
    fn flush_into(&mut self, sink: &mut HintSink) {
        if self.words.is_empty() {
            return;
        }
        let name = self.words.join(" ");
        let tag = self.tag.take().unwrap_or_else(|| "Entity".to_string());
        self.words.clear();
        sink.push(name.trim(), &tag);
    }
}

struct HintSink {
    hints: Vec<Hint>,
    seen: HashSet<String>,
    limit: usize,
}

impl HintSink {
    fn is_full(&self) -> bool {
        self.hints.len() >= self.limit
    }

    fn push(&mut self, name: &str, hint_type: &str) {
        if name.is_empty() || self.is_full() {
            return;
        }
        let key = format!("{name}|{hint_type}").to_lowercase();
        if self.seen.insert(key) {
            self.hints.push(Hint {
                name: name.to_string(),
                hint_type: hint_type.to_string(),
            });
        }
    }
}
