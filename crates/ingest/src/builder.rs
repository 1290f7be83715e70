use crate::hints::HintCollector;
use crate::record::{first_text, scalar_text, text_field, token_word, TokenArrays, ID_FIELDS};
use crate::unit::ExtractionUnit;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

const MAX_SAMPLED_ERRORS: usize = 10;

pub struct UnitBuilderConfig {
    /// 0 means unbounded
    pub max_units: usize,
    pub keep_qa_prefix: bool,
    pub use_ner_hints: bool,
    pub max_hints: usize,
}

impl Default for UnitBuilderConfig {
    fn default() -> Self {
        Self {
            max_units: 0,
            keep_qa_prefix: true,
            use_ner_hints: true,
            max_hints: 30,
        }
    }
}

/// A JSONL line that could not be parsed. Counted and skipped.
#[derive(Debug, Clone, Error)]
#[error("line {line}: {message}")]
pub struct InputParseError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct BuildReport {
    pub units: Vec<ExtractionUnit>,
    pub lines_read: usize,
    pub malformed_lines: usize,
    pub blank_records: usize,
    pub errors: Vec<InputParseError>,
}

pub struct UnitBuilder {
    config: UnitBuilderConfig,
    hints: HintCollector,
}

impl UnitBuilder {
    pub fn new(config: UnitBuilderConfig) -> Self {
        let hints = HintCollector::new(config.max_hints);
        Self { config, hints }
    }

    /// Builds units from newline-delimited JSON. Line numbers are 1-based and
    /// include blank lines.
    pub fn build_from_jsonl(&self, content: &str) -> BuildReport {
        let mut report = BuildReport::default();

        for (index, line) in content.lines().enumerate() {
            let line_no = index + 1;
            report.lines_read = line_no;

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let record: Value = match serde_json::from_str(line) {
                Ok(record) => record,
                Err(e) => {
                    report.malformed_lines += 1;
                    let error = InputParseError { line: line_no, message: e.to_string() };
                    debug!(%error, "Skipping malformed input line");
                    if report.errors.len() < MAX_SAMPLED_ERRORS {
                        report.errors.push(error);
                    }
                    continue;
                }
            };

            match self.build_unit(&record, line_no) {
                Some(unit) => report.units.push(unit),
                None => {
                    report.blank_records += 1;
                    continue;
                }
            }

            if self.config.max_units > 0 && report.units.len() >= self.config.max_units {
                break;
            }
        }

        report
    }

    /// `None` when no text can be resolved from the record.
    pub fn build_unit(&self, record: &Value, line_no: usize) -> Option<ExtractionUnit> {
        let text = self.resolve_text(record)?;
        let doc_id = resolve_doc_id(record, line_no);

        let question = text_field(record, "question").map(str::to_string);
        let answer = text_field(record, "answer").map(str::to_string);
        let category = text_field(record, "type").map(str::to_string);

        let hints = if self.config.use_ner_hints {
            self.hints.collect(record)
        } else {
            Vec::new()
        };

        Some(
            ExtractionUnit::new(doc_id, line_no, text)
                .with_qa(question, answer)
                .with_category(category)
                .with_hints(hints),
        )
    }

    fn resolve_text(&self, record: &Value) -> Option<String> {
        [
            self.compose_qa(record),
            join_sentences(record),
            rebuild_from_tokens(record),
        ]
        .into_iter()
        .flatten()
        .find(|text| !text.is_empty())
    }

    /// "Q: <question> A: <answer>", prefixes controlled by `keep_qa_prefix`.
    fn compose_qa(&self, record: &Value) -> Option<String> {
        let question = text_field(record, "question");
        let answer = text_field(record, "answer");
        if question.is_none() && answer.is_none() {
            return None;
        }

        let prefix = self.config.keep_qa_prefix;
        let part = |label: &str, value: Option<&str>| match (value, prefix) {
            (Some(v), true) => format!("{label}: {v}"),
            (Some(v), false) => v.to_string(),
            (None, true) => format!("{label}:"),
            (None, false) => String::new(),
        };

        let combined = format!("{} {}", part("Q", question), part("A", answer));
        Some(combined.trim().to_string())
    }
}

fn resolve_doc_id(record: &Value, line_no: usize) -> String {
    if let Some(row) = record.get("rowIndex").filter(|v| v.is_number()) {
        if let Some(row) = scalar_text(row) {
            return format!("ROW_{row}");
        }
    }

    first_text(record, &ID_FIELDS)
        .map(str::to_string)
        .unwrap_or_else(|| format!("DOC_{line_no}"))
}

fn join_sentences(record: &Value) -> Option<String> {
    let sentences = record.get("sentences")?.as_array()?;

    let joined = sentences
        .iter()
        .filter_map(|s| text_field(s, "text"))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    Some(joined)
}

fn rebuild_from_tokens(record: &Value) -> Option<String> {
    let words: Vec<String> = TokenArrays::new(record)
        .flat_map(|tokens| tokens.iter().map(token_word))
        .map(|word| word.trim().to_string())
        .filter(|word| !word.is_empty())
        .collect();

    Some(words.join(" "))
}
