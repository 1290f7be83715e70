pub mod builder;
pub mod hints;
pub mod reader;
pub mod record;
pub mod unit;

pub use builder::{BuildReport, InputParseError, UnitBuilder, UnitBuilderConfig};
pub use hints::{Hint, HintCollector};
pub use reader::FileReader;
pub use unit::ExtractionUnit;

use anyhow::Result;
use std::path::Path;
use tracing::info;

/// Main ingestion step: read annotated JSONL and build extraction units
pub async fn ingest_file(file_path: &Path, config: UnitBuilderConfig) -> Result<BuildReport> {
    let content = FileReader::read_jsonl(file_path).await?;

    let builder = UnitBuilder::new(config);
    let report = builder.build_from_jsonl(&content);

    info!(
        path = %file_path.display(),
        lines = report.lines_read,
        units = report.units.len(),
        malformed = report.malformed_lines,
        blank = report.blank_records,
        "Built extraction units"
    );

    Ok(report)
}
