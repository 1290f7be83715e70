use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

pub struct FileReader;

impl FileReader {
    /// Reads a newline-delimited JSON file of annotated records.
    pub async fn read_jsonl(path: &Path) -> Result<String> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match extension {
            "jsonl" | "ndjson" | "json" | "" => {}
            _ => anyhow::bail!("Unsupported input format: {}", extension),
        }

        let metadata = fs::metadata(path)
            .await
            .with_context(|| format!("Input file not found: {:?}", path))?;
        if !metadata.is_file() {
            anyhow::bail!("Input path is not a file: {:?}", path);
        }

        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read input file: {:?}", path))?;
        Ok(content)
    }
}
