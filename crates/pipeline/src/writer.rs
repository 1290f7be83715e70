use anyhow::{Context, Result};
use extract::ResultRecord;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

/// Newline-delimited JSON sink. Owned by a single task, so writes are
/// serialized by construction.
pub struct JsonlWriter<W: AsyncWrite + Unpin> {
    inner: BufWriter<W>,
}

impl JsonlWriter<File> {
    /// Creates (truncating) the output file and any missing parent directories.
    pub async fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create output directory: {:?}", parent))?;
        }

        let file = File::create(path)
            .await
            .with_context(|| format!("Failed to create output file: {:?}", path))?;
        Ok(Self::new(file))
    }
}

impl<W: AsyncWrite + Unpin> JsonlWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: BufWriter::new(inner),
        }
    }

    /// Writes one batch and flushes, so completed batches survive a crash.
    pub async fn write_batch(&mut self, records: &[ResultRecord]) -> Result<()> {
        for record in records {
            let mut line = serde_json::to_vec(record).context("Failed to serialize record")?;
            line.push(b'\n');
            self.inner
                .write_all(&line)
                .await
                .context("Failed to write output record")?;
        }
        self.inner.flush().await.context("Failed to flush output")?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract::GraphFragment;
    use ingest::ExtractionUnit;

    fn record(doc: &str) -> ResultRecord {
        let unit = ExtractionUnit::new(doc.into(), 1, "text".into());
        ResultRecord::from_unit(&unit, GraphFragment::default())
    }

    #[tokio::test]
    async fn test_writes_one_line_per_record() {
        let mut writer = JsonlWriter::new(Vec::new());
        writer.write_batch(&[record("A"), record("B")]).await.unwrap();
        writer.write_batch(&[record("C")]).await.unwrap();

        let output = String::from_utf8(writer.into_inner()).unwrap();
        let docs: Vec<String> = output
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["doc_id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(docs, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_create_makes_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/records.jsonl");

        let mut writer = JsonlWriter::create(&path).await.unwrap();
        writer.write_batch(&[record("A")]).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
    }
}
