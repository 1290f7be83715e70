pub mod cancel;
pub mod config;
pub mod metrics;
pub mod orchestrator;
pub mod retry;
pub mod writer;

pub use cancel::StopSignal;
pub use config::PipelineConfig;
pub use metrics::{Metrics, MetricsSnapshot};
pub use orchestrator::{Orchestrator, PoolSettings, RunSummary};
pub use retry::RetryPolicy;
pub use writer::JsonlWriter;

use anyhow::{Context, Result};
use extract::{ChatClient, ClientOptions, Extractor, OllamaClient};
use serde::Serialize;
use std::sync::Arc;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

/// Everything the binary prints once a run ends.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub lines_read: usize,
    pub malformed_lines: usize,
    pub blank_records: usize,
    pub run: RunSummary,
    pub metrics: MetricsSnapshot,
}

/// Runs the whole extraction against the configured inference endpoint.
pub async fn run_pipeline(config: &PipelineConfig, stop: StopSignal) -> Result<PipelineReport> {
    config.validate()?;

    let client = OllamaClient::new(
        config.inference.base_url.clone(),
        config.inference.model.clone(),
        ClientOptions {
            temperature: config.inference.temperature,
            request_timeout: config.request_timeout(),
            connect_timeout: config.connect_timeout(),
        },
    )
    .context("Failed to create inference client")?;

    run_pipeline_with_client(config, Arc::new(client), stop).await
}

/// Same as [`run_pipeline`] with a caller-supplied client.
///
/// Setup failures (invalid config, unreadable input, unwritable output) are
/// returned before any request is sent. Per-unit failures never surface here.
pub async fn run_pipeline_with_client(
    config: &PipelineConfig,
    client: Arc<dyn ChatClient>,
    stop: StopSignal,
) -> Result<PipelineReport> {
    config.validate()?;
    let (Some(input), Some(output)) = (config.input.as_deref(), config.output.as_deref()) else {
        anyhow::bail!("Input and output paths are required");
    };

    let run_id = Uuid::new_v4();
    let span = info_span!("run", run_id = %run_id);

    async move {
        let report = ingest::ingest_file(input, config.unit_builder_config()).await?;
        for error in &report.errors {
            info!(line = error.line, error = %error.message, "Skipped malformed input line");
        }

        let mut writer = JsonlWriter::create(output).await?;
        info!(path = %output.display(), "Writing records");

        let metrics = Metrics::new();
        let orchestrator = Orchestrator::new(
            client,
            Extractor::new(),
            RetryPolicy::from_config(&config.retry),
            PoolSettings {
                workers: config.concurrency.workers,
                batch_size: config.concurrency.batch_size,
            },
            metrics.clone(),
            stop,
        );

        let run = orchestrator.run(report.units, &mut writer).await?;

        Ok::<_, anyhow::Error>(PipelineReport {
            run_id,
            lines_read: report.lines_read,
            malformed_lines: report.malformed_lines,
            blank_records: report.blank_records,
            run,
            metrics: metrics.snapshot(),
        })
    }
    .instrument(span)
    .await
}
