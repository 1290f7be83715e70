use anyhow::Result;
use clap::Parser;
use pipeline::{PipelineConfig, StopSignal, run_pipeline};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Extract knowledge-graph fragments from annotated JSONL with a local LLM.
#[derive(Parser, Debug)]
#[command(name = "kg-extract", version, about)]
struct Cli {
    /// JSON config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Annotated input records (.jsonl)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output records (.jsonl)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long)]
    model: Option<String>,

    /// Inference endpoint base URL
    #[arg(long)]
    base_url: Option<String>,

    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    /// Attempts per unit before falling back to an empty record
    #[arg(long)]
    max_retries: Option<usize>,

    #[arg(long)]
    temperature: Option<f64>,

    /// Stop after this many units (0 = all)
    #[arg(long)]
    max_units: Option<usize>,

    #[arg(long)]
    keep_qa_prefix: Option<bool>,

    #[arg(long)]
    use_ner_hints: Option<bool>,

    #[arg(long)]
    max_hints: Option<usize>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn into_config(self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(input) = self.input {
            config.input = Some(input);
        }
        if let Some(output) = self.output {
            config.output = Some(output);
        }
        if let Some(model) = self.model {
            config.inference.model = model;
        }
        if let Some(base_url) = self.base_url {
            config.inference.base_url = base_url;
        }
        if let Some(temperature) = self.temperature {
            config.inference.temperature = temperature;
        }
        if let Some(workers) = self.workers {
            config.concurrency.workers = workers;
        }
        if let Some(batch_size) = self.batch_size {
            config.concurrency.batch_size = batch_size;
        }
        if let Some(max_retries) = self.max_retries {
            config.retry.max_retries = max_retries;
        }
        if let Some(max_units) = self.max_units {
            config.units.max_units = max_units;
        }
        if let Some(keep) = self.keep_qa_prefix {
            config.units.keep_qa_prefix = keep;
        }
        if let Some(use_hints) = self.use_ner_hints {
            config.units.use_ner_hints = use_hints;
        }
        if let Some(max_hints) = self.max_hints {
            config.units.max_hints = max_hints;
        }

        Ok(config)
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = cli.into_config()?;

    let stop = StopSignal::new();
    let on_signal = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Stop requested, finishing in-flight batches");
            on_signal.stop();
        }
    });

    let report = run_pipeline(&config, stop).await?;

    info!(
        run_id = %report.run_id,
        written = report.run.records_written,
        degraded = report.run.degraded_records,
        skipped = report.run.units_skipped_by_stop,
        "Run complete"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
