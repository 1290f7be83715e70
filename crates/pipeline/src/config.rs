use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub inference: InferenceConfig,
    pub concurrency: ConcurrencyConfig,
    pub retry: RetryConfig,
    pub units: UnitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub workers: usize,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    Linear,      // attempt * base
    Exponential, // base * 2^(attempt-1), capped
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub strategy: BackoffStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitConfig {
    /// 0 means unbounded
    pub max_units: usize,
    pub keep_qa_prefix: bool,
    pub use_ner_hints: bool,
    pub max_hints: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            inference: InferenceConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            retry: RetryConfig::default(),
            units: UnitConfig::default(),
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "qwen2.5:7b-instruct-q4_K_M".to_string(),
            temperature: 0.0,
            request_timeout_secs: 120,
            connect_timeout_secs: 20,
        }
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            workers: 6,
            batch_size: 8,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 500,
            max_backoff_ms: 10000,
            strategy: BackoffStrategy::Linear,
        }
    }
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            max_units: 0,
            keep_qa_prefix: true,
            use_ner_hints: true,
            max_hints: 30,
        }
    }
}

impl PipelineConfig {
    /// Loads a JSON config file; absent fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file: {:?}", path))?;
        Ok(config)
    }

    /// Rejects settings that would make the run meaningless. Called before any
    /// input is read or request dispatched.
    pub fn validate(&self) -> Result<()> {
        if self.input.is_none() {
            anyhow::bail!("Missing required input path (--input)");
        }
        if self.output.is_none() {
            anyhow::bail!("Missing required output path (--output)");
        }
        if self.concurrency.workers == 0 {
            anyhow::bail!("Worker count must be at least 1");
        }
        if self.concurrency.batch_size == 0 {
            anyhow::bail!("Batch size must be at least 1");
        }
        if self.inference.base_url.trim().is_empty() {
            anyhow::bail!("Inference base URL must not be empty");
        }
        if self.inference.model.trim().is_empty() {
            anyhow::bail!("Model identifier must not be empty");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.inference.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.inference.connect_timeout_secs)
    }

    pub fn unit_builder_config(&self) -> ingest::UnitBuilderConfig {
        ingest::UnitBuilderConfig {
            max_units: self.units.max_units,
            keep_qa_prefix: self.units.keep_qa_prefix,
            use_ner_hints: self.units.use_ner_hints,
            max_hints: self.units.max_hints,
        }
    }
}
