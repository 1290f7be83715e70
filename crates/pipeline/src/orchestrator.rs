use crate::cancel::StopSignal;
use crate::metrics::{AttemptOutcome, Metrics, TimedOperation};
use crate::retry::RetryPolicy;
use crate::writer::JsonlWriter;
use anyhow::{Context, Result};
use extract::{ChatClient, Extractor, ResultRecord, TransportError};
use ingest::ExtractionUnit;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWrite;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Content used when every inference attempt for a unit failed.
const EXHAUSTED_PLACEHOLDER: &str = "{}";

#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub workers: usize,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub total_units: usize,
    pub batches: usize,
    pub records_written: usize,
    pub degraded_records: usize,
    pub units_skipped_by_stop: usize,
}

#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("model returned empty content")]
    Empty,
}

enum BatchOutcome {
    Completed(Vec<ResultRecord>),
    Skipped(usize),
}

/// Per-unit work shared by every batch task.
#[derive(Clone)]
struct UnitWorker {
    client: Arc<dyn ChatClient>,
    extractor: Arc<Extractor>,
    retry: RetryPolicy,
    metrics: Arc<Metrics>,
}

impl UnitWorker {
    async fn process(&self, unit: &ExtractionUnit) -> ResultRecord {
        self.metrics.record_dispatch();
        let prompt = self.extractor.build_prompt(unit);
        let operation = format!("inference:{}", unit.chunk_id);

        let content = self
            .retry
            .retry(&operation, |attempt| {
                let prompt = &prompt;
                async move {
                    debug!(chunk_id = %unit.chunk_id, attempt, "Dispatching inference request");
                    let timer = TimedOperation::start();
                    match self.client.complete(&prompt.system, &prompt.user).await {
                        Ok(content) if content.trim().is_empty() => {
                            self.metrics.record_attempt(timer.elapsed(), AttemptOutcome::Empty);
                            Err(AttemptError::Empty)
                        }
                        Ok(content) => {
                            self.metrics.record_attempt(timer.elapsed(), AttemptOutcome::Content);
                            Ok(content)
                        }
                        Err(e) => {
                            self.metrics
                                .record_attempt(timer.elapsed(), AttemptOutcome::TransportError);
                            Err(AttemptError::from(e))
                        }
                    }
                }
            })
            .await;

        let content = match content {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    doc_id = %unit.doc_id,
                    chunk_id = %unit.chunk_id,
                    error = %e,
                    "Retries exhausted, emitting empty record"
                );
                self.metrics.record_exhausted();
                EXHAUSTED_PLACEHOLDER.to_string()
            }
        };

        self.extractor.record_from_response(unit, &content)
    }

    async fn process_batch(&self, batch: &[ExtractionUnit]) -> Vec<ResultRecord> {
        let mut records = Vec::with_capacity(batch.len());
        for unit in batch {
            records.push(self.process(unit).await);
        }
        records
    }
}

/// Bounded worker pool over unit batches. Batches run concurrently, units
/// inside a batch run in order, and the caller's writer receives whole
/// batches in submission order.
pub struct Orchestrator {
    worker: UnitWorker,
    settings: PoolSettings,
    stop: StopSignal,
}

impl Orchestrator {
    pub fn new(
        client: Arc<dyn ChatClient>,
        extractor: Extractor,
        retry: RetryPolicy,
        settings: PoolSettings,
        metrics: Arc<Metrics>,
        stop: StopSignal,
    ) -> Self {
        Self {
            worker: UnitWorker {
                client,
                extractor: Arc::new(extractor),
                retry,
                metrics,
            },
            settings: PoolSettings {
                workers: settings.workers.max(1),
                batch_size: settings.batch_size.max(1),
            },
            stop,
        }
    }

    pub async fn run<W>(
        &self,
        units: Vec<ExtractionUnit>,
        writer: &mut JsonlWriter<W>,
    ) -> Result<RunSummary>
    where
        W: AsyncWrite + Unpin,
    {
        let total_units = units.len();
        let batches = into_batches(units, self.settings.batch_size);
        let total_batches = batches.len();

        info!(
            units = total_units,
            batches = total_batches,
            workers = self.settings.workers,
            batch_size = self.settings.batch_size,
            max_attempts = self.worker.retry.max_attempts(),
            "Starting extraction"
        );

        let handles = self.spawn_batches(batches);

        let mut summary = RunSummary {
            total_units,
            batches: total_batches,
            ..RunSummary::default()
        };

        let mut pending = handles.into_iter().enumerate();
        while let Some((index, handle)) = pending.next() {
            if let Err(e) = self.drain_batch(index, handle, writer, &mut summary).await {
                for (_, handle) in pending {
                    handle.abort();
                }
                return Err(e);
            }
        }

        info!(
            written = summary.records_written,
            degraded = summary.degraded_records,
            skipped = summary.units_skipped_by_stop,
            "Extraction finished"
        );

        Ok(summary)
    }

    fn spawn_batches(
        &self,
        batches: Vec<Vec<ExtractionUnit>>,
    ) -> Vec<JoinHandle<Result<BatchOutcome>>> {
        let permits = Arc::new(Semaphore::new(self.settings.workers));

        batches
            .into_iter()
            .map(|batch| {
                let permits = permits.clone();
                let worker = self.worker.clone();
                let stop = self.stop.clone();

                tokio::spawn(async move {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .context("Worker pool closed")?;

                    if stop.is_stopped() {
                        return Ok(BatchOutcome::Skipped(batch.len()));
                    }
                    Ok(BatchOutcome::Completed(worker.process_batch(&batch).await))
                })
            })
            .collect()
    }

    async fn drain_batch<W>(
        &self,
        index: usize,
        handle: JoinHandle<Result<BatchOutcome>>,
        writer: &mut JsonlWriter<W>,
        summary: &mut RunSummary,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let outcome = handle.await.context("Batch task failed")??;

        match outcome {
            BatchOutcome::Completed(records) => {
                writer.write_batch(&records).await?;
                for record in &records {
                    let degraded = record.is_degraded();
                    self.worker.metrics.record_written(
                        record.entities.len(),
                        record.relations.len(),
                        degraded,
                    );
                    if degraded {
                        summary.degraded_records += 1;
                    }
                }
                summary.records_written += records.len();

                info!(
                    batch = index + 1,
                    batches = summary.batches,
                    written = summary.records_written,
                    total = summary.total_units,
                    "Batch written"
                );
            }
            BatchOutcome::Skipped(count) => {
                summary.units_skipped_by_stop += count;
                debug!(batch = index + 1, units = count, "Batch skipped after stop request");
            }
        }
        Ok(())
    }
}

fn into_batches(units: Vec<ExtractionUnit>, size: usize) -> Vec<Vec<ExtractionUnit>> {
    let mut batches = Vec::with_capacity(units.len().div_ceil(size));
    let mut units = units.into_iter();
    loop {
        let batch: Vec<ExtractionUnit> = units.by_ref().take(size).collect();
        if batch.is_empty() {
            break;
        }
        batches.push(batch);
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackoffStrategy;
    use async_trait::async_trait;
    use extract::{Entity, Relation};
    use serde_json::Value;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    type Responder = dyn Fn(&str, usize) -> Result<String, TransportError> + Send + Sync;

    /// Answers from a closure over the user prompt and the global call number.
    struct ScriptedClient {
        calls: AtomicUsize,
        delay: fn(&str) -> Duration,
        respond: Box<Responder>,
    }

    impl ScriptedClient {
        fn new(
            respond: impl Fn(&str, usize) -> Result<String, TransportError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: |_| Duration::ZERO,
                respond: Box::new(respond),
            }
        }

        fn with_delay(mut self, delay: fn(&str) -> Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn complete(&self, _system: &str, user: &str) -> Result<String, TransportError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let delay = (self.delay)(user);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            (self.respond)(user, call)
        }
    }

    /// Records how many calls overlap and the order units reach the model.
    #[derive(Default)]
    struct GaugeClient {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        order: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl ChatClient for GaugeClient {
        async fn complete(&self, _system: &str, user: &str) -> Result<String, TransportError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.order.lock().unwrap().push(unit_number(user));

            tokio::time::sleep(Duration::from_millis(5)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok("{}".into())
        }
    }

    fn unavailable() -> TransportError {
        TransportError::Status {
            status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
            body: "model loading".into(),
        }
    }

    fn numbered_units(count: usize) -> Vec<ExtractionUnit> {
        (1..=count)
            .map(|n| {
                ExtractionUnit::new(format!("ROW_{n}"), n, format!("record unit-{n:02} body"))
            })
            .collect()
    }

    fn unit_number(user: &str) -> usize {
        let start = user.find("unit-").map(|i| i + 5).unwrap_or(0);
        user[start..start + 2].parse().unwrap_or(0)
    }

    fn orchestrator(
        client: Arc<dyn ChatClient>,
        workers: usize,
        batch_size: usize,
        max_attempts: usize,
        stop: StopSignal,
    ) -> (Orchestrator, Arc<Metrics>) {
        let metrics = Metrics::new();
        let orchestrator = Orchestrator::new(
            client,
            Extractor::new(),
            RetryPolicy::new(max_attempts, 1, 5, BackoffStrategy::Linear),
            PoolSettings {
                workers,
                batch_size,
            },
            metrics.clone(),
            stop,
        );
        (orchestrator, metrics)
    }

    fn output_lines(writer: JsonlWriter<Vec<u8>>) -> Vec<Value> {
        String::from_utf8(writer.into_inner())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_output_follows_input_order() {
        // Later units answer first
        let client = ScriptedClient::new(|user, _| {
            Ok(format!(
                r#"{{"entities": [], "relations": [], "intent": "unit_{:02}"}}"#,
                unit_number(user)
            ))
        })
        .with_delay(|user| Duration::from_millis(2 * (21 - unit_number(user)) as u64));

        let (orchestrator, metrics) =
            orchestrator(Arc::new(client), 4, 3, 3, StopSignal::new());
        let mut writer = JsonlWriter::new(Vec::new());

        let summary = orchestrator.run(numbered_units(20), &mut writer).await.unwrap();

        assert_eq!(summary.total_units, 20);
        assert_eq!(summary.batches, 7);
        assert_eq!(summary.records_written, 20);
        assert_eq!(metrics.records_written(), 20);

        let lines = output_lines(writer);
        let doc_ids: Vec<&str> = lines.iter().map(|l| l["doc_id"].as_str().unwrap()).collect();
        let expected: Vec<String> = (1..=20).map(|n| format!("ROW_{n}")).collect();
        assert_eq!(doc_ids, expected);
        assert_eq!(lines[6]["intent"], "unit_07");
    }

    #[tokio::test]
    async fn test_exhausted_units_still_yield_records() {
        let client = ScriptedClient::new(|_, _| Err(unavailable()));
        let (orchestrator, metrics) =
            orchestrator(Arc::new(client), 2, 2, 2, StopSignal::new());
        let mut writer = JsonlWriter::new(Vec::new());

        let summary = orchestrator.run(numbered_units(3), &mut writer).await.unwrap();

        assert_eq!(summary.records_written, 3);
        assert_eq!(summary.degraded_records, 0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.inference_attempts, 6);
        assert_eq!(snapshot.transport_errors, 6);
        assert_eq!(snapshot.retries_exhausted, 3);

        for line in output_lines(writer) {
            assert_eq!(line["entities"], serde_json::json!([]));
            assert_eq!(line["relations"], serde_json::json!([]));
            assert_eq!(line["intent"], "");
            assert!(line.get("_llm_raw").is_none());
        }
    }

    #[tokio::test]
    async fn test_blank_content_is_retried() {
        let client = ScriptedClient::new(|_, call| {
            if call == 1 {
                Ok("   \n".into())
            } else {
                Ok(r#"{"entities": [{"name": "Card", "type": "PRODUCT"}], "intent": "card_info"}"#.into())
            }
        });
        let (orchestrator, metrics) =
            orchestrator(Arc::new(client), 1, 1, 3, StopSignal::new());
        let mut writer = JsonlWriter::new(Vec::new());

        orchestrator.run(numbered_units(1), &mut writer).await.unwrap();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.inference_attempts, 2);
        assert_eq!(snapshot.empty_responses, 1);
        assert_eq!(snapshot.retries_exhausted, 0);

        let lines = output_lines(writer);
        assert_eq!(lines[0]["entities"][0]["name"], "Card");
        assert_eq!(lines[0]["intent"], "card_info");
    }

    #[tokio::test]
    async fn test_prose_response_is_degraded() {
        let prose = "Sorry, I cannot help with that.";
        let client = ScriptedClient::new(move |_, _| Ok(prose.to_string()));
        let (orchestrator, _) = orchestrator(Arc::new(client), 2, 2, 3, StopSignal::new());
        let mut writer = JsonlWriter::new(Vec::new());

        let summary = orchestrator.run(numbered_units(2), &mut writer).await.unwrap();

        assert_eq!(summary.degraded_records, 2);
        for line in output_lines(writer) {
            assert_eq!(line["entities"], serde_json::json!([]));
            assert_eq!(line["_llm_raw"]["raw"], prose);
        }
    }

    #[tokio::test]
    async fn test_stop_before_run_skips_everything() {
        let client = Arc::new(ScriptedClient::new(|_, _| Ok("{}".into())));
        let stop = StopSignal::new();
        stop.stop();
        let (orchestrator, _) = orchestrator(client.clone(), 2, 2, 1, stop);
        let mut writer = JsonlWriter::new(Vec::new());

        let summary = orchestrator.run(numbered_units(5), &mut writer).await.unwrap();

        assert_eq!(summary.records_written, 0);
        assert_eq!(summary.units_skipped_by_stop, 5);
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        assert!(output_lines(writer).is_empty());
    }

    #[tokio::test]
    async fn test_stop_finishes_current_batch() {
        let stop = StopSignal::new();
        let trigger = stop.clone();
        let client = ScriptedClient::new(move |_, _| {
            trigger.stop();
            Ok("{}".into())
        });
        let (orchestrator, _) = orchestrator(Arc::new(client), 1, 2, 1, stop);
        let mut writer = JsonlWriter::new(Vec::new());

        let summary = orchestrator.run(numbered_units(6), &mut writer).await.unwrap();

        assert_eq!(summary.records_written, 2);
        assert_eq!(summary.units_skipped_by_stop, 4);

        let lines = output_lines(writer);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["doc_id"], "ROW_1");
        assert_eq!(lines[1]["doc_id"], "ROW_2");
    }

    #[tokio::test]
    async fn test_auto_pay_scenario() {
        let client = ScriptedClient::new(|_, _| {
            Ok(r#"```json
{"entities": [{"name": "App", "type": "APP"}, {"name": "auto-pay", "type": "FEATURE"}], "relations": [], "intent": "auto_payment_setup"}
```"#
                .into())
        });
        let (orchestrator, _) = orchestrator(Arc::new(client), 2, 8, 3, StopSignal::new());
        let unit = ExtractionUnit::new(
            "ROW_1".into(),
            1,
            "Q: How do I set up auto-pay? A: Open the app and enable auto-pay from Settings."
                .into(),
        );
        let mut writer = JsonlWriter::new(Vec::new());

        orchestrator.run(vec![unit], &mut writer).await.unwrap();

        let lines = output_lines(writer);
        let record: ResultRecord = serde_json::from_value(lines[0].clone()).unwrap();

        assert_eq!(record.doc_id, "ROW_1");
        assert_eq!(
            record.entities,
            vec![Entity::new("App", "APP"), Entity::new("auto-pay", "FEATURE")]
        );
        assert_eq!(
            record.relations,
            vec![Relation::new("App", "supports", "auto-pay", Some(0.9))]
        );
        assert_eq!(record.intent, "auto_payment_setup");
    }

    #[tokio::test]
    async fn test_in_flight_calls_bounded_by_workers() {
        let client = Arc::new(GaugeClient::default());
        let (orchestrator, _) = orchestrator(client.clone(), 2, 4, 1, StopSignal::new());
        let mut writer = JsonlWriter::new(Vec::new());

        orchestrator.run(numbered_units(12), &mut writer).await.unwrap();

        assert_eq!(client.peak.load(Ordering::SeqCst), 2);

        // Units of one batch reach the model one after another, in order
        let order = client.order.lock().unwrap().clone();
        assert_eq!(order.len(), 12);
        for batch in [1..=4, 5..=8, 9..=12] {
            let seen: Vec<usize> = order.iter().copied().filter(|n| batch.contains(n)).collect();
            assert_eq!(seen, batch.collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_single_worker_runs_units_in_input_order() {
        let client = Arc::new(GaugeClient::default());
        let (orchestrator, _) = orchestrator(client.clone(), 1, 3, 1, StopSignal::new());
        let mut writer = JsonlWriter::new(Vec::new());

        orchestrator.run(numbered_units(7), &mut writer).await.unwrap();

        assert_eq!(client.peak.load(Ordering::SeqCst), 1);
        assert_eq!(*client.order.lock().unwrap(), (1..=7).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_exhausted_placeholder_is_still_normalized() {
        let client = ScriptedClient::new(|_, _| Err(unavailable()));
        let (orchestrator, metrics) =
            orchestrator(Arc::new(client), 1, 1, 2, StopSignal::new());
        let unit = ExtractionUnit::new(
            "ROW_9".into(),
            9,
            "Q: How do I set up auto-pay? A: Open the app and enable auto-pay from Settings."
                .into(),
        );
        let mut writer = JsonlWriter::new(Vec::new());

        orchestrator.run(vec![unit], &mut writer).await.unwrap();

        assert_eq!(metrics.snapshot().retries_exhausted, 1);
        let lines = output_lines(writer);
        let record: ResultRecord = serde_json::from_value(lines[0].clone()).unwrap();
        assert_eq!(record.entities, vec![Entity::new("auto-pay", "FEATURE")]);
        assert!(record.relations.is_empty());
        assert_eq!(record.intent, "");
        assert!(!record.is_degraded());
    }

    #[test]
    fn test_into_batches() {
        let sizes: Vec<usize> = into_batches(numbered_units(7), 3).iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert!(into_batches(Vec::new(), 3).is_empty());
    }
}
