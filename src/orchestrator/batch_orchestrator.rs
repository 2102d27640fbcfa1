//! # Batch Orchestrator Module
//!
//! Esegue la conversione di tutti i job del batch corrente in parallelo.
//!
//! ## Responsabilità:
//! - Cattura uno snapshot delle `ConversionOptions` all'avvio del run
//! - Avvia un task tokio per ogni job (concorrenza illimitata di default,
//!   limitabile con un `Semaphore`)
//! - Attende che *tutti* i task abbiano un esito (settle-all, non fail-fast)
//! - Converte panic o errori di scheduling di un task in un fallimento del
//!   solo job coinvolto
//!
//! ## Garanzie:
//! - `run_batch` fallisce per intero solo su violazioni di contratto
//!   (`EmptyBatch`, opzioni non valide)
//! - Al ritorno ogni job del batch è in stato terminale
//!
//! ## Esempio:
//! ```rust,ignore
//! let orchestrator = BatchOrchestrator::new(registry.clone(), codec);
//! let outcome = orchestrator.run_batch(&ConversionOptions::default()).await?;
//! info!("{} ok, {} failed", outcome.succeeded.len(), outcome.failed.len());
//! ```

use crate::{
    codec::Codec,
    error::{ConvertError, Result},
    job::JobId,
    options::ConversionOptions,
    orchestrator::task_converter::TaskConverter,
    registry::JobRegistry,
};
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{error, info};

/// Ids of the jobs grouped by terminal outcome
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub succeeded: Vec<JobId>,
    pub failed: Vec<JobId>,
    pub duration: Duration,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Drives every job of the registry through the codec
pub struct BatchOrchestrator {
    registry: Arc<JobRegistry>,
    codec: Arc<dyn Codec>,
    max_concurrent_jobs: Option<usize>,
    job_timeout: Option<Duration>,
}

impl BatchOrchestrator {
    pub fn new(registry: Arc<JobRegistry>, codec: Arc<dyn Codec>) -> Self {
        Self {
            registry,
            codec,
            max_concurrent_jobs: None,
            job_timeout: None,
        }
    }

    /// Cap the number of jobs converting at the same time
    pub fn with_max_concurrent_jobs(mut self, limit: Option<usize>) -> Self {
        self.max_concurrent_jobs = limit.filter(|n| *n > 0);
        self
    }

    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Convert every job and resolve once all of them have settled
    pub async fn run_batch(&self, options: &ConversionOptions) -> Result<BatchOutcome> {
        options.validate()?;

        let jobs = self.registry.snapshot();
        if jobs.is_empty() {
            return Err(ConvertError::EmptyBatch);
        }

        let start = Instant::now();
        info!(
            "Converting {} image(s) to {} (quality: {}, max dimension: {}, keep metadata: {})",
            jobs.len(),
            options.target_format,
            options.quality_percent(),
            options.max_dimension,
            options.preserve_metadata
        );

        let converter = TaskConverter {
            registry: self.registry.clone(),
            codec: self.codec.clone(),
            options: Arc::new(options.clone()),
            timeout: self.job_timeout,
        };
        let semaphore = self.max_concurrent_jobs.map(|n| Arc::new(Semaphore::new(n)));

        let mut labels = Vec::with_capacity(jobs.len());
        let mut tasks = Vec::with_capacity(jobs.len());
        for job in jobs {
            let id = job.id.clone();
            let name = job.source.name.clone();
            let converter = converter.clone();
            let semaphore = semaphore.clone();

            let task = tokio::spawn(async move {
                let _permit = match semaphore {
                    Some(semaphore) => match semaphore.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(e) => {
                            let message = format!("Failed to convert {}: {}", job.source.name, e);
                            let _ = converter.registry.set_failed(&job.id, message);
                            return false;
                        }
                    },
                    None => None,
                };

                converter.run(job).await
            });

            labels.push((id, name));
            tasks.push(task);
        }

        // Settle-all join: every handle is awaited regardless of earlier failures
        let results = join_all(tasks).await;
        let mut outcome = BatchOutcome::default();
        for ((id, name), result) in labels.into_iter().zip(results) {
            match result {
                Ok(true) => outcome.succeeded.push(id),
                Ok(false) => outcome.failed.push(id),
                Err(e) => {
                    error!("Conversion task for {} aborted: {}", name, e);
                    let _ = self
                        .registry
                        .set_failed(&id, format!("Failed to convert {}: {}", name, e));
                    outcome.failed.push(id);
                }
            }
        }

        outcome.duration = start.elapsed();
        info!(
            "Batch settled in {:.2}s: {} succeeded, {} failed",
            outcome.duration.as_secs_f64(),
            outcome.succeeded.len(),
            outcome.failed.len()
        );

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ProgressReporter;
    use crate::error::CodecError;
    use crate::job::SourceFile;
    use crate::registry::JobEvent;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted codec: output is a quarter of the input, names containing
    /// "bad" fail, names containing "panic" panic.
    struct ScriptedCodec {
        delays: HashMap<String, u64>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScriptedCodec {
        fn new() -> Self {
            Self {
                delays: HashMap::new(),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        fn with_delay(mut self, name: &str, millis: u64) -> Self {
            self.delays.insert(name.to_string(), millis);
            self
        }
    }

    #[async_trait]
    impl Codec for ScriptedCodec {
        async fn convert(
            &self,
            source: &SourceFile,
            _options: &ConversionOptions,
            progress: ProgressReporter,
        ) -> std::result::Result<Vec<u8>, CodecError> {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);

            progress.report(10.0);
            let delay = self.delays.get(&source.name).copied().unwrap_or(5);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            progress.report(35.4);
            progress.report(20.0);

            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if source.name.contains("panic") {
                panic!("codec crashed");
            }
            if source.name.contains("bad") {
                return Err(CodecError::Encode("corrupt data".to_string()));
            }
            Ok(vec![0u8; source.bytes.len() / 4])
        }
    }

    fn jpeg(name: &str, size: usize) -> SourceFile {
        SourceFile::new(name, "image/jpeg", 1_700_000_000, vec![1u8; size])
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        let registry = Arc::new(JobRegistry::new());
        let orchestrator = BatchOrchestrator::new(registry, Arc::new(ScriptedCodec::new()));

        let err = orchestrator.run_batch(&ConversionOptions::default()).await.unwrap_err();
        assert!(matches!(err, ConvertError::EmptyBatch));
    }

    #[tokio::test]
    async fn test_invalid_options_are_rejected_before_running() {
        let registry = Arc::new(JobRegistry::new());
        registry.replace_all(vec![jpeg("a.jpg", 100)]).unwrap();
        let orchestrator = BatchOrchestrator::new(registry.clone(), Arc::new(ScriptedCodec::new()));

        let options = ConversionOptions { max_dimension: 0, ..Default::default() };
        assert!(orchestrator.run_batch(&options).await.is_err());
        assert_eq!(registry.snapshot()[0].progress(), 0);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let registry = Arc::new(JobRegistry::new());
        let ids = registry
            .replace_all(vec![
                jpeg("one.jpg", 400),
                jpeg("bad.jpg", 400),
                jpeg("two.jpeg", 800),
                jpeg("panic.jpg", 400),
            ])
            .unwrap()
            .accepted;

        let codec = ScriptedCodec::new().with_delay("one.jpg", 30);
        let orchestrator = BatchOrchestrator::new(registry.clone(), Arc::new(codec));
        let outcome = orchestrator.run_batch(&ConversionOptions::default()).await.unwrap();

        assert_eq!(outcome.total(), 4);
        assert_eq!(outcome.succeeded, vec![ids[0].clone(), ids[2].clone()]);
        assert!(registry.all_settled());

        let one = registry.get(&ids[0]).unwrap();
        let converted = one.converted().unwrap();
        assert_eq!(converted.name, "one.webp");
        assert_eq!(converted.size(), 100);
        assert_eq!(converted.mime_type, "image/webp");

        let two = registry.get(&ids[2]).unwrap();
        assert_eq!(two.converted().unwrap().name, "two.webp");

        let bad = registry.get(&ids[1]).unwrap();
        assert_eq!(bad.error(), Some("Failed to convert bad.jpg: corrupt data"));
        assert_eq!(bad.progress(), 35);

        let crashed = registry.get(&ids[3]).unwrap();
        assert!(crashed.error().unwrap().starts_with("Failed to convert panic.jpg"));

        let sum: u32 = registry.snapshot().iter().map(|job| u32::from(job.progress())).sum();
        assert_eq!(registry.aggregate_progress(), (sum as f64 / 4.0).round() as u8);
    }

    #[tokio::test]
    async fn test_aggregate_reaches_100_when_all_succeed() {
        let registry = Arc::new(JobRegistry::new());
        registry
            .replace_all(vec![jpeg("a.jpg", 40), jpeg("b.png", 40), jpeg("c.gif", 40)])
            .unwrap();

        let orchestrator = BatchOrchestrator::new(registry.clone(), Arc::new(ScriptedCodec::new()));
        let options = ConversionOptions {
            target_format: crate::options::TargetFormat::Avif,
            ..Default::default()
        };
        orchestrator.run_batch(&options).await.unwrap();

        assert_eq!(registry.aggregate_progress(), 100);
        let names: Vec<_> = registry
            .snapshot()
            .iter()
            .map(|job| job.converted().unwrap().name.clone())
            .collect();
        assert_eq!(names, vec!["a.avif", "b.avif", "c.avif"]);
    }

    #[tokio::test]
    async fn test_progress_events_never_regress_per_job() {
        let registry = Arc::new(JobRegistry::new());
        registry
            .replace_all(vec![jpeg("a.jpg", 40), jpeg("b.jpg", 40)])
            .unwrap();
        let mut events = registry.subscribe();

        let orchestrator = BatchOrchestrator::new(registry.clone(), Arc::new(ScriptedCodec::new()));
        orchestrator.run_batch(&ConversionOptions::default()).await.unwrap();

        let mut last: HashMap<JobId, u8> = HashMap::new();
        while let Ok(event) = events.try_recv() {
            match event {
                JobEvent::Progress { id, progress, .. } => {
                    let previous = last.insert(id, progress).unwrap_or(0);
                    assert!(progress >= previous);
                }
                JobEvent::Succeeded { id, .. } => {
                    last.insert(id, 100);
                }
                _ => {}
            }
        }
        assert!(last.values().all(|p| *p == 100));
    }

    #[tokio::test]
    async fn test_concurrency_limit_is_respected() {
        let registry = Arc::new(JobRegistry::new());
        registry
            .replace_all((0..6).map(|i| jpeg(&format!("{}.jpg", i), 40)).collect())
            .unwrap();

        let codec = Arc::new(ScriptedCodec::new());
        let orchestrator = BatchOrchestrator::new(registry.clone(), codec.clone())
            .with_max_concurrent_jobs(Some(2));
        let outcome = orchestrator.run_batch(&ConversionOptions::default()).await.unwrap();

        assert_eq!(outcome.succeeded.len(), 6);
        assert!(codec.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_timeout_fails_only_the_slow_job() {
        let registry = Arc::new(JobRegistry::new());
        let ids = registry
            .replace_all(vec![jpeg("slow.jpg", 40), jpeg("fast.jpg", 40)])
            .unwrap()
            .accepted;

        let codec = ScriptedCodec::new().with_delay("slow.jpg", 2_000);
        let orchestrator = BatchOrchestrator::new(registry.clone(), Arc::new(codec))
            .with_job_timeout(Some(Duration::from_millis(200)));
        let outcome = orchestrator.run_batch(&ConversionOptions::default()).await.unwrap();

        assert_eq!(outcome.failed, vec![ids[0].clone()]);
        assert_eq!(outcome.succeeded, vec![ids[1].clone()]);
        assert!(registry.get(&ids[0]).unwrap().error().unwrap().contains("timed out"));
    }
}
