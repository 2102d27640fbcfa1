//! # Task Converter Module
//!
//! Worker per la conversione di un singolo job.
//! Separato dall'orchestratore per isolare il fallimento del singolo file.

use crate::{
    codec::{Codec, ProgressReporter},
    job::{ConvertedFile, Job},
    options::ConversionOptions,
    orchestrator::naming::output_name,
    registry::JobRegistry,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-job worker; every outcome is written back to the registry
#[derive(Clone)]
pub struct TaskConverter {
    pub registry: Arc<JobRegistry>,
    pub codec: Arc<dyn Codec>,
    pub options: Arc<ConversionOptions>,
    pub timeout: Option<Duration>,
}

impl TaskConverter {
    /// Convert one job. Returns `true` when the job settled as succeeded.
    pub async fn run(&self, job: Job) -> bool {
        let id = job.id.clone();

        if let Err(e) = self.registry.set_running(&id) {
            warn!("Job {} is no longer in the batch: {}", id, e);
            return false;
        }
        debug!("Converting {} ({} bytes)", job.source.name, job.source.size());

        let (reporter, mut progress) = ProgressReporter::channel();
        let registry = self.registry.clone();
        let forward_id = id.clone();
        let forward = async move {
            while let Some(percent) = progress.recv().await {
                let _ = registry.set_progress(&forward_id, percent.round() as i64);
            }
        };

        let conversion = async {
            let (result, ()) = tokio::join!(
                self.codec.convert(&job.source, &self.options, reporter),
                forward
            );
            result
        };

        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, conversion).await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_) => Err(format!("timed out after {:?}", limit)),
            },
            None => conversion.await.map_err(|e| e.to_string()),
        };

        match result {
            Ok(bytes) => {
                let format = self.options.target_format;
                let converted = ConvertedFile {
                    name: output_name(&job.source.name, format),
                    mime_type: format.mime_type().to_string(),
                    last_modified: job.source.last_modified,
                    bytes: bytes.into(),
                };
                info!(
                    "[OK] {} -> {} ({} -> {} bytes)",
                    job.source.name,
                    converted.name,
                    job.source.size(),
                    converted.size()
                );
                self.registry.set_succeeded(&id, converted).is_ok()
            }
            Err(reason) => {
                let message = format!("Failed to convert {}: {}", job.source.name, reason);
                warn!("[ERROR] {}", message);
                let _ = self.registry.set_failed(&id, message);
                false
            }
        }
    }
}
