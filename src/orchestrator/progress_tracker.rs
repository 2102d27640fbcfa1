//! # Progress Tracking Module
//!
//! Ascolta gli eventi del registry e li traduce in feedback per l'utente:
//! progress bar tradizionale oppure righe JSON.
//!
//! Il tracker termina quando tutti i job del batch hanno un esito, oppure
//! quando il canale degli eventi viene chiuso. Se il receiver resta indietro
//! (`Lagged`) gli eventi persi vengono ricostruiti da uno snapshot del
//! registry, così un esito perso non blocca l'attesa.

use crate::{
    json_output::JsonMessage,
    job::{JobId, JobState},
    progress::ProgressManager,
    registry::{JobEvent, JobRegistry},
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

/// Where the tracker sends its updates
pub enum ProgressOutput {
    Bar(ProgressManager),
    Json,
}

/// Counters collected while the batch ran
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub last_aggregate: u8,
}

pub struct ProgressTracker {
    output: ProgressOutput,
    registry: Arc<JobRegistry>,
    names: HashMap<JobId, String>,
    /// Terminal outcome per job (`true` = succeeded)
    settled: HashMap<JobId, bool>,
    last_aggregate: u8,
}

impl ProgressTracker {
    /// Track every job currently in `registry`
    pub fn new(output: ProgressOutput, registry: Arc<JobRegistry>) -> Self {
        let names = registry
            .snapshot()
            .into_iter()
            .map(|job| (job.id, job.source.name))
            .collect();

        Self {
            output,
            registry,
            names,
            settled: HashMap::new(),
            last_aggregate: 0,
        }
    }

    fn name_of(&self, id: &JobId) -> String {
        self.names
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    fn summary(&self) -> TrackerSummary {
        let succeeded = self.settled.values().filter(|ok| **ok).count();
        TrackerSummary {
            succeeded,
            failed: self.settled.len() - succeeded,
            last_aggregate: self.last_aggregate,
        }
    }

    /// Consume events until every job has settled
    pub async fn run(mut self, mut events: broadcast::Receiver<JobEvent>) -> TrackerSummary {
        let total = self.names.len();

        while self.settled.len() < total {
            match events.recv().await {
                Ok(event) => self.handle(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Progress display skipped {} event(s), resyncing", skipped);
                    self.resync();
                }
                Err(RecvError::Closed) => break,
            }
        }

        let summary = self.summary();
        if let ProgressOutput::Bar(ref bar) = self.output {
            bar.finish(&format!(
                "{} converted, {} failed",
                summary.succeeded, summary.failed
            ));
        }

        summary
    }

    /// Rebuild terminal outcomes from the registry after missed events
    fn resync(&mut self) {
        for job in self.registry.snapshot() {
            if !self.names.contains_key(&job.id) || self.settled.contains_key(&job.id) {
                continue;
            }
            match job.state {
                JobState::Succeeded { .. } => self.record(job.id, true, None),
                JobState::Failed { message, .. } => self.record(job.id, false, Some(message)),
                JobState::Pending | JobState::Running { .. } => {}
            }
        }

        self.last_aggregate = self.registry.aggregate_progress();
        if let ProgressOutput::Bar(ref bar) = self.output {
            bar.set_aggregate(self.last_aggregate);
        }
    }

    fn handle(&mut self, event: JobEvent) {
        match event {
            JobEvent::Started { id } => {
                debug!("Started {}", self.name_of(&id));
            }
            JobEvent::Progress {
                id,
                progress,
                aggregate,
            } => {
                self.last_aggregate = aggregate;
                match &self.output {
                    ProgressOutput::Bar(bar) => bar.set_aggregate(aggregate),
                    ProgressOutput::Json => JsonMessage::Progress {
                        id,
                        progress,
                        aggregate,
                    }
                    .emit(),
                }
            }
            JobEvent::Succeeded { id, aggregate } => {
                self.last_aggregate = aggregate;
                self.record(id, true, None);
            }
            JobEvent::Failed {
                id,
                message,
                aggregate,
            } => {
                self.last_aggregate = aggregate;
                self.record(id, false, Some(message));
            }
            JobEvent::BatchReplaced { .. } | JobEvent::Cleared => {}
        }
    }

    /// Count one terminal outcome; repeats from a resync are ignored
    fn record(&mut self, id: JobId, succeeded: bool, error: Option<String>) {
        if self.settled.contains_key(&id) || !self.names.contains_key(&id) {
            return;
        }
        self.settled.insert(id.clone(), succeeded);

        let aggregate = self.last_aggregate;
        match &self.output {
            ProgressOutput::Bar(bar) => {
                let tag = if succeeded { "[OK]" } else { "[ERROR]" };
                bar.set_aggregate(aggregate);
                bar.set_settled(
                    self.settled.len(),
                    &format!("{} {}", tag, self.name_of(&id)),
                );
            }
            ProgressOutput::Json => JsonMessage::JobComplete {
                id,
                succeeded,
                error,
                aggregate,
            }
            .emit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{ConvertedFile, SourceFile};
    use std::time::Duration;

    fn registry_with(count: usize) -> (Arc<JobRegistry>, Vec<JobId>) {
        let registry = Arc::new(JobRegistry::new());
        let files = (0..count)
            .map(|i| SourceFile::new(format!("{}.jpg", i), "image/jpeg", 0, vec![1u8; 8]))
            .collect();
        let ids = registry.replace_all(files).unwrap().accepted;
        (registry, ids)
    }

    #[tokio::test]
    async fn test_tracker_stops_when_batch_settles() {
        let (registry, ids) = registry_with(2);

        let tracker = ProgressTracker::new(
            ProgressOutput::Bar(ProgressManager::hidden(2)),
            registry.clone(),
        );
        let handle = tokio::spawn(tracker.run(registry.subscribe()));

        registry.set_running(&ids[0]).unwrap();
        registry.set_running(&ids[1]).unwrap();
        registry.set_progress(&ids[0], 50).unwrap();
        registry
            .set_succeeded(
                &ids[0],
                ConvertedFile {
                    name: "0.webp".to_string(),
                    mime_type: "image/webp".to_string(),
                    last_modified: 0,
                    bytes: vec![0u8; 4].into(),
                },
            )
            .unwrap();
        registry.set_failed(&ids[1], "Failed to convert 1.jpg: boom").unwrap();

        let summary = handle.await.unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.last_aggregate, registry.aggregate_progress());
    }

    #[tokio::test]
    async fn test_tracker_recovers_outcomes_lost_to_lag() {
        let (registry, ids) = registry_with(30);
        let tracker = ProgressTracker::new(
            ProgressOutput::Bar(ProgressManager::hidden(30)),
            registry.clone(),
        );
        let events = registry.subscribe();

        // The first outcome is pushed out of the channel buffer by the rest
        registry.set_failed(&ids[0], "Failed to convert 0.jpg: early").unwrap();
        for id in &ids[1..] {
            for percent in 1..100 {
                registry.set_progress(id, percent).unwrap();
            }
            registry.set_failed(id, "late").unwrap();
        }
        assert!(registry.all_settled());

        let summary = tokio::time::timeout(Duration::from_secs(2), tracker.run(events))
            .await
            .expect("tracker must finish once the batch has settled");
        assert_eq!(summary.failed, 30);
        assert_eq!(summary.succeeded, 0);
    }
}
