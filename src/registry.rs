//! # Job Registry Module
//!
//! Unica fonte di verità per il batch corrente e per lo stato di ogni job.
//!
//! ## Responsabilità:
//! - Crea un job per ogni file accettato e sostituisce il batch in modo atomico
//! - Applica le mutazioni (`set_progress`, `set_succeeded`, `set_failed`)
//! - Garantisce progress non decrescente e un solo esito terminale per job
//! - Pubblica ogni mutazione su un canale `broadcast` di `JobEvent`
//!
//! ## Concorrenza:
//! - `RwLock` sul batch: write solo per `replace_all` / `clear`
//! - `Mutex` per singolo job: task diversi non si contendono lo stesso record
//! - La somma dei progress è mantenuta incrementalmente, così il progress
//!   aggregato non richiede di bloccare gli altri job
//!
//! Gli eventi di uno stesso job sono emessi sotto il lock del job, quindi
//! arrivano nell'ordine delle mutazioni. Nessun ordinamento tra job diversi.

use crate::error::{ConvertError, Result};
use crate::job::{ConvertedFile, Job, JobId, JobState, SourceFile};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Mime types accepted at admission
pub const ACCEPTED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif"];

const EVENT_CAPACITY: usize = 1024;

/// Notification published after every registry mutation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    BatchReplaced { jobs: usize },
    Started { id: JobId },
    Progress { id: JobId, progress: u8, aggregate: u8 },
    Succeeded { id: JobId, aggregate: u8 },
    Failed { id: JobId, message: String, aggregate: u8 },
    Cleared,
}

/// Why a file was left out of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    UnsupportedType { mime: String },
    OverQuota { quota: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedFile {
    pub name: String,
    #[serde(flatten)]
    pub reason: RejectReason,
}

/// Result of a successful `replace_all`
#[derive(Debug, Clone, Default)]
pub struct Replacement {
    pub accepted: Vec<JobId>,
    pub rejected: Vec<RejectedFile>,
}

#[derive(Default)]
struct Batch {
    order: Vec<JobId>,
    jobs: HashMap<JobId, Arc<Mutex<Job>>>,
    progress_sum: AtomicU64,
}

impl Batch {
    fn aggregate(&self) -> u8 {
        let count = self.order.len() as u64;
        if count == 0 {
            return 0;
        }
        let sum = self.progress_sum.load(Ordering::SeqCst);
        ((2 * sum + count) / (2 * count)) as u8
    }
}

/// Shared registry of the current batch
pub struct JobRegistry {
    batch: RwLock<Batch>,
    events: broadcast::Sender<JobEvent>,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            batch: RwLock::new(Batch::default()),
            events,
        }
    }

    /// Subscribe to registry mutations
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub fn is_accepted_type(mime: &str) -> bool {
        let mime = mime.trim().to_lowercase();
        ACCEPTED_MIME_TYPES.contains(&mime.as_str())
    }

    /// Replace the whole batch with one fresh job per accepted file.
    ///
    /// Files with an unsupported type are excluded and reported. If no file
    /// is accepted the current batch is left untouched and `InvalidInput`
    /// is returned for the first rejected file.
    pub fn replace_all(&self, files: Vec<SourceFile>) -> Result<Replacement> {
        if files.is_empty() {
            return Err(ConvertError::EmptyBatch);
        }

        let mut replacement = Replacement::default();
        let mut first_invalid = None;
        let mut next = Batch::default();

        for file in files {
            if !Self::is_accepted_type(&file.mime_type) {
                debug!("Rejected {} ({})", file.name, file.mime_type);
                if first_invalid.is_none() {
                    first_invalid = Some(ConvertError::InvalidInput {
                        name: file.name.clone(),
                        mime: file.mime_type.clone(),
                    });
                }
                replacement.rejected.push(RejectedFile {
                    name: file.name,
                    reason: RejectReason::UnsupportedType { mime: file.mime_type },
                });
                continue;
            }

            let job = Job::new(file);
            next.order.push(job.id.clone());
            replacement.accepted.push(job.id.clone());
            next.jobs.insert(job.id.clone(), Arc::new(Mutex::new(job)));
        }

        if next.order.is_empty() {
            return Err(first_invalid.unwrap_or(ConvertError::EmptyBatch));
        }

        let jobs = next.order.len();
        *self.batch.write() = next;

        info!(
            "Batch replaced: {} job(s) admitted, {} rejected",
            jobs,
            replacement.rejected.len()
        );
        let _ = self.events.send(JobEvent::BatchReplaced { jobs });

        Ok(replacement)
    }

    /// Mark a pending job as running
    pub fn set_running(&self, id: &JobId) -> Result<()> {
        self.with_job(id, |job, _batch, events| {
            if let JobState::Pending = job.state {
                job.state = JobState::Running { progress: 0 };
                let _ = events.send(JobEvent::Started { id: id.clone() });
            }
        })
    }

    /// Record progress, clamped to [0, 100]. Lower values than the current
    /// progress and updates to settled jobs are ignored.
    pub fn set_progress(&self, id: &JobId, value: i64) -> Result<()> {
        let value = value.clamp(0, 100) as u8;

        self.with_job(id, |job, batch, events| {
            let current = match job.state {
                JobState::Pending => 0,
                JobState::Running { progress } => progress,
                _ => {
                    debug!("Ignoring progress for settled job {}", id);
                    return;
                }
            };

            if value <= current && !matches!(job.state, JobState::Pending) {
                return;
            }

            let progress = value.max(current);
            batch
                .progress_sum
                .fetch_add(u64::from(progress - current), Ordering::SeqCst);
            job.state = JobState::Running { progress };

            let _ = events.send(JobEvent::Progress {
                id: id.clone(),
                progress,
                aggregate: batch.aggregate(),
            });
        })
    }

    /// Settle a job as succeeded; progress is forced to 100
    pub fn set_succeeded(&self, id: &JobId, converted: ConvertedFile) -> Result<()> {
        self.with_job(id, |job, batch, events| {
            if job.is_terminal() {
                warn!("Job {} already settled as {}, ignoring success", id, job.state.label());
                return;
            }

            let current = job.progress();
            batch
                .progress_sum
                .fetch_add(u64::from(100 - current), Ordering::SeqCst);
            job.state = JobState::Succeeded { converted };

            let _ = events.send(JobEvent::Succeeded {
                id: id.clone(),
                aggregate: batch.aggregate(),
            });
        })
    }

    /// Settle a job as failed; progress stays at its last reported value
    pub fn set_failed(&self, id: &JobId, message: impl Into<String>) -> Result<()> {
        let message = message.into();

        self.with_job(id, |job, batch, events| {
            if job.is_terminal() {
                warn!("Job {} already settled as {}, ignoring failure", id, job.state.label());
                return;
            }

            job.state = JobState::Failed {
                progress: job.progress(),
                message: message.clone(),
            };

            let _ = events.send(JobEvent::Failed {
                id: id.clone(),
                message,
                aggregate: batch.aggregate(),
            });
        })
    }

    /// Empty the batch
    pub fn clear(&self) {
        *self.batch.write() = Batch::default();
        debug!("Registry cleared");
        let _ = self.events.send(JobEvent::Cleared);
    }

    pub fn len(&self) -> usize {
        self.batch.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Job ids in admission order
    pub fn ids(&self) -> Vec<JobId> {
        self.batch.read().order.clone()
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.batch.read().jobs.get(id).map(|job| job.lock().clone())
    }

    /// Point-in-time copy of every job, in admission order
    pub fn snapshot(&self) -> Vec<Job> {
        let batch = self.batch.read();
        batch
            .order
            .iter()
            .filter_map(|id| batch.jobs.get(id))
            .map(|job| job.lock().clone())
            .collect()
    }

    /// Rounded mean of every job's progress
    pub fn aggregate_progress(&self) -> u8 {
        self.batch.read().aggregate()
    }

    /// True when every job has reached a terminal state
    pub fn all_settled(&self) -> bool {
        let batch = self.batch.read();
        batch.jobs.values().all(|job| job.lock().is_terminal())
    }

    fn with_job<F>(&self, id: &JobId, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Job, &Batch, &broadcast::Sender<JobEvent>),
    {
        let batch = self.batch.read();
        let job = batch
            .jobs
            .get(id)
            .ok_or_else(|| ConvertError::UnknownJob(id.clone()))?;

        let mut job = job.lock();
        mutate(&mut *job, &batch, &self.events);
        Ok(())
    }
}
