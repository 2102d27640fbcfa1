//! # Result Aggregator Module
//!
//! Viste derivate dallo stato terminale dei job ed export dei risultati.
//!
//! ## Responsabilità:
//! - `summarize()`: dimensioni e risparmio per ogni job riuscito
//! - `failures()`: job falliti con il relativo messaggio (mai nascosti)
//! - `stats()`: statistiche aggregate del batch
//! - `export_all()`: archivio unico via `Archiver` → `DownloadSink`
//! - `export_one()`: singolo file convertito → `DownloadSink`
//!
//! ## Calcolo risparmio:
//! - `saved_bytes = original_size - converted_size` (può essere negativo)
//! - `saved_percent = round(saved_bytes / original_size * 100)`, 0 se l'originale è vuoto

use crate::{
    archive::{ArchiveEntry, Archiver},
    download::DownloadSink,
    error::{ConvertError, Result},
    file_manager::FileManager,
    job::{Job, JobId},
    registry::JobRegistry,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Size report for one succeeded job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryEntry {
    pub id: JobId,
    pub name: String,
    pub converted_name: String,
    pub original_size: u64,
    pub converted_size: u64,
    pub saved_bytes: i64,
    pub saved_percent: i64,
}

impl SummaryEntry {
    fn from_job(job: &Job) -> Option<Self> {
        let converted = job.converted()?;
        let original_size = job.source.size();
        let converted_size = converted.size();
        let saved_bytes = original_size as i64 - converted_size as i64;

        Some(Self {
            id: job.id.clone(),
            name: job.source.name.clone(),
            converted_name: converted.name.clone(),
            original_size,
            converted_size,
            saved_bytes,
            saved_percent: saved_percent(saved_bytes, original_size),
        })
    }
}

/// Diagnostic entry for one failed job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureEntry {
    pub id: JobId,
    pub name: String,
    pub message: String,
}

/// Totals over a settled batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchStats {
    pub files_succeeded: usize,
    pub files_failed: usize,
    pub total_original_size: u64,
    pub total_converted_size: u64,
    pub total_bytes_saved: i64,
}

impl BatchStats {
    pub fn overall_reduction_percent(&self) -> f64 {
        if self.total_original_size > 0 {
            (self.total_bytes_saved as f64 / self.total_original_size as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn format_summary(&self) -> String {
        let saved = if self.total_bytes_saved >= 0 {
            FileManager::format_size(self.total_bytes_saved as u64)
        } else {
            format!("-{}", FileManager::format_size(self.total_bytes_saved.unsigned_abs()))
        };

        format!(
            "Converted: {} | Failed: {} | {} -> {} | Total saved: {} ({:.2}%)",
            self.files_succeeded,
            self.files_failed,
            FileManager::format_size(self.total_original_size),
            FileManager::format_size(self.total_converted_size),
            saved,
            self.overall_reduction_percent()
        )
    }
}

/// Rounds half toward positive infinity
fn saved_percent(saved_bytes: i64, original_size: u64) -> i64 {
    if original_size == 0 {
        return 0;
    }
    (saved_bytes as f64 / original_size as f64 * 100.0 + 0.5).floor() as i64
}

/// Read-side view over the registry once a batch has settled
pub struct ResultAggregator {
    registry: Arc<JobRegistry>,
}

impl ResultAggregator {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self { registry }
    }

    /// One entry per succeeded job, in admission order
    pub fn summarize(&self) -> Vec<SummaryEntry> {
        self.registry
            .snapshot()
            .iter()
            .filter_map(SummaryEntry::from_job)
            .collect()
    }

    pub fn failures(&self) -> Vec<FailureEntry> {
        self.registry
            .snapshot()
            .iter()
            .filter_map(|job| {
                job.error().map(|message| FailureEntry {
                    id: job.id.clone(),
                    name: job.source.name.clone(),
                    message: message.to_string(),
                })
            })
            .collect()
    }

    pub fn stats(&self) -> BatchStats {
        let mut stats = BatchStats {
            files_failed: self.failures().len(),
            ..Default::default()
        };

        for entry in self.summarize() {
            stats.files_succeeded += 1;
            stats.total_original_size += entry.original_size;
            stats.total_converted_size += entry.converted_size;
            stats.total_bytes_saved += entry.saved_bytes;
        }

        stats
    }

    /// Pack every converted file into one container and hand it to `sink`.
    ///
    /// Colliding output names (`a.jpg` and `a.png` both become `a.webp`)
    /// are disambiguated as `a (1).webp`.
    pub async fn export_all(
        &self,
        archiver: &dyn Archiver,
        sink: &dyn DownloadSink,
        archive_name: &str,
    ) -> Result<usize> {
        let mut used = HashSet::new();
        let entries: Vec<ArchiveEntry> = self
            .registry
            .snapshot()
            .iter()
            .filter_map(|job| job.converted())
            .map(|converted| ArchiveEntry {
                name: unique_name(&converted.name, &mut used),
                last_modified: converted.last_modified,
                bytes: converted.bytes.clone(),
            })
            .collect();

        if entries.is_empty() {
            return Err(ConvertError::NothingToExport);
        }

        let count = entries.len();
        let container = archiver.pack(entries).await?;
        sink.save(archive_name, &container).await?;

        info!(
            "Exported {} file(s) as {} ({})",
            count,
            archive_name,
            FileManager::format_size(container.len() as u64)
        );
        Ok(count)
    }

    /// Hand a single converted file to `sink`
    pub async fn export_one(&self, id: &JobId, sink: &dyn DownloadSink) -> Result<()> {
        let job = self
            .registry
            .get(id)
            .ok_or_else(|| ConvertError::UnknownJob(id.clone()))?;
        let converted = job
            .converted()
            .ok_or_else(|| ConvertError::JobNotSucceeded(id.clone()))?;

        sink.save(&converted.name, &converted.bytes).await
    }
}

fn unique_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, extension) = match name.rfind('.') {
        Some(index) if index > 0 => (&name[..index], &name[index..]),
        _ => (name, ""),
    };

    let mut counter = 1;
    loop {
        let candidate = format!("{} ({}){}", stem, counter, extension);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}
