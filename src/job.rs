//! # Job Model Module
//!
//! Definisce l'unità di lavoro della conversione e il suo ciclo di vita.
//!
//! ## Strutture dati:
//! - `SourceFile`: contenuto originale immutabile + metadata (nome, mime, mtime)
//! - `ConvertedFile`: output prodotto dal codec
//! - `JobState`: variante taggata `Pending → Running → Succeeded | Failed`
//! - `Job`: id stabile + file sorgente + stato
//!
//! Uno stato terminale ha sempre esattamente uno tra output ed errore:
//! l'invariante è nel tipo, non in due campi opzionali indipendenti.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static ADMISSION_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Opaque job identifier, stable for the job's lifetime
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobId(String);

impl JobId {
    /// Derive a fresh id from the file identity plus a process-wide sequence
    pub fn derive(name: &str, last_modified: u64) -> Self {
        let sequence = ADMISSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);

        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        hasher.update(last_modified.to_le_bytes());
        hasher.update(sequence.to_le_bytes());
        let hash = hex::encode(hasher.finalize());

        Self(hash[..16].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Original image handed over at admission. Never mutated.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub mime_type: String,
    /// Seconds since the Unix epoch
    pub last_modified: u64,
    pub bytes: Arc<[u8]>,
}

impl SourceFile {
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        last_modified: u64,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            last_modified,
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Output produced for a succeeded job
#[derive(Debug, Clone)]
pub struct ConvertedFile {
    pub name: String,
    pub mime_type: String,
    pub last_modified: u64,
    pub bytes: Arc<[u8]>,
}

impl ConvertedFile {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Debug, Clone)]
pub enum JobState {
    Pending,
    Running { progress: u8 },
    Succeeded { converted: ConvertedFile },
    Failed { progress: u8, message: String },
}

impl JobState {
    pub fn label(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running { .. } => "running",
            JobState::Succeeded { .. } => "succeeded",
            JobState::Failed { .. } => "failed",
        }
    }
}

/// One file's conversion unit of work
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub source: SourceFile,
    pub state: JobState,
}

impl Job {
    pub fn new(source: SourceFile) -> Self {
        Self {
            id: JobId::derive(&source.name, source.last_modified),
            source,
            state: JobState::Pending,
        }
    }

    pub fn progress(&self) -> u8 {
        match &self.state {
            JobState::Pending => 0,
            JobState::Running { progress } | JobState::Failed { progress, .. } => *progress,
            JobState::Succeeded { .. } => 100,
        }
    }

    pub fn converted(&self) -> Option<&ConvertedFile> {
        match &self.state {
            JobState::Succeeded { converted } => Some(converted),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            JobState::Failed { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, JobState::Succeeded { .. } | JobState::Failed { .. })
    }
}
