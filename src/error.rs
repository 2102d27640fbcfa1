//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom della libreria.
//!
//! ## Responsabilità:
//! - Definisce `ConvertError` per categorizzare gli errori di admission,
//!   orchestrazione ed export
//! - Definisce `CodecError` per i fallimenti del singolo codec
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - `InvalidInput`: tipo file non accettato (admission parziale)
//! - `QuotaExceeded`: file oltre la quota dell'identità corrente
//! - `UnknownJob`: id job non presente nel registry
//! - `EmptyBatch` / `NothingToExport` / `JobNotSucceeded`: precondizioni violate
//! - `InvalidTransition`: azione non consentita nello step corrente
//! - `Conversion`: fallimento del codec per un singolo job (mai propagato oltre l'orchestratore)
//! - `MissingDependency`: tool esterno mancante (cwebp, avifenc)
//!
//! ## Esempio:
//! ```rust,ignore
//! if registry.is_empty() {
//!     return Err(ConvertError::EmptyBatch);
//! }
//! ```

use crate::job::JobId;
use crate::step::AppStep;

/// Custom error types for batch conversion
#[derive(thiserror::Error, Debug)]
pub enum ConvertError {
    #[error("Unsupported file type for {name}: {mime}")]
    InvalidInput { name: String, mime: String },

    #[error("Quota exceeded: {dropped} file(s) over the limit of {quota}")]
    QuotaExceeded { quota: usize, dropped: usize },

    #[error("Unknown job: {0}")]
    UnknownJob(JobId),

    #[error("Batch is empty")]
    EmptyBatch,

    #[error("No converted files to export")]
    NothingToExport,

    #[error("Job {0} has not succeeded")]
    JobNotSucceeded(JobId),

    #[error("Cannot {action} while in step {step}")]
    InvalidTransition { step: AppStep, action: &'static str },

    #[error("Invalid conversion options: {0}")]
    InvalidOptions(String),

    #[error("{0}")]
    Conversion(String),

    #[error("Dependency missing: {0}")]
    MissingDependency(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),
}

/// Failure reported by a codec for a single input
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("{0}")]
    Encode(String),

    #[error("{tool} exited with {status}: {stderr}")]
    Tool {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("{0} is not installed")]
    MissingTool(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T, E = ConvertError> = std::result::Result<T, E>;
