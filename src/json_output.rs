//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per comunicazione con
//! altri processi (es. una UI che lancia la CLI).
//!
//! ## Responsabilità:
//! - Emette un messaggio JSON per riga su stdout
//! - Riusa le strutture del dominio (`AdmissionReport`, `SummaryEntry`, `BatchStats`)
//!
//! ## Tipi di messaggi:
//! - `admitted`: esito dell'admission (accettati, rifiutati, quota)
//! - `progress`: progress di un job e aggregato del batch
//! - `job_complete`: esito terminale di un job
//! - `complete`: fine del run con statistiche finali
//! - `error`: errore che interrompe la CLI

use crate::{
    admission::AdmissionReport,
    aggregator::BatchStats,
    job::JobId,
    registry::RejectedFile,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    Admitted {
        quota: usize,
        accepted: usize,
        rejected: Vec<RejectedFile>,
    },

    Progress {
        id: JobId,
        progress: u8,
        aggregate: u8,
    },

    JobComplete {
        id: JobId,
        succeeded: bool,
        error: Option<String>,
        aggregate: u8,
    },

    Complete {
        #[serde(flatten)]
        stats: BatchStats,
        reduction_percent: f64,
        duration_seconds: f64,
        exported: Vec<String>,
    },

    Error {
        message: String,
        details: Option<String>,
    },
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn admitted(report: &AdmissionReport) -> Self {
        Self::Admitted {
            quota: report.quota,
            accepted: report.accepted.len(),
            rejected: report.rejected.clone(),
        }
    }

    pub fn complete(stats: BatchStats, duration_seconds: f64, exported: Vec<String>) -> Self {
        Self::Complete {
            reduction_percent: stats.overall_reduction_percent(),
            stats,
            duration_seconds,
            exported,
        }
    }

    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RejectReason;

    #[test]
    fn test_messages_are_tagged() {
        let report = AdmissionReport {
            quota: 5,
            accepted: vec![JobId::from("a")],
            rejected: vec![RejectedFile {
                name: "logo.svg".to_string(),
                reason: RejectReason::UnsupportedType {
                    mime: "image/svg+xml".to_string(),
                },
            }],
        };

        let json = serde_json::to_value(JsonMessage::admitted(&report)).unwrap();
        assert_eq!(json["type"], "admitted");
        assert_eq!(json["accepted"], 1);
        assert_eq!(json["rejected"][0]["name"], "logo.svg");

        let json = serde_json::to_value(JsonMessage::Progress {
            id: JobId::from("a"),
            progress: 40,
            aggregate: 20,
        })
        .unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["id"], "a");
    }

    #[test]
    fn test_complete_flattens_stats() {
        let stats = BatchStats {
            files_succeeded: 1,
            total_original_size: 100,
            total_converted_size: 40,
            total_bytes_saved: 60,
            ..Default::default()
        };

        let json = serde_json::to_value(JsonMessage::complete(stats, 1.5, vec![])).unwrap();
        assert_eq!(json["type"], "complete");
        assert_eq!(json["files_succeeded"], 1);
        assert_eq!(json["reduction_percent"], 60.0);
    }
}
