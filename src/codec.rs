//! # Codec Capability Module
//!
//! Contratto del primitivo di conversione (resize + re-encode + strip EXIF).
//!
//! ## Responsabilità:
//! - Definisce il trait `Codec` consumato dall'orchestratore
//! - Definisce `ProgressReporter`, il canale tipizzato per il progress di un job
//!
//! Ogni job riceve il proprio canale: i valori inviati da un codec arrivano
//! all'orchestratore nell'ordine di invio, senza garanzie tra job diversi.

use crate::error::CodecError;
use crate::job::SourceFile;
use crate::options::{ConversionOptions, TargetFormat};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Sending half of one job's progress channel
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    sender: mpsc::UnboundedSender<f64>,
}

impl ProgressReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<f64>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Report completion as a percentage (0.0-100.0)
    pub fn report(&self, percent: f64) {
        if percent.is_finite() {
            // The receiver is gone once the job settled; late reports are dropped
            let _ = self.sender.send(percent);
        }
    }
}

/// Converts one image into the target encoding
#[async_trait]
pub trait Codec: Send + Sync {
    async fn convert(
        &self,
        source: &SourceFile,
        options: &ConversionOptions,
        progress: ProgressReporter,
    ) -> Result<Vec<u8>, CodecError>;

    /// Fail early if the codec cannot produce `format` on this system
    async fn ensure_available(&self, _format: TargetFormat) -> Result<(), CodecError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reporter_delivers_in_order() {
        let (reporter, mut receiver) = ProgressReporter::channel();
        reporter.report(10.0);
        reporter.report(f64::NAN);
        reporter.report(55.5);
        drop(reporter);

        assert_eq!(receiver.recv().await, Some(10.0));
        assert_eq!(receiver.recv().await, Some(55.5));
        assert_eq!(receiver.recv().await, None);
    }
}
