//! # Orchestrator Module
//!
//! Separa le responsabilità in sottomoduli:
//! - `batch_orchestrator`: avvio concorrente e join settle-all del batch
//! - `task_converter`: worker per il singolo job
//! - `progress_tracker`: eventi del registry → progress bar / JSON
//! - `naming`: nome del file di output

pub mod batch_orchestrator;
pub mod naming;
pub mod progress_tracker;
pub mod task_converter;

pub use batch_orchestrator::{BatchOrchestrator, BatchOutcome};
pub use naming::output_name;
pub use progress_tracker::{ProgressOutput, ProgressTracker, TrackerSummary};
pub use task_converter::TaskConverter;
