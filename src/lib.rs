//! # WebPnifty Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `job` / `options`: modello dati (job, file, opzioni, preset)
//! - `registry`: stato autoritativo del batch ed eventi di notifica
//! - `admission` / `identity`: filtro per tipo e quota per identità
//! - `orchestrator`: conversione concorrente settle-all
//! - `codec` / `image_processor` / `platform`: encoding con tool esterni
//! - `step`: macchina a stati upload → edit → result
//! - `aggregator` / `archive` / `download`: riepilogo ed export
//! - `config` / `file_manager` / `progress` / `json_output`: supporto alla CLI
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use webpnifty::{BatchOrchestrator, ImageProcessor, JobRegistry, StaticIdentity, StepController};
//!
//! let registry = Arc::new(JobRegistry::new());
//! let orchestrator = BatchOrchestrator::new(registry, Arc::new(ImageProcessor::new()));
//! let mut controller = StepController::new(orchestrator, Default::default(), Arc::new(StaticIdentity::anonymous()));
//! controller.admit(files)?;
//! controller.convert(&ConversionOptions::default()).await?;
//! let summary = controller.results()?.summarize();
//! ```

pub mod admission;
pub mod aggregator;
pub mod archive;
pub mod codec;
pub mod config;
pub mod download;
pub mod error;
pub mod file_manager;
pub mod identity;
pub mod image_processor;
pub mod job;
pub mod json_output;
pub mod options;
pub mod orchestrator;
pub mod platform;
pub mod progress;
pub mod registry;
pub mod step;

pub use admission::{AdmissionPolicy, AdmissionReport};
pub use aggregator::{BatchStats, FailureEntry, ResultAggregator, SummaryEntry};
pub use archive::{ArchiveEntry, Archiver, TarGzArchiver};
pub use codec::{Codec, ProgressReporter};
pub use config::Config;
pub use download::{DirectorySink, DownloadSink, MemorySink};
pub use error::{CodecError, ConvertError};
pub use identity::{Identity, IdentityInfo, StaticIdentity};
pub use image_processor::ImageProcessor;
pub use job::{ConvertedFile, Job, JobId, JobState, SourceFile};
pub use options::{ConversionOptions, Preset, TargetFormat};
pub use orchestrator::{BatchOrchestrator, BatchOutcome};
pub use registry::{JobEvent, JobRegistry};
pub use step::{AppStep, StepController};
