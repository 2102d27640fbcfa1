//! # WebPnifty - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Caricamento della configurazione e applicazione degli override CLI
//! - Guida dello `StepController` attraverso upload → edit → result
//!
//! ## Flusso di esecuzione:
//! 1. Carica la configurazione (file JSON opzionale) e configura il logging
//! 2. Scopre e carica i file in input (file singoli o directory)
//! 3. Admission con la quota dell'identità corrente
//! 4. Conversione concorrente con progress bar (o righe JSON)
//! 5. Riepilogo, fallimenti ed export (file singoli o archivio unico)
//!
//! ## Esempio di utilizzo:
//! ```bash
//! webpnifty ~/Pictures/trip --preset max-compression --output ./out --archive
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use webpnifty::{
    file_manager::FileManager,
    json_output::JsonMessage,
    orchestrator::{ProgressOutput, ProgressTracker},
    progress::ProgressManager,
    AdmissionPolicy, Archiver, BatchOrchestrator, Codec, Config, ConversionOptions, ConvertError,
    DirectorySink, Identity, ImageProcessor, JobRegistry, Preset, StaticIdentity,
    StepController, TarGzArchiver, TargetFormat,
};

#[derive(Parser)]
#[command(name = "webpnifty")]
#[command(about = "Batch-convert JPEG, PNG and GIF images to WebP or AVIF")]
struct Args {
    /// Image files or directories to convert
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Start from a named option set
    #[arg(short, long, value_enum)]
    preset: Option<Preset>,

    /// Encoder quality (0.0-1.0)
    #[arg(short, long)]
    quality: Option<f32>,

    /// Output format (webp or avif)
    #[arg(short, long)]
    format: Option<TargetFormat>,

    /// Longest edge of the output, in pixels
    #[arg(short, long)]
    max_dimension: Option<u32>,

    /// Keep EXIF/XMP metadata
    #[arg(long)]
    keep_exif: bool,

    /// Directory receiving the converted files
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Export a single archive instead of one file per image
    #[arg(long)]
    archive: bool,

    /// Convert as an authenticated user (raises the batch quota)
    #[arg(long)]
    user: Option<String>,

    /// Configuration file (default: ~/.webpnifty/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the effective configuration back to the config file
    #[arg(long)]
    save_config: bool,

    /// Maximum number of images converted at the same time
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Per-image timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Output progress and results as JSON lines
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Preset (or configured defaults) with the explicit flags applied on top
    fn conversion_options(&self, config: &Config) -> ConversionOptions {
        let mut options = self
            .preset
            .map(|preset| preset.options())
            .unwrap_or_else(|| config.default_options.clone());

        if let Some(quality) = self.quality {
            options.quality = quality;
        }
        if let Some(format) = self.format {
            options.target_format = format;
        }
        if let Some(max_dimension) = self.max_dimension {
            options.max_dimension = max_dimension;
        }
        if self.keep_exif {
            options.preserve_metadata = true;
        }

        options
    }

    fn apply_to(&self, config: &mut Config) {
        config.default_options = self.conversion_options(config);
        if self.concurrency.is_some() {
            config.max_concurrent_jobs = self.concurrency;
        }
        if self.timeout.is_some() {
            config.job_timeout_secs = self.timeout;
        }
        if self.output.is_some() {
            config.output_path = self.output.clone();
        }
        config.json_output |= self.json;
    }
}

fn init_logging(verbose: bool, json_output: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    // stdout is reserved for JSON lines
    if json_output {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(Config::default_path);
    let mut config = match &config_path {
        Some(path) => Config::from_file(path).await?,
        None => Config::default(),
    };
    args.apply_to(&mut config);

    init_logging(args.verbose, config.json_output)?;
    config.validate()?;

    if args.save_config {
        if let Some(path) = &config_path {
            config.save_to_file(path).await?;
            info!("Saved configuration to {}", path.display());
        }
    }

    let json_output = config.json_output;
    let result = run(&args, &config).await;
    if let Err(ref e) = result {
        if json_output {
            JsonMessage::error(e.to_string(), e.chain().nth(1).map(|cause| cause.to_string())).emit();
        } else {
            error!("{:#}", e);
        }
    }
    result
}

async fn run(args: &Args, config: &Config) -> Result<()> {
    let options = config.default_options.clone();

    let codec = Arc::new(ImageProcessor::new());
    codec
        .ensure_available(options.target_format)
        .await
        .map_err(|e| ConvertError::MissingDependency(e.to_string()))?;

    let paths = FileManager::discover(&args.inputs)?;
    if paths.is_empty() {
        return Err(anyhow::anyhow!("No files found in the given inputs"));
    }

    let identity: Arc<dyn Identity> = match &args.user {
        Some(name) => Arc::new(StaticIdentity::authenticated(name.clone())),
        None => Arc::new(StaticIdentity::anonymous()),
    };
    let policy = AdmissionPolicy::from(config);

    // Only files within the quota are read
    let spinner = (!config.json_output)
        .then(|| ProgressManager::spinner(&format!("Loading {} file(s)...", paths.len())));
    let plan =
        FileManager::load_within_quota(&paths, &policy, &identity.current_identity()).await?;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let registry = Arc::new(JobRegistry::new());
    let orchestrator = BatchOrchestrator::new(registry.clone(), codec)
        .with_max_concurrent_jobs(config.max_concurrent_jobs)
        .with_job_timeout(config.job_timeout_secs.map(Duration::from_secs));
    let mut controller = StepController::new(orchestrator, policy, identity);

    // Upload -> edit
    let report = controller.admit_planned(plan)?;
    if config.json_output {
        JsonMessage::admitted(&report).emit();
    }
    for rejected in &report.rejected {
        warn!("Skipped {}: {:?}", rejected.name, rejected.reason);
    }
    if report.dropped_over_quota() > 0 {
        warn!(
            "Only the first {} image(s) are converted; sign in with --user for a larger quota",
            report.quota
        );
    }
    info!("Admitted {} image(s)", report.accepted.len());

    // Edit -> result
    let output = if config.json_output {
        ProgressOutput::Json
    } else {
        ProgressOutput::Bar(ProgressManager::new(registry.len()))
    };
    let tracker =
        tokio::spawn(ProgressTracker::new(output, registry.clone()).run(registry.subscribe()));

    let outcome = match controller.convert(&options).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracker.abort();
            return Err(e.into());
        }
    };
    if let Err(e) = tracker.await {
        warn!("Progress display stopped early: {}", e);
    }

    let results = controller.results()?;
    for failure in results.failures() {
        warn!("{}", failure.message);
    }
    for entry in results.summarize() {
        info!(
            "{} -> {}: {} -> {} ({}% saved)",
            entry.name,
            entry.converted_name,
            FileManager::format_size(entry.original_size),
            FileManager::format_size(entry.converted_size),
            entry.saved_percent
        );
    }

    let stats = results.stats();
    let mut exported = Vec::new();
    if stats.files_succeeded > 0 {
        let output_dir = config
            .output_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        let sink = DirectorySink::new(output_dir);

        if args.archive {
            let archiver = TarGzArchiver::new();
            let archive_name = if config.archive_name.ends_with(archiver.extension()) {
                config.archive_name.clone()
            } else {
                format!("{}.{}", config.archive_name, archiver.extension())
            };
            results
                .export_all(&archiver, &sink, &archive_name)
                .await
                .with_context(|| format!("Failed to export {}", archive_name))?;
            exported.push(archive_name);
        } else {
            for entry in results.summarize() {
                results.export_one(&entry.id, &sink).await?;
                exported.push(entry.converted_name);
            }
        }
    }

    if config.json_output {
        JsonMessage::complete(stats.clone(), outcome.duration.as_secs_f64(), exported).emit();
    } else {
        info!("{} in {:.1}s", stats.format_summary(), outcome.duration.as_secs_f64());
    }

    if stats.files_succeeded == 0 {
        return Err(anyhow::anyhow!("All {} conversion(s) failed", stats.files_failed));
    }

    Ok(())
}
