//! # Image Processing Module
//!
//! Implementazione di default del trait `Codec`, basata su tool esterni.
//!
//! ## Architettura
//!
//! Come per l'ottimizzazione, l'encoding non avviene in memoria con librerie
//! Rust: il crate `image` serve solo per leggere le dimensioni e, quando
//! serve, per un pre-resize. L'encoding finale è delegato a:
//!
//! | Formato | Tool      | Qualità | Resize          | Metadata                       |
//! |---------|-----------|---------|-----------------|--------------------------------|
//! | WebP    | `cwebp`   | `-q`    | `-resize W H`   | `-metadata all\|none`          |
//! | AVIF    | `avifenc` | `-q`    | pre-resize PNG  | `--ignore-exif --ignore-xmp`   |
//!
//! ## Pipeline per file
//!
//! 1. **Tool check**: errore immediato se l'encoder non è installato
//! 2. **Staging**: bytes originali scritti in una `TempDir`
//! 3. **Probe**: dimensioni lette dall'header con `image`
//! 4. **Re-stage PNG** (in `spawn_blocking`) quando il tool non può leggere
//!    l'input (GIF per `cwebp`) o non sa ridimensionare (`avifenc`)
//! 5. **Encoding**: processo esterno con `tokio::process::Command`
//! 6. **Lettura output** e cleanup automatico della `TempDir`
//!
//! Il progress viene riportato alla fine di ogni fase (5, 30, 90, 100).
//!
//! ## Metadata
//!
//! Un input ri-codificato in PNG perde EXIF/XMP: con `preserve_metadata`
//! attivo viene emesso un warning e la conversione prosegue.

use crate::codec::{Codec, ProgressReporter};
use crate::error::CodecError;
use crate::job::SourceFile;
use crate::options::{ConversionOptions, TargetFormat};
use crate::platform::PlatformCommands;
use async_trait::async_trait;
use image::imageops::FilterType;
use image::ImageFormat;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, warn};

/// External-tool codec for WebP and AVIF
#[derive(Debug, Clone, Default)]
pub struct ImageProcessor;

/// Input file ready for the encoder
struct StagedInput {
    path: PathBuf,
    /// `cwebp -resize` target, when the encoder resizes by itself
    resize: Option<(u32, u32)>,
    restaged: bool,
}

impl ImageProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Encoder binary used for a target format
    pub fn tool_for(format: TargetFormat) -> &'static str {
        match format {
            TargetFormat::Webp => "cwebp",
            TargetFormat::Avif => "avifenc",
        }
    }

    /// Largest size with the same aspect ratio that fits in `max` x `max`
    pub fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
        if width <= max && height <= max {
            return (width, height);
        }

        let scale = max as f64 / width.max(height) as f64;
        let scaled = |side: u32| ((side as f64 * scale).round() as u32).clamp(1, max);
        (scaled(width), scaled(height))
    }

    /// Read the image dimensions from the header only
    pub fn probe_dimensions(bytes: &[u8]) -> Result<(u32, u32), CodecError> {
        let reader = image::io::Reader::new(Cursor::new(bytes)).with_guessed_format()?;
        Ok(reader.into_dimensions()?)
    }

    fn input_extension(source: &SourceFile) -> &'static str {
        match source.mime_type.as_str() {
            "image/png" => "png",
            "image/gif" => "gif",
            _ => "jpg",
        }
    }

    /// Write the input where the encoder can read it, re-encoding as PNG
    /// when the encoder cannot handle it directly
    fn stage_input(
        bytes: Arc<[u8]>,
        extension: &'static str,
        format: TargetFormat,
        max_dimension: u32,
        workdir: &Path,
    ) -> Result<StagedInput, CodecError> {
        let (width, height) = Self::probe_dimensions(&bytes)?;
        let target = Self::fit_within(width, height, max_dimension);
        let needs_resize = target != (width, height);
        let is_gif = extension == "gif";

        let restage = match format {
            TargetFormat::Webp => is_gif,
            TargetFormat::Avif => is_gif || needs_resize,
        };

        if restage {
            let mut image = image::load_from_memory(&bytes)?;
            if needs_resize {
                image = image.resize_exact(target.0, target.1, FilterType::Lanczos3);
            }
            let path = workdir.join("input.png");
            image.save_with_format(&path, ImageFormat::Png)?;

            return Ok(StagedInput {
                path,
                resize: None,
                restaged: true,
            });
        }

        let path = workdir.join(format!("input.{}", extension));
        std::fs::write(&path, &bytes)?;

        Ok(StagedInput {
            path,
            resize: needs_resize.then_some(target),
            restaged: false,
        })
    }

    fn build_cwebp_args(
        input: &StagedInput,
        output: &Path,
        options: &ConversionOptions,
    ) -> Vec<String> {
        let mut args = vec![
            "-quiet".to_string(),
            "-q".to_string(),
            options.quality_percent().to_string(),
            "-metadata".to_string(),
            if options.preserve_metadata { "all" } else { "none" }.to_string(),
        ];

        if let Some((width, height)) = input.resize {
            args.push("-resize".to_string());
            args.push(width.to_string());
            args.push(height.to_string());
        }

        args.push(input.path.to_string_lossy().to_string());
        args.push("-o".to_string());
        args.push(output.to_string_lossy().to_string());
        args
    }

    fn build_avifenc_args(
        input: &StagedInput,
        output: &Path,
        options: &ConversionOptions,
    ) -> Vec<String> {
        let mut args = vec!["-q".to_string(), options.quality_percent().to_string()];

        if !options.preserve_metadata {
            args.push("--ignore-exif".to_string());
            args.push("--ignore-xmp".to_string());
        }

        args.push(input.path.to_string_lossy().to_string());
        args.push(output.to_string_lossy().to_string());
        args
    }

    async fn run_tool(tool: &str, args: &[String]) -> Result<(), CodecError> {
        let command = PlatformCommands::instance().get_command(tool);
        debug!("Running {} {}", command, args.join(" "));

        // Dropping the future (job timeout, aborted batch) kills the encoder
        let output = Command::new(command)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(CodecError::Tool {
                tool: tool.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl Codec for ImageProcessor {
    async fn convert(
        &self,
        source: &SourceFile,
        options: &ConversionOptions,
        progress: ProgressReporter,
    ) -> Result<Vec<u8>, CodecError> {
        let format = options.target_format;
        let tool = Self::tool_for(format);
        self.ensure_available(format).await?;

        let workdir = tempfile::tempdir()?;
        progress.report(5.0);

        let bytes = source.bytes.clone();
        let extension = Self::input_extension(source);
        let max_dimension = options.max_dimension;
        let staging_dir = workdir.path().to_path_buf();
        let staged = tokio::task::spawn_blocking(move || {
            Self::stage_input(bytes, extension, format, max_dimension, &staging_dir)
        })
        .await
        .map_err(|e| CodecError::Encode(format!("staging task failed: {}", e)))??;

        if staged.restaged && options.preserve_metadata {
            warn!(
                "{}: metadata cannot be preserved once the image is re-encoded for {}",
                source.name, tool
            );
        }
        progress.report(30.0);

        let output = workdir.path().join(format!("output.{}", format.extension()));
        let args = match format {
            TargetFormat::Webp => Self::build_cwebp_args(&staged, &output, options),
            TargetFormat::Avif => Self::build_avifenc_args(&staged, &output, options),
        };
        Self::run_tool(tool, &args).await?;
        progress.report(90.0);

        let encoded = tokio::fs::read(&output).await?;
        if encoded.is_empty() {
            return Err(CodecError::Encode(format!("{} produced an empty file", tool)));
        }
        progress.report(100.0);

        Ok(encoded)
    }

    async fn ensure_available(&self, format: TargetFormat) -> Result<(), CodecError> {
        let tool = Self::tool_for(format);
        if PlatformCommands::instance().is_command_available(tool).await {
            Ok(())
        } else {
            Err(CodecError::MissingTool(tool.to_string()))
        }
    }
}
