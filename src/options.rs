//! # Conversion Options Module
//!
//! Opzioni condivise applicate a tutti i job di un batch.
//!
//! ## Parametri:
//! - `quality`: qualità dell'encoder (0.0-1.0)
//! - `target_format`: formato di output (WebP o AVIF)
//! - `max_dimension`: lato lungo massimo in pixel
//! - `preserve_metadata`: mantiene EXIF/XMP nell'output
//!
//! ## Preset:
//! | Preset           | Quality | Formato | Max dim | EXIF |
//! |------------------|---------|---------|---------|------|
//! | `Default`        | 0.80    | WebP    | 1920    | no   |
//! | `MaxCompression` | 0.50    | WebP    | 1280    | no   |
//! | `HighQuality`    | 0.95    | WebP    | 3840    | sì   |
//!
//! Le opzioni vengono catturate all'avvio di un run: modificarle dopo non
//! ha effetto sui job già in esecuzione.

use crate::error::{ConvertError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output encoding produced by the codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Webp,
    Avif,
}

impl TargetFormat {
    /// Registered file suffix, without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            TargetFormat::Webp => "webp",
            TargetFormat::Avif => "avif",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            TargetFormat::Webp => "image/webp",
            TargetFormat::Avif => "image/avif",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for TargetFormat {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "webp" | "image/webp" => Ok(TargetFormat::Webp),
            "avif" | "image/avif" => Ok(TargetFormat::Avif),
            other => Err(ConvertError::InvalidOptions(format!(
                "unknown target format: {}",
                other
            ))),
        }
    }
}

/// Settings shared by every job of one batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionOptions {
    /// Encoder quality (0.0-1.0)
    pub quality: f32,
    pub target_format: TargetFormat,
    /// Longest edge in pixels
    pub max_dimension: u32,
    /// Keep EXIF/XMP metadata in the output
    pub preserve_metadata: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Preset::Default.options()
    }
}

impl ConversionOptions {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.quality) {
            return Err(ConvertError::InvalidOptions(format!(
                "quality must be between 0.0 and 1.0, got {}",
                self.quality
            )));
        }

        if self.max_dimension == 0 {
            return Err(ConvertError::InvalidOptions(
                "max dimension must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Quality as the 0-100 integer scale external encoders expect
    pub fn quality_percent(&self) -> u8 {
        (self.quality.clamp(0.0, 1.0) * 100.0).round() as u8
    }
}

/// Named option sets offered to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Default,
    MaxCompression,
    HighQuality,
}

impl Preset {
    pub fn options(&self) -> ConversionOptions {
        match self {
            Preset::Default => ConversionOptions {
                quality: 0.8,
                target_format: TargetFormat::Webp,
                max_dimension: 1920,
                preserve_metadata: false,
            },
            Preset::MaxCompression => ConversionOptions {
                quality: 0.5,
                target_format: TargetFormat::Webp,
                max_dimension: 1280,
                preserve_metadata: false,
            },
            Preset::HighQuality => ConversionOptions {
                quality: 0.95,
                target_format: TargetFormat::Webp,
                max_dimension: 3840,
                preserve_metadata: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let max = Preset::MaxCompression.options();
        assert_eq!(max.quality, 0.5);
        assert_eq!(max.max_dimension, 1280);
        assert!(!max.preserve_metadata);

        let hq = Preset::HighQuality.options();
        assert_eq!(hq.max_dimension, 3840);
        assert!(hq.preserve_metadata);

        assert_eq!(ConversionOptions::default(), Preset::Default.options());
    }

    #[test]
    fn test_options_validation() {
        let mut options = ConversionOptions::default();
        assert!(options.validate().is_ok());

        options.quality = 1.2;
        assert!(options.validate().is_err());

        options.quality = 0.0;
        assert!(options.validate().is_ok());

        options.max_dimension = 0;
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_target_format() {
        assert_eq!("AVIF".parse::<TargetFormat>().unwrap(), TargetFormat::Avif);
        assert_eq!("image/webp".parse::<TargetFormat>().unwrap(), TargetFormat::Webp);
        assert!("png".parse::<TargetFormat>().is_err());
        assert_eq!(TargetFormat::Avif.mime_type(), "image/avif");
    }

    #[test]
    fn test_quality_percent() {
        let options = ConversionOptions { quality: 0.95, ..Default::default() };
        assert_eq!(options.quality_percent(), 95);
    }
}
