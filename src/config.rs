//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con le opzioni di default e i limiti del batch
//! - Fornisce validazione dei parametri
//! - Supporta caricamento/salvataggio da/verso file JSON
//!
//! ## Parametri di configurazione:
//! - `default_options`: opzioni di conversione iniziali (preset `Default`)
//! - `anonymous_quota`: file per batch senza login (default: 5)
//! - `authenticated_quota`: file per batch con login (default: 30)
//! - `max_concurrent_jobs`: limite di conversioni parallele (default: None = illimitato)
//! - `job_timeout_secs`: timeout per singolo job (default: None)
//! - `archive_name`: nome dell'archivio di export (default: "WebPnifty_images.tar.gz")
//! - `output_path`: directory dei download (default: None = directory corrente)
//! - `json_output`: output JSON per uso programmatico (default: false)
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     max_concurrent_jobs: Some(4),
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::options::ConversionOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Options used when no preset or flag overrides them
    pub default_options: ConversionOptions,
    pub anonymous_quota: usize,
    pub authenticated_quota: usize,
    /// Parallel conversions (None = one task per job, no cap)
    pub max_concurrent_jobs: Option<usize>,
    pub job_timeout_secs: Option<u64>,
    pub archive_name: String,
    /// Download directory (None = current directory)
    pub output_path: Option<PathBuf>,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_options: ConversionOptions::default(),
            anonymous_quota: 5,
            authenticated_quota: 30,
            max_concurrent_jobs: None,
            job_timeout_secs: None,
            archive_name: "WebPnifty_images.tar.gz".to_string(),
            output_path: None,
            json_output: false,
        }
    }
}

impl Config {
    /// `~/.webpnifty/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".webpnifty").join("config.json"))
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        self.default_options.validate()?;

        if self.anonymous_quota == 0 || self.authenticated_quota == 0 {
            return Err(anyhow::anyhow!("Quotas must be greater than 0"));
        }

        if self.max_concurrent_jobs == Some(0) {
            return Err(anyhow::anyhow!("Concurrency limit must be greater than 0"));
        }

        if self.job_timeout_secs == Some(0) {
            return Err(anyhow::anyhow!("Job timeout must be greater than 0"));
        }

        if self.archive_name.trim().is_empty() {
            return Err(anyhow::anyhow!("Archive name cannot be empty"));
        }

        if let Some(ref output_path) = self.output_path {
            if output_path.exists() && !output_path.is_dir() {
                return Err(anyhow::anyhow!(
                    "Output path is not a directory: {}",
                    output_path.display()
                ));
            }
        }

        Ok(())
    }

    /// Load configuration from file, falling back to defaults when missing
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
