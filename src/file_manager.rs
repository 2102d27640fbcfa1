//! # File Management Module
//!
//! Questo modulo gestisce la discovery dei file in input e il loro caricamento.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva di file in directory (con `walkdir`), senza
//!   scendere in directory nascoste
//! - Determinazione del mime type dichiarato dall'estensione
//! - Caricamento in memoria come `SourceFile` (nome, bytes, mime, mtime)
//! - Formattazione human-readable delle dimensioni
//!
//! ## Nota sui tipi:
//! La discovery non filtra per tipo: i file non supportati restano nella
//! lista con il loro mime dichiarato, così l'admission può riportarli come
//! rifiutati invece di ignorarli in silenzio. `load_within_quota` applica
//! la policy sui percorsi e legge solo i file accettati.
//!
//! ## Esempio:
//! ```rust,ignore
//! let paths = FileManager::discover(&[PathBuf::from("/photos")])?;
//! let plan = FileManager::load_within_quota(&paths, &policy, &identity).await?;
//! ```

use crate::admission::{AdmissionPlan, AdmissionPolicy};
use crate::identity::IdentityInfo;
use crate::job::SourceFile;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use walkdir::WalkDir;

/// Manages input discovery and loading
pub struct FileManager;

impl FileManager {
    /// Expand files and directories into a sorted list of regular files
    pub fn discover(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for input in inputs {
            if input.is_file() {
                files.push(input.clone());
                continue;
            }
            if !input.is_dir() {
                return Err(anyhow::anyhow!("Input does not exist: {}", input.display()));
            }

            // The input itself is kept even when its name starts with a dot
            let mut found: Vec<PathBuf> = WalkDir::new(input)
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !Self::is_hidden(e.path()))
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.path().to_path_buf())
                .collect();
            found.sort();
            files.extend(found);
        }

        Ok(files)
    }

    /// Declared mime type, derived from the file extension
    pub fn mime_type(path: &Path) -> String {
        let ext = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let mime = match ext.as_str() {
            "jpg" | "jpeg" | "jfif" => "image/jpeg",
            "png" => "image/png",
            "gif" => "image/gif",
            "webp" => "image/webp",
            "avif" => "image/avif",
            "svg" => "image/svg+xml",
            "bmp" => "image/bmp",
            "tif" | "tiff" => "image/tiff",
            "heic" => "image/heic",
            _ => "application/octet-stream",
        };
        mime.to_string()
    }

    /// Read a file into memory with its metadata
    pub async fn load(path: &Path) -> Result<SourceFile> {
        let metadata = fs::metadata(path)
            .await
            .with_context(|| format!("Failed to read metadata of {}", path.display()))?;
        let last_modified = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|duration| duration.as_secs())
            .unwrap_or_default();

        let bytes = fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let name = path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Invalid file name: {}", path.display()))?
            .to_string_lossy()
            .to_string();

        Ok(SourceFile::new(name, Self::mime_type(path), last_modified, bytes))
    }

    pub async fn load_all(paths: &[PathBuf]) -> Result<Vec<SourceFile>> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            files.push(Self::load(path).await?);
        }
        Ok(files)
    }

    /// Apply the admission policy to `paths`, then read only the accepted
    /// files. Unsupported and over-quota paths are never opened.
    pub async fn load_within_quota(
        paths: &[PathBuf],
        policy: &AdmissionPolicy,
        identity: &IdentityInfo,
    ) -> Result<AdmissionPlan> {
        let screened = policy.screen(paths.to_vec(), identity, |path| {
            (Self::display_name(path), Self::mime_type(path))
        });

        Ok(AdmissionPlan {
            quota: screened.quota,
            accepted: Self::load_all(&screened.accepted).await?,
            rejected: screened.rejected,
        })
    }

    fn display_name(path: &Path) -> String {
        path.file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string())
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    fn is_hidden(path: &Path) -> bool {
        path.file_name()
            .map(|name| name.to_string_lossy().starts_with('.'))
            .unwrap_or(false)
    }
}
