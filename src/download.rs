//! Download sink: where exported files end up.

use crate::error::{ConvertError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::info;

/// Performs the user-facing save of one named blob
#[async_trait]
pub trait DownloadSink: Send + Sync {
    async fn save(&self, name: &str, bytes: &[u8]) -> Result<()>;
}

/// Writes every download into one directory
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn target_path(&self, name: &str) -> Result<PathBuf> {
        let plain = Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name);
        if !plain || name == "." || name == ".." {
            return Err(ConvertError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("refusing to write outside the output directory: {}", name),
            )));
        }
        Ok(self.dir.join(name))
    }
}

#[async_trait]
impl DownloadSink for DirectorySink {
    async fn save(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.target_path(name)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, bytes).await?;
        info!("Saved {}", path.display());
        Ok(())
    }
}

/// Keeps downloads in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    saved: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> Vec<(String, Vec<u8>)> {
        self.saved.lock().clone()
    }
}

#[async_trait]
impl DownloadSink for MemorySink {
    async fn save(&self, name: &str, bytes: &[u8]) -> Result<()> {
        self.saved.lock().push((name.to_string(), bytes.to_vec()));
        Ok(())
    }
}
