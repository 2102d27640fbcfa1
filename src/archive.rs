//! # Archive Module
//!
//! Capability di packaging: mappa `{nome → bytes}` → un unico container.
//!
//! L'implementazione di default (`TarGzArchiver`) produce un `.tar.gz` in
//! memoria; la costruzione avviene in `spawn_blocking` perché tar e gzip
//! sono sincroni e CPU-bound.

use crate::error::{ConvertError, Result};
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::sync::Arc;
use tracing::debug;

/// One file inside the container
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub last_modified: u64,
    pub bytes: Arc<[u8]>,
}

/// Bundles converted files into one downloadable blob
#[async_trait]
pub trait Archiver: Send + Sync {
    /// Suffix of the produced container, without the leading dot
    fn extension(&self) -> &'static str;

    async fn pack(&self, entries: Vec<ArchiveEntry>) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TarGzArchiver {
    compression: Option<u32>,
}

impl TarGzArchiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// gzip level 0-9
    pub fn with_level(level: u32) -> Self {
        Self {
            compression: Some(level.min(9)),
        }
    }

    fn build(entries: &[ArchiveEntry], compression: Compression) -> std::io::Result<Vec<u8>> {
        let encoder = GzEncoder::new(Vec::new(), compression);
        let mut tar = tar::Builder::new(encoder);

        for entry in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(entry.bytes.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(entry.last_modified);

            tar.append_data(&mut header, &entry.name, &*entry.bytes)?;
        }

        let encoder = tar.into_inner()?;
        encoder.finish()
    }
}

#[async_trait]
impl Archiver for TarGzArchiver {
    fn extension(&self) -> &'static str {
        "tar.gz"
    }

    async fn pack(&self, entries: Vec<ArchiveEntry>) -> Result<Vec<u8>> {
        let compression = self
            .compression
            .map(Compression::new)
            .unwrap_or_default();
        let count = entries.len();

        let bytes = tokio::task::spawn_blocking(move || Self::build(&entries, compression))
            .await
            .map_err(|e| ConvertError::Archive(format!("archive task failed: {}", e)))?
            .map_err(|e| ConvertError::Archive(e.to_string()))?;

        debug!("Packed {} file(s) into {} bytes", count, bytes.len());
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[tokio::test]
    async fn test_tar_gz_contains_every_entry() {
        let entries = vec![
            ArchiveEntry {
                name: "a.webp".to_string(),
                last_modified: 1_700_000_000,
                bytes: vec![1u8, 2, 3].into(),
            },
            ArchiveEntry {
                name: "b.webp".to_string(),
                last_modified: 1_700_000_000,
                bytes: vec![9u8; 1000].into(),
            },
        ];

        let packed = TarGzArchiver::new().pack(entries).await.unwrap();

        let mut archive = tar::Archive::new(GzDecoder::new(&packed[..]));
        let mut found = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().to_string();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            found.push((name, content.len()));
        }

        assert_eq!(found, vec![("a.webp".to_string(), 3), ("b.webp".to_string(), 1000)]);
    }
}
