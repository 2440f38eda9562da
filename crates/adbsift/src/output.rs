//! Writing recovered files and the manifest.

use std::path::{Path, PathBuf};

use serde::Serialize;

use adbsift_core::FileTransfer;

/// Manifest file written next to the recovered files.
pub const MANIFEST_NAME: &str = "manifest.json";

/// One recovered file, as listed in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub requested_path: String,
    pub file: String,
    pub raw_bytes: usize,
    pub size: usize,
    pub chunks: usize,
    pub mtime: Option<u32>,
    pub blake3: String,
}

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("failed to create output directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),
    #[error("failed to write {0}: {1}")]
    Write(PathBuf, std::io::Error),
    #[error("failed to serialize manifest: {0}")]
    Serialize(serde_json::Error),
}

/// Writes transfers into one directory, numbering them in detection order.
///
/// The directory is created on the first write, so a capture with nothing
/// in it leaves no trace on disk.
pub struct TransferWriter {
    dir: PathBuf,
    manifest: bool,
    seen: usize,
    entries: Vec<ManifestEntry>,
}

impl TransferWriter {
    pub fn new(dir: PathBuf, manifest: bool) -> Self {
        Self {
            dir,
            manifest,
            seen: 0,
            entries: Vec::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Entries written so far.
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Write `transfer` as the next numbered file. Returns where it went.
    ///
    /// A failure only affects this file; later writes still get their own
    /// number and are attempted.
    pub fn write(&mut self, transfer: &FileTransfer) -> Result<PathBuf, OutputError> {
        self.seen += 1;
        let name = file_name(self.seen, &transfer.path);
        let path = self.dir.join(&name);

        std::fs::create_dir_all(&self.dir)
            .map_err(|e| OutputError::CreateDir(self.dir.clone(), e))?;
        std::fs::write(&path, &transfer.content).map_err(|e| OutputError::Write(path.clone(), e))?;

        tracing::debug!(path = %path.display(), bytes = transfer.content.len(), "file written");
        self.entries.push(ManifestEntry {
            requested_path: transfer.path.clone(),
            file: name,
            raw_bytes: transfer.raw_len,
            size: transfer.content.len(),
            chunks: transfer.chunks,
            mtime: transfer.mtime,
            blake3: hex::encode(transfer.content_hash()),
        });
        Ok(path)
    }

    /// Write the manifest, if enabled and anything was written.
    pub fn finish(self) -> Result<Option<PathBuf>, OutputError> {
        if !self.manifest || self.entries.is_empty() {
            return Ok(None);
        }
        let path = self.dir.join(MANIFEST_NAME);
        let text = serde_json::to_vec_pretty(&self.entries).map_err(OutputError::Serialize)?;
        std::fs::write(&path, text).map_err(|e| OutputError::Write(path.clone(), e))?;
        Ok(Some(path))
    }
}

/// `file{index}{ext}`, taking the extension from the requested path.
pub fn file_name(index: usize, requested: &str) -> String {
    let ext = Path::new(requested)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 16 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("bin");
    format!("file{index}.{ext}")
}
