//! Opaque image payloads.
//!
//! The orchestrator never decodes pixels; images are moved between the
//! synthesizer, the filesystem and the trainer as encoded bytes.

use std::fs;
use std::path::Path;

use crate::error::Result;

/// Encoded image bytes (PNG in practice).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    bytes: Vec<u8>,
}

impl Image {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self { bytes: bytes.into() }
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_bytes(fs::read(path)?))
    }

    /// Write through a sibling temp file so readers never see a partial image.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let partial = partial_path(path);
        fs::write(&partial, &self.bytes)?;
        fs::rename(&partial, path)?;
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// `dir/name` -> `dir/.name.partial`
pub(crate) fn partial_path(path: &Path) -> std::path::PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.partial", name))
}
