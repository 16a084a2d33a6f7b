//! Slot manifests.
//!
//! Sealing a slot records every file it holds with a SHA-256 digest. The
//! manifest's presence marks the slot read-only.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::image::partial_path;
use crate::error::Result;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to the slot directory, `/`-separated
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotManifest {
    pub iteration: u32,
    pub sealed_at: DateTime<Utc>,
    pub entries: Vec<ManifestEntry>,
}

impl SlotManifest {
    /// Digest every file under `slot_dir`.
    pub fn build(iteration: u32, slot_dir: &Path) -> Result<Self> {
        let mut files = Vec::new();
        collect_files(slot_dir, &mut files)?;
        files.sort();

        let mut entries = Vec::with_capacity(files.len());
        for file in files {
            let relative = file.strip_prefix(slot_dir).unwrap_or(&file);
            if relative == Path::new(MANIFEST_FILE) {
                continue;
            }
            let (sha256, bytes) = digest_file(&file)?;
            entries.push(ManifestEntry {
                path: relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().to_string())
                    .collect::<Vec<_>>()
                    .join("/"),
                sha256,
                bytes,
            });
        }

        Ok(Self {
            iteration,
            sealed_at: Utc::now(),
            entries,
        })
    }

    pub fn path(slot_dir: &Path) -> PathBuf {
        slot_dir.join(MANIFEST_FILE)
    }

    pub fn is_sealed(slot_dir: &Path) -> bool {
        Self::path(slot_dir).exists()
    }

    pub fn load(slot_dir: &Path) -> Result<Self> {
        let content = fs::read(Self::path(slot_dir))?;
        Ok(serde_json::from_slice(&content)?)
    }

    pub fn write(&self, slot_dir: &Path) -> Result<()> {
        let path = Self::path(slot_dir);
        let partial = partial_path(&path);
        fs::write(&partial, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&partial, &path)?;
        Ok(())
    }

    pub fn contains(&self, relative: &str) -> bool {
        self.entries.iter().any(|e| e.path == relative)
    }

    /// Recompute digests; returns the paths that are missing or differ.
    pub fn verify(&self, slot_dir: &Path) -> Result<Vec<String>> {
        let mut mismatched = Vec::new();
        for entry in &self.entries {
            let file = slot_dir.join(&entry.path);
            match digest_file(&file) {
                Ok((sha256, _)) if sha256 == entry.sha256 => {}
                Ok(_) => mismatched.push(entry.path.clone()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    mismatched.push(entry.path.clone())
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(mismatched)
    }
}

pub fn digest(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Hex digest and size of a file, read in chunks.
pub fn digest_file(path: &Path) -> io::Result<(String, u64)> {
    let mut hasher = Sha256::new();
    let bytes = io::copy(&mut File::open(path)?, &mut hasher)?;
    Ok((hex::encode(hasher.finalize()), bytes))
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
