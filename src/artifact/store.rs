//! ArtifactStore - per-iteration rotation of the run's working files.
//!
//! Between passes, every perspective's working files move one step:
//!
//! ```text
//! init/<input>                  -> iter/<stamp>/<slot>/<input>
//! <synth>/<output>              -> iter/<stamp>/<slot>/<output>
//! <render>/output_<output>      -> init/<input>
//! outputs/                      -> iter/<stamp>/<slot>/outputs/
//! transforms_internal.json  (copy) iter/<stamp>/<slot>/transforms.json
//! ```
//!
//! Every move is a single rename. A missing source is skipped and logged.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use super::image::{Image, partial_path};
use super::manifest::{MANIFEST_FILE, SlotManifest};
use crate::config::LayoutConfig;
use crate::domain::PerspectiveSpec;
use crate::error::{RefineryError, Result};

/// What one rotation did.
#[derive(Debug, Clone, Default)]
pub struct RotationReport {
    /// Slot that was sealed, if any
    pub slot: Option<u32>,
    /// Destinations of every completed move or copy
    pub moved: Vec<PathBuf>,
    /// Renders promoted to next-iteration seeds
    pub promoted: usize,
    /// Sources that did not exist
    pub skipped: Vec<PathBuf>,
}

impl RotationReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Filesystem-backed store for one run.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    layout: LayoutConfig,
    run_dir: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `root`, archiving under `<archive>/<run_stamp>`.
    pub fn new(root: impl Into<PathBuf>, layout: LayoutConfig, run_stamp: &str) -> Self {
        let root = root.into();
        let run_dir = root.join(&layout.archive_dir).join(run_stamp);
        Self {
            root,
            layout,
            run_dir,
        }
    }

    /// Timestamp naming this run's archive directory.
    pub fn run_stamp_now() -> String {
        chrono::Utc::now().format("%Y-%m-%d %H_%M_%S").to_string()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn init_path(&self, perspective: &PerspectiveSpec) -> PathBuf {
        self.root
            .join(&self.layout.init_dir)
            .join(&perspective.input_artifact)
    }

    pub fn synth_path(&self, perspective: &PerspectiveSpec) -> PathBuf {
        self.root
            .join(&self.layout.synth_dir)
            .join(&perspective.output_artifact)
    }

    pub fn render_path(&self, perspective: &PerspectiveSpec) -> PathBuf {
        self.root
            .join(&self.layout.render_dir)
            .join(perspective.render_artifact())
    }

    pub fn reconstruction_dir(&self) -> PathBuf {
        self.root.join(&self.layout.reconstruction_dir)
    }

    pub fn transforms_source(&self) -> PathBuf {
        self.root.join(&self.layout.transforms_source)
    }

    pub fn slot_dir(&self, iteration: u32) -> PathBuf {
        self.run_dir.join(iteration.to_string())
    }

    /// Create the working directories and the run's archive directory.
    pub fn prepare(&self) -> Result<()> {
        for dir in [
            self.root.join(&self.layout.init_dir),
            self.root.join(&self.layout.synth_dir),
            self.root.join(&self.layout.render_dir),
            self.run_dir.clone(),
        ] {
            fs::create_dir_all(&dir)?;
        }
        debug!("Prepared working directories under {}", self.root.display());
        Ok(())
    }

    /// Place `image` at every perspective's render path so the first
    /// rotation promotes it to the initial seed.
    pub fn seed_renders(&self, image: &Image, perspectives: &[PerspectiveSpec]) -> Result<usize> {
        for perspective in perspectives {
            image.write(self.render_path(perspective))?;
        }
        info!("Seeded {} renders from start image", perspectives.len());
        Ok(perspectives.len())
    }

    pub fn read_seed(&self, perspective: &PerspectiveSpec) -> Result<Image> {
        let path = self.init_path(perspective);
        if !path.exists() {
            return Err(RefineryError::ArtifactMissing(path));
        }
        Image::read(path)
    }

    pub fn write_synthesized(&self, perspective: &PerspectiveSpec, image: &Image) -> Result<PathBuf> {
        let path = self.synth_path(perspective);
        image.write(&path)?;
        Ok(path)
    }

    /// Archive the current working set into `slot` and promote renders.
    ///
    /// With `slot = None` nothing is archived; only renders are promoted.
    /// Missing sources are skipped. Writing into a sealed slot is an error.
    pub fn rotate(&self, slot: Option<u32>, perspectives: &[PerspectiveSpec]) -> Result<RotationReport> {
        let mut report = RotationReport {
            slot,
            ..Default::default()
        };

        let slot_dir = match slot {
            Some(iteration) => {
                let dir = self.slot_dir(iteration);
                if SlotManifest::is_sealed(&dir) {
                    return Err(RefineryError::SlotSealed(iteration));
                }
                fs::create_dir_all(&dir)?;
                Some(dir)
            }
            None => None,
        };
        fs::create_dir_all(self.root.join(&self.layout.init_dir))?;

        info!("Rotating artifacts (slot {:?})", slot);

        for perspective in perspectives {
            let init_path = self.init_path(perspective);

            if let Some(dir) = &slot_dir {
                move_or_skip(&init_path, &dir.join(&perspective.input_artifact), &mut report)?;
                move_or_skip(
                    &self.synth_path(perspective),
                    &dir.join(&perspective.output_artifact),
                    &mut report,
                )?;
            }

            if move_or_skip(&self.render_path(perspective), &init_path, &mut report)? {
                report.promoted += 1;
            }
        }

        if let Some(dir) = &slot_dir {
            move_or_skip(
                &self.reconstruction_dir(),
                &dir.join(&self.layout.reconstruction_dir),
                &mut report,
            )?;
            copy_or_skip(
                &self.transforms_source(),
                &dir.join(&self.layout.transforms_archive_name),
                &mut report,
            )?;

            let manifest = SlotManifest::build(slot.unwrap_or_default(), dir)?;
            manifest.write(dir)?;
            info!(
                "Sealed slot {} with {} files ({} skipped)",
                dir.display(),
                manifest.entries.len(),
                report.skipped.len()
            );
        }

        Ok(report)
    }

    /// Sealed slots of this run, ordered by iteration.
    pub fn list_slots(&self) -> Result<Vec<PathBuf>> {
        let mut slots = sealed_under(&self.run_dir, 1)?;
        slots.sort_by_key(|dir| slot_index(dir));
        Ok(slots)
    }

    /// Sealed slots of every run under `archive_root`.
    pub fn list_archive(archive_root: &Path) -> Result<Vec<PathBuf>> {
        let mut slots = sealed_under(archive_root, 2)?;
        slots.sort_by(|a, b| {
            a.parent()
                .cmp(&b.parent())
                .then(slot_index(a).cmp(&slot_index(b)))
        });
        Ok(slots)
    }

    /// Recompute a sealed slot's digests; returns the files that differ.
    pub fn verify_slot(slot_dir: &Path) -> Result<Vec<String>> {
        if !SlotManifest::is_sealed(slot_dir) {
            return Err(RefineryError::ArtifactMissing(SlotManifest::path(slot_dir)));
        }
        let manifest = SlotManifest::load(slot_dir)?;
        let mismatched = manifest.verify(slot_dir)?;
        if !mismatched.is_empty() {
            warn!("Slot {} has {} altered files", slot_dir.display(), mismatched.len());
        }
        Ok(mismatched)
    }
}

/// Rename `src` to `dst`; returns whether anything moved.
fn move_or_skip(src: &Path, dst: &Path, report: &mut RotationReport) -> Result<bool> {
    if !src.exists() {
        skip(src, report);
        return Ok(false);
    }
    fs::rename(src, dst)?;
    debug!("Moved {} -> {}", src.display(), dst.display());
    report.moved.push(dst.to_path_buf());
    Ok(true)
}

/// Copy through a temp name inside the destination directory, then rename.
fn copy_or_skip(src: &Path, dst: &Path, report: &mut RotationReport) -> Result<bool> {
    if !src.exists() {
        skip(src, report);
        return Ok(false);
    }
    let partial = partial_path(dst);
    fs::copy(src, &partial)?;
    fs::rename(&partial, dst)?;
    debug!("Copied {} -> {}", src.display(), dst.display());
    report.moved.push(dst.to_path_buf());
    Ok(true)
}

fn skip(src: &Path, report: &mut RotationReport) {
    warn!("{}; skipping", RefineryError::ArtifactMissing(src.to_path_buf()));
    report.skipped.push(src.to_path_buf());
}

/// Directories `depth` levels below `base` that hold a manifest.
fn sealed_under(base: &Path, depth: usize) -> Result<Vec<PathBuf>> {
    let mut pattern = PathBuf::from(glob::Pattern::escape(&base.to_string_lossy()));
    for _ in 0..depth {
        pattern.push("*");
    }
    pattern.push(MANIFEST_FILE);
    let paths = glob::glob(&pattern.to_string_lossy())
        .map_err(|e| RefineryError::Config(format!("Invalid archive pattern: {}", e)))?;
    Ok(paths
        .filter_map(|entry| entry.ok())
        .filter_map(|manifest| manifest.parent().map(Path::to_path_buf))
        .collect())
}

fn slot_index(dir: &Path) -> u32 {
    dir.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.parse().ok())
        .unwrap_or(u32::MAX)
}
