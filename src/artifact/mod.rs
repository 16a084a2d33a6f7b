//! Artifact Storage Module
//!
//! This module owns the run's working files and the sealed per-iteration
//! archive: opaque image payloads, the rotation protocol, and slot manifests.

mod image;
mod manifest;
mod store;

pub use image::Image;
pub use manifest::{MANIFEST_FILE, ManifestEntry, SlotManifest, digest, digest_file};
pub use store::{ArtifactStore, RotationReport};
