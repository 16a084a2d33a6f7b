//! Refinery - iterative image synthesis and 3D reconstruction
//!
//! Each pass synthesizes a set of perspective images, hands them to an
//! external reconstruction trainer, waits for the trainer's viewer to report
//! enough rendered cameras, stops the trainer and archives everything the
//! pass produced before the next pass starts from the trainer's renders.

pub mod artifact;
pub mod config;
pub mod domain;
pub mod error;
pub mod notify;
pub mod orchestrator;
pub mod probe;
pub mod synthesis;
pub mod trainer;

pub use error::{RefineryError, Result};
