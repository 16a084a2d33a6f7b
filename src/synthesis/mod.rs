//! Image Synthesis Layer
//!
//! This module provides:
//! - ImageModel trait for the external image-to-image model
//! - AcceleratorLease, the scoped hold on the model's accelerator memory
//! - ImageSynthesisAdapter for per-perspective requests
//! - CommandImageModel, an external-program implementation
//! - MockImageModel for tests

pub mod adapter;
pub mod command;
pub mod mock;
pub mod model;

pub use adapter::{ImageSynthesisAdapter, SynthesisOptions};
pub use command::CommandImageModel;
pub use mock::MockImageModel;
pub use model::{AcceleratorLease, ImageModel, SynthesisRequest};
