//! Image model contract and the accelerator lease.

use async_trait::async_trait;
use log::debug;

use crate::artifact::Image;
use crate::error::Result;

/// Everything the model needs for one image.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub prompt: String,
    pub seed: Image,
    /// 1.0 ignores the seed's structure, 0.0 reproduces it
    pub strength: f64,
    pub guidance_scale: f64,
    pub inference_steps: u32,
}

/// External image-to-image model.
///
/// The model holds accelerator memory between `load` and `release`; the
/// trainer launched after synthesis needs that memory back.
#[async_trait]
pub trait ImageModel: Send + Sync {
    /// Model identifier for logging
    fn name(&self) -> &str;

    /// Bring the model onto the accelerator.
    async fn load(&self) -> Result<()>;

    /// Produce one image. Calls never overlap.
    async fn generate(&self, request: &SynthesisRequest) -> Result<Image>;

    /// Free accelerator memory. Must be idempotent.
    fn release(&self);
}

/// Scoped hold on the model's accelerator memory; released on drop.
pub struct AcceleratorLease<'a, M: ImageModel + ?Sized> {
    model: &'a M,
    released: bool,
}

impl<'a, M: ImageModel + ?Sized> AcceleratorLease<'a, M> {
    pub fn new(model: &'a M) -> Self {
        debug!("Accelerator lease acquired for {}", model.name());
        Self {
            model,
            released: false,
        }
    }

    pub fn release(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if !self.released {
            self.released = true;
            self.model.release();
            debug!("Accelerator lease released for {}", self.model.name());
        }
    }
}

impl<M: ImageModel + ?Sized> Drop for AcceleratorLease<'_, M> {
    fn drop(&mut self) {
        self.release_now();
    }
}
