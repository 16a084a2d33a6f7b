//! ImageSynthesisAdapter - request/response wrapper around the image model.

use std::sync::Arc;

use log::{debug, info};

use super::model::{AcceleratorLease, ImageModel, SynthesisRequest};
use crate::artifact::{ArtifactStore, Image};
use crate::config::SynthesisConfig;
use crate::domain::PerspectiveSpec;
use crate::error::{RefineryError, Result};

/// Prompt and sampler settings shared by every request.
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    /// `{perspective}` is replaced by the perspective's prompt term
    pub prompt_template: String,
    pub guidance_scale: f64,
    pub inference_steps: u32,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self::from(&SynthesisConfig::default())
    }
}

impl From<&SynthesisConfig> for SynthesisOptions {
    fn from(config: &SynthesisConfig) -> Self {
        Self {
            prompt_template: config.prompt_template.clone(),
            guidance_scale: config.guidance_scale,
            inference_steps: config.inference_steps,
        }
    }
}

pub struct ImageSynthesisAdapter<M: ImageModel> {
    model: Arc<M>,
    options: SynthesisOptions,
}

impl<M: ImageModel> ImageSynthesisAdapter<M> {
    pub fn new(model: Arc<M>, options: SynthesisOptions) -> Self {
        Self { model, options }
    }

    pub fn model(&self) -> &Arc<M> {
        &self.model
    }

    pub fn prompt_for(&self, perspective: &PerspectiveSpec) -> String {
        self.options
            .prompt_template
            .replace("{perspective}", &perspective.prompt_term)
    }

    /// Synthesize one perspective from its seed.
    pub async fn synthesize(
        &self,
        perspective: &PerspectiveSpec,
        seed: &Image,
        strength: f64,
    ) -> Result<Image> {
        let request = SynthesisRequest {
            prompt: self.prompt_for(perspective),
            seed: seed.clone(),
            strength: strength.clamp(0.0, 1.0),
            guidance_scale: self.options.guidance_scale,
            inference_steps: self.options.inference_steps,
        };
        debug!("Synthesizing '{}' at strength {:.4}", perspective.label, request.strength);

        self.model
            .generate(&request)
            .await
            .map_err(|e| failed(perspective, e))
    }

    /// Synthesize every perspective in order, then free the accelerator.
    ///
    /// The first failure aborts the whole set; the accelerator is released
    /// either way.
    pub async fn synthesize_all(
        &self,
        store: &ArtifactStore,
        perspectives: &[PerspectiveSpec],
        strength: f64,
    ) -> Result<usize> {
        let lease = AcceleratorLease::new(self.model.as_ref());
        self.model.load().await.map_err(|e| RefineryError::SynthesisFailed {
            perspective: "<load>".to_string(),
            reason: e.to_string(),
        })?;

        for perspective in perspectives {
            let seed = store.read_seed(perspective).map_err(|e| failed(perspective, e))?;
            let image = self.synthesize(perspective, &seed, strength).await?;
            store.write_synthesized(perspective, &image)?;
        }

        lease.release();
        info!(
            "Synthesized {} images with {} at strength {:.4}",
            perspectives.len(),
            self.model.name(),
            strength
        );
        Ok(perspectives.len())
    }

    /// Release accelerator memory outside a synthesis pass.
    pub fn release_resources(&self) {
        self.model.release();
    }
}

fn failed(perspective: &PerspectiveSpec, error: RefineryError) -> RefineryError {
    match error {
        RefineryError::SynthesisFailed { reason, .. } => RefineryError::SynthesisFailed {
            perspective: perspective.label.clone(),
            reason,
        },
        other => RefineryError::SynthesisFailed {
            perspective: perspective.label.clone(),
            reason: other.to_string(),
        },
    }
}
