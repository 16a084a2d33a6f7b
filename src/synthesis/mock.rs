//! In-process image model for tests and dry runs.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use super::model::{ImageModel, SynthesisRequest};
use crate::artifact::Image;
use crate::error::{RefineryError, Result};

/// Echoes the prompt and strength back as image bytes.
///
/// Can be told to fail on the n-th `generate` call (1-based).
#[derive(Debug, Default)]
pub struct MockImageModel {
    fail_on: Option<u32>,
    calls: AtomicU32,
    loads: AtomicU32,
    releases: AtomicU32,
    prompts: Mutex<Vec<(String, f64)>>,
}

impl MockImageModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(call: u32) -> Self {
        Self {
            fail_on: Some(call),
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn load_count(&self) -> u32 {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> u32 {
        self.releases.load(Ordering::SeqCst)
    }

    /// `(prompt, strength)` of every request in order.
    pub fn requests(&self) -> Vec<(String, f64)> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ImageModel for MockImageModel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn load(&self) -> Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn generate(&self, request: &SynthesisRequest) -> Result<Image> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push((request.prompt.clone(), request.strength));
        }
        if self.fail_on == Some(call) {
            return Err(RefineryError::SynthesisFailed {
                perspective: request.prompt.clone(),
                reason: format!("mock failure on call {}", call),
            });
        }
        Ok(Image::from_bytes(
            format!("{}|{:.4}", request.prompt, request.strength).into_bytes(),
        ))
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}
