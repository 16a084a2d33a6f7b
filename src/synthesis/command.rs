//! Image model backed by an external generator program.
//!
//! Each request runs the configured program once. Seed and result images are
//! exchanged through a scratch directory. Argument placeholders:
//! `{model}`, `{prompt}`, `{init}`, `{output}`, `{strength}`, `{guidance}`,
//! `{steps}`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::process::Command;

use super::model::{ImageModel, SynthesisRequest};
use crate::artifact::Image;
use crate::config::SynthesisConfig;
use crate::error::{RefineryError, Result};

const SEED_FILE: &str = "seed.png";
const OUTPUT_FILE: &str = "output.png";

pub struct CommandImageModel {
    program: String,
    args: Vec<String>,
    model_id: String,
    scratch_dir: PathBuf,
    timeout_ms: u64,
    loaded: AtomicBool,
}

impl CommandImageModel {
    pub fn new(program: impl Into<String>, args: Vec<String>, model_id: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args,
            model_id: model_id.into(),
            scratch_dir: std::env::temp_dir().join("refinery-scratch"),
            timeout_ms: 600_000,
            loaded: AtomicBool::new(false),
        }
    }

    /// Build from config; a relative scratch dir is resolved against `root`.
    pub fn from_config(config: &SynthesisConfig, model_id: impl Into<String>, root: &Path) -> Self {
        Self::new(config.program.clone(), config.args.clone(), model_id)
            .scratch_dir(root.join(&config.scratch_dir))
            .timeout_ms(config.timeout_ms)
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    fn render_args(&self, request: &SynthesisRequest, init: &Path, output: &Path) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{model}", &self.model_id)
                    .replace("{prompt}", &request.prompt)
                    .replace("{init}", &init.to_string_lossy())
                    .replace("{output}", &output.to_string_lossy())
                    .replace("{strength}", &format!("{:.6}", request.strength))
                    .replace("{guidance}", &request.guidance_scale.to_string())
                    .replace("{steps}", &request.inference_steps.to_string())
            })
            .collect()
    }
}

#[async_trait]
impl ImageModel for CommandImageModel {
    fn name(&self) -> &str {
        &self.model_id
    }

    async fn load(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        self.loaded.store(true, Ordering::SeqCst);
        info!("Image model {} ready ({})", self.model_id, self.program);
        Ok(())
    }

    async fn generate(&self, request: &SynthesisRequest) -> Result<Image> {
        let init = self.scratch_dir.join(SEED_FILE);
        let output = self.scratch_dir.join(OUTPUT_FILE);
        request.seed.write(&init)?;
        if output.exists() {
            tokio::fs::remove_file(&output).await?;
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(self.render_args(request, &init, &output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| RefineryError::SynthesisFailed {
            perspective: request.prompt.clone(),
            reason: format!("failed to start {}: {}", self.program, e),
        })?;

        let timeout = tokio::time::Duration::from_millis(self.timeout_ms);
        let result = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(RefineryError::SynthesisFailed {
                    perspective: request.prompt.clone(),
                    reason: format!("generator timed out after {}ms", self.timeout_ms),
                });
            }
        };

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(RefineryError::SynthesisFailed {
                perspective: request.prompt.clone(),
                reason: format!(
                    "generator exited with {:?}: {}",
                    result.status.code(),
                    stderr.trim()
                ),
            });
        }

        if !output.exists() {
            return Err(RefineryError::SynthesisFailed {
                perspective: request.prompt.clone(),
                reason: format!("generator produced no image at {}", output.display()),
            });
        }
        debug!("Generator wrote {}", output.display());
        Image::read(&output)
    }

    fn release(&self) {
        if !self.loaded.swap(false, Ordering::SeqCst) {
            return;
        }
        for name in [SEED_FILE, OUTPUT_FILE] {
            let path = self.scratch_dir.join(name);
            if let Err(e) = std::fs::remove_file(&path)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
        info!("Image model {} released", self.model_id);
    }
}
