//! Configuration system for Refinery.
//!
//! Loaded from YAML with a fallback chain, then adjusted by CLI overrides:
//! 1. Explicit path if provided
//! 2. ~/.config/refinery/refinery.yml
//! 3. ./refinery.yml
//! 4. Default values

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::{DEFAULT_DECAY, Vocabulary};

pub use self::overrides::RunOverrides;

mod overrides;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub run: RunConfig,
    pub trainer: TrainerConfig,
    pub synthesis: SynthesisConfig,
    pub probe: ProbeConfig,
    pub notification: NotificationConfig,
    pub layout: LayoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of synthesize/reconstruct passes
    pub iterations: u32,
    /// Decay constant of the strength schedule
    pub decay: f64,
    pub vocabulary: Vocabulary,
    /// Run root; every layout path is relative to it
    pub work_dir: PathBuf,
    /// Image copied to every trainer render slot before the first pass
    pub start_image: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            decay: DEFAULT_DECAY,
            vocabulary: Vocabulary::default(),
            work_dir: PathBuf::from("."),
            start_image: Some(PathBuf::from("start.png")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub program: String,
    /// Model variant (e.g. instant-ngp, nerfacto)
    pub model: String,
    pub steps: u32,
    pub data_dir: String,
    pub extra_args: Vec<String>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            program: "ns-train".to_string(),
            model: "instant-ngp".to_string(),
            steps: 3500,
            data_dir: "./".to_string(),
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// External generator program
    pub program: String,
    /// Argument template; see `CommandImageModel` for placeholders
    pub args: Vec<String>,
    /// Model id; defaults to the vocabulary's model when unset
    pub model: Option<String>,
    pub prompt_template: String,
    pub guidance_scale: f64,
    pub inference_steps: u32,
    pub timeout_ms: u64,
    pub scratch_dir: PathBuf,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            program: "refinery-img2img".to_string(),
            args: [
                "--model", "{model}", "--prompt", "{prompt}", "--init", "{init}", "--output",
                "{output}", "--strength", "{strength}", "--guidance", "{guidance}", "--steps",
                "{steps}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            model: None,
            prompt_template: "yellow rubber duck seen from {perspective}".to_string(),
            guidance_scale: 2.5,
            inference_steps: 50,
            timeout_ms: 600_000,
            scratch_dir: PathBuf::from(".refinery/scratch"),
        }
    }
}

impl SynthesisConfig {
    /// Model id to use for the given vocabulary.
    pub fn model_for(&self, vocabulary: Vocabulary) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| vocabulary.default_model().to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub url: String,
    pub max_attempts: u32,
    pub poll_interval_ms: u64,
    /// How long the session stays open after a successful navigation
    pub dwell_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:7007".to_string(),
            max_attempts: 20,
            poll_interval_ms: 10_000,
            dwell_ms: 10_000,
            request_timeout_ms: 5_000,
        }
    }
}

impl ProbeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }
}

/// What to do when the termination signal does not arrive in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutPolicy {
    /// Terminate the trainer and fail the run
    #[default]
    Abort,
    /// Terminate the trainer, mark the iteration degraded, keep going
    Degrade,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub bind: SocketAddr,
    /// Camera events per termination; defaults to the perspective count
    pub threshold: Option<u32>,
    /// Unset means wait forever
    pub termination_timeout_ms: Option<u64>,
    pub on_timeout: TimeoutPolicy,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8765)),
            threshold: None,
            termination_timeout_ms: None,
            on_timeout: TimeoutPolicy::default(),
        }
    }
}

impl NotificationConfig {
    pub fn termination_timeout(&self) -> Option<Duration> {
        self.termination_timeout_ms.map(Duration::from_millis)
    }
}

/// Names of the per-run working directories and files, relative to the run root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub init_dir: String,
    pub synth_dir: String,
    pub render_dir: String,
    pub reconstruction_dir: String,
    pub archive_dir: String,
    pub transforms_source: String,
    pub transforms_archive_name: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            init_dir: "init".to_string(),
            synth_dir: "diff_mod_image".to_string(),
            render_dir: "output".to_string(),
            reconstruction_dir: "outputs".to_string(),
            archive_dir: "iter".to_string(),
            transforms_source: "transforms_internal.json".to_string(),
            transforms_archive_name: "transforms.json".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            run: RunConfig::default(),
            trainer: TrainerConfig::default(),
            synthesis: SynthesisConfig::default(),
            probe: ProbeConfig::default(),
            notification: NotificationConfig::default(),
            layout: LayoutConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .context(format!("Failed to load config from {}", path.display()));
        }

        let project_name = env!("CARGO_PKG_NAME");

        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Apply CLI overrides in place.
    pub fn apply(&mut self, overrides: &RunOverrides) {
        if let Some(iterations) = overrides.iterations {
            self.run.iterations = iterations;
        }
        if let Some(model) = &overrides.model {
            self.trainer.model = model.clone();
        }
        if let Some(steps) = overrides.steps {
            self.trainer.steps = steps;
        }
        if let Some(vocabulary) = overrides.vocabulary {
            self.run.vocabulary = vocabulary;
        }
    }

    /// Termination threshold for a run over `perspective_count` viewpoints.
    pub fn threshold(&self, perspective_count: usize) -> u32 {
        self.notification
            .threshold
            .unwrap_or(perspective_count as u32)
    }
}
