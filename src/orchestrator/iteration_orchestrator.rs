//! IterationOrchestrator - drives synthesize/reconstruct/archive passes.
//!
//! Each pass:
//! 1. Rotates the previous pass's artifacts into its archive slot
//! 2. Synthesizes every perspective at the pass's strength
//! 3. Launches the trainer (listener started once, counter reset)
//! 4. Probes the trainer's viewer until it answers
//! 5. Waits for the camera-count termination signal
//! 6. Kills the trainer and frees the synthesizer's accelerator memory
//!
//! After the last pass a final rotation seals the last slot.

use std::sync::Arc;

use log::{debug, error, info, warn};

use super::state::{IterationReport, IterationState, RunSummary};
use crate::artifact::{ArtifactStore, Image, RotationReport};
use crate::config::{Config, TimeoutPolicy};
use crate::domain::{IterationRecord, PerspectiveSpec};
use crate::error::{RefineryError, Result};
use crate::notify::{NotificationChannel, TerminationReceiver};
use crate::probe::{BrowserLauncher, ProbeOutcome, ReadinessProbe};
use crate::synthesis::{ImageModel, ImageSynthesisAdapter, SynthesisOptions};
use crate::trainer::{TrainerCommand, TrainerHandle, TrainerProcessController, TrainerState};

pub struct IterationOrchestrator<M, B>
where
    M: ImageModel,
    B: BrowserLauncher,
{
    config: Config,
    perspectives: Vec<PerspectiveSpec>,
    store: ArtifactStore,
    synthesis: ImageSynthesisAdapter<M>,
    probe: ReadinessProbe<B>,
    controller: TrainerProcessController,
    trainer_command: TrainerCommand,
    /// Started on the first pass, shut down when the run ends
    notifications: Option<(NotificationChannel, TerminationReceiver)>,
    trainer: Option<TrainerHandle>,
    state: IterationState,
}

impl<M, B> IterationOrchestrator<M, B>
where
    M: ImageModel,
    B: BrowserLauncher,
{
    /// Build an orchestrator for a fresh run under `config.run.work_dir`.
    pub fn new(config: Config, model: Arc<M>, launcher: B) -> Self {
        let root = config.run.work_dir.clone();
        let store = ArtifactStore::new(
            &root,
            config.layout.clone(),
            &ArtifactStore::run_stamp_now(),
        );
        let synthesis = ImageSynthesisAdapter::new(model, SynthesisOptions::from(&config.synthesis));
        let probe = ReadinessProbe::new(launcher, config.probe.dwell());
        let trainer_command = TrainerCommand::from_config(&config.trainer).current_dir(&root);

        Self {
            perspectives: config.run.vocabulary.perspectives(),
            config,
            store,
            synthesis,
            probe,
            controller: TrainerProcessController::new(),
            trainer_command,
            notifications: None,
            trainer: None,
            state: IterationState::Idle,
        }
    }

    pub fn with_perspectives(mut self, perspectives: Vec<PerspectiveSpec>) -> Self {
        self.perspectives = perspectives;
        self
    }

    pub fn with_store(mut self, store: ArtifactStore) -> Self {
        self.store = store;
        self
    }

    /// Replace the trainer invocation; it runs in the store root unless
    /// the command sets its own directory.
    pub fn with_trainer_command(mut self, command: TrainerCommand) -> Self {
        self.trainer_command = match command.current_dir {
            Some(_) => command,
            None => command.current_dir(self.store.root()),
        };
        self
    }

    pub fn with_controller(mut self, controller: TrainerProcessController) -> Self {
        self.controller = controller;
        self
    }

    /// Use an already bound listener instead of binding `notification.bind`.
    pub fn with_notification_channel(
        mut self,
        channel: NotificationChannel,
        receiver: TerminationReceiver,
    ) -> Self {
        self.notifications = Some((channel, receiver));
        self
    }

    pub fn state(&self) -> IterationState {
        self.state
    }

    pub fn trainer_state(&self) -> TrainerState {
        TrainerState::of(self.trainer.as_ref())
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn perspectives(&self) -> &[PerspectiveSpec] {
        &self.perspectives
    }

    pub fn synthesis(&self) -> &ImageSynthesisAdapter<M> {
        &self.synthesis
    }

    pub fn probe(&self) -> &ReadinessProbe<B> {
        &self.probe
    }

    /// Whether the notification listener is currently accepting
    pub fn listener_running(&self) -> bool {
        self.notifications
            .as_ref()
            .is_some_and(|(channel, _)| channel.is_running())
    }

    /// Run every pass plus the final rotation.
    ///
    /// On a fatal error the trainer is killed, synthesis resources are
    /// released and the listener is shut down before the error is returned.
    pub async fn run(&mut self) -> Result<RunSummary> {
        self.state = IterationState::Idle;
        info!(
            "Starting run: {} iterations over {} perspectives in {}",
            self.config.run.iterations,
            self.perspectives.len(),
            self.store.root().display()
        );

        match self.run_passes().await {
            Ok(summary) => {
                self.shutdown_listener().await;
                self.transition(IterationState::Finished);
                info!(
                    "Run finished: {} slots sealed under {}",
                    summary.slots.len(),
                    summary.run_dir.display()
                );
                Ok(summary)
            }
            Err(e) => {
                error!("Run aborted in {:?}: {}", self.state, e);
                self.abort_cleanup().await;
                self.transition(IterationState::Aborted);
                Err(e)
            }
        }
    }

    async fn run_passes(&mut self) -> Result<RunSummary> {
        self.store.prepare()?;
        self.seed_start_image()?;

        let total = self.config.run.iterations;
        let mut iterations = Vec::with_capacity(total as usize);
        for index in 0..total {
            iterations.push(self.run_pass(index).await?);
        }

        self.transition(IterationState::Rotating);
        let final_rotation = self.rotate(total.checked_sub(1))?;

        Ok(RunSummary {
            run_dir: self.store.run_dir().to_path_buf(),
            iterations,
            final_rotation,
            slots: self.store.list_slots()?,
        })
    }

    async fn run_pass(&mut self, index: u32) -> Result<IterationReport> {
        let record = IterationRecord::new(index, self.config.run.iterations, self.config.run.decay);
        info!(
            "=== Iteration {}/{} (strength {:.4}) ===",
            index + 1,
            self.config.run.iterations,
            record.strength
        );

        self.transition(IterationState::Rotating);
        let rotation = self.rotate(index.checked_sub(1))?;

        self.transition(IterationState::Synthesizing);
        self.synthesis
            .synthesize_all(&self.store, &self.perspectives, record.strength)
            .await?;

        self.transition(IterationState::Launching);
        self.ensure_listener().await?;
        self.reset_notifications().await?;
        self.trainer = Some(self.controller.launch(&self.trainer_command)?);

        self.transition(IterationState::ProbingReadiness);
        let url = self.config.probe.url.clone();
        if let ProbeOutcome::Unreachable { attempts } = self.probe.wait_with(&self.config.probe).await? {
            return Err(RefineryError::ProbeUnreachable { url, attempts });
        }

        self.transition(IterationState::AwaitingTermination);
        let degraded = self.await_termination().await?;

        self.terminate_trainer();
        self.synthesis.release_resources();
        self.transition(IterationState::Terminated);

        Ok(IterationReport {
            index: record.index,
            strength: record.strength,
            degraded,
            rotation,
        })
    }

    fn transition(&mut self, next: IterationState) {
        debug!("{:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn rotate(&self, slot: Option<u32>) -> Result<RotationReport> {
        let report = self.store.rotate(slot, &self.perspectives)?;
        if !report.is_complete() {
            warn!(
                "Rotation into slot {:?} skipped {} missing artifact(s)",
                slot,
                report.skipped.len()
            );
        }
        Ok(report)
    }

    /// Copy the configured start image to every render slot so the first
    /// rotation promotes it to the seeds.
    fn seed_start_image(&self) -> Result<()> {
        let Some(start) = &self.config.run.start_image else {
            return Ok(());
        };
        let path = self.store.root().join(start);
        if !path.exists() {
            warn!("Start image {} not found; using existing seeds", path.display());
            return Ok(());
        }
        let image = Image::read(&path)?;
        let seeded = self.store.seed_renders(&image, &self.perspectives)?;
        info!("Seeded {} perspectives from {}", seeded, path.display());
        Ok(())
    }

    async fn ensure_listener(&mut self) -> Result<()> {
        if self.notifications.is_none() {
            let threshold = self.config.threshold(self.perspectives.len());
            let bound = NotificationChannel::bind(self.config.notification.bind, threshold).await?;
            self.notifications = Some(bound);
        }
        Ok(())
    }

    /// Zero the counter and drop signals left from the previous pass.
    async fn reset_notifications(&mut self) -> Result<()> {
        let (channel, receiver) = self
            .notifications
            .as_mut()
            .ok_or_else(|| RefineryError::Notification("listener not started".to_string()))?;
        channel.reset().await;
        receiver.drain();
        Ok(())
    }

    /// Returns whether the pass ended degraded.
    async fn await_termination(&mut self) -> Result<bool> {
        let timeout = self.config.notification.termination_timeout();
        let policy = self.config.notification.on_timeout;
        let (_, receiver) = self
            .notifications
            .as_mut()
            .ok_or_else(|| RefineryError::Notification("listener not started".to_string()))?;

        match receiver.wait(timeout).await {
            Ok(signal) => {
                info!("Termination signal #{} received", signal.sequence);
                Ok(false)
            }
            Err(RefineryError::TerminationTimeout(ms)) if policy == TimeoutPolicy::Degrade => {
                warn!("No termination signal after {}ms; stopping trainer anyway", ms);
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    fn terminate_trainer(&mut self) {
        if let Some(handle) = self.trainer.as_mut() {
            self.controller.terminate(handle);
        }
    }

    async fn shutdown_listener(&mut self) {
        if let Some((channel, _)) = self.notifications.as_mut() {
            channel.shutdown().await;
        }
    }

    async fn abort_cleanup(&mut self) {
        self.terminate_trainer();
        self.synthesis.release_resources();
        self.shutdown_listener().await;
    }
}
