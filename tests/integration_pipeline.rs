//! End-to-end runs of the iteration orchestrator.
//!
//! The trainer is a real `sh` subprocess that writes renders and a
//! reconstruction directory, then idles until killed. The viewer is played by
//! a browser launcher that becomes reachable once the renders exist and then
//! reports camera events over the notification WebSocket.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use futures::SinkExt;
use tempfile::tempdir;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use refinery::artifact::{ArtifactStore, SlotManifest};
use refinery::config::Config;
use refinery::domain::{DEFAULT_DECAY, PerspectiveSpec, ProgressEvent, strength};
use refinery::notify::NotificationChannel;
use refinery::orchestrator::{IterationOrchestrator, IterationState};
use refinery::probe::{BrowserLauncher, BrowserSession, NavigationError};
use refinery::synthesis::MockImageModel;
use refinery::trainer::{TrainerCommand, TrainerState};
use refinery::{RefineryError, Result};

const VIEWS: [&str; 3] = ["top", "left", "right"];

fn perspectives() -> Vec<PerspectiveSpec> {
    vec![
        PerspectiveSpec::new("Top", "top.png", "init_top.png"),
        PerspectiveSpec::new("Left", "left.png", "init_left.png"),
        PerspectiveSpec::new("Right", "right.png", "init_right.png"),
    ]
}

/// Writes the reconstruction outputs, then each render through a rename.
fn trainer_script() -> String {
    let mut script = String::from(
        "mkdir -p output outputs/model && printf cfg > outputs/model/config.yml \
         && printf '{\"frames\":[1,2,3]}' > transforms_internal.json",
    );
    for view in VIEWS {
        script.push_str(&format!(
            " && printf render-{view} > output/.{view}.tmp && mv output/.{view}.tmp output/output_{view}.png"
        ));
    }
    script.push_str(" && exec sleep 600");
    script
}

fn config(root: &Path, iterations: u32, max_attempts: u32) -> Config {
    let mut config = Config::default();
    config.run.iterations = iterations;
    config.run.work_dir = root.to_path_buf();
    config.probe.max_attempts = max_attempts;
    config.probe.poll_interval_ms = 10;
    config.probe.dwell_ms = 0;
    // Fail instead of hanging if events never arrive
    config.notification.termination_timeout_ms = Some(20_000);
    config
}

/// Viewer that answers once every render exists, then reports cameras.
struct ViewerLauncher {
    root: PathBuf,
    notify_addr: SocketAddr,
    cameras: usize,
    navigations: Arc<AtomicU32>,
}

struct ViewerSession {
    root: PathBuf,
    notify_addr: SocketAddr,
    cameras: usize,
    navigations: Arc<AtomicU32>,
    reported: bool,
}

#[async_trait]
impl BrowserLauncher for ViewerLauncher {
    type Session = ViewerSession;

    async fn launch(&self) -> Result<ViewerSession> {
        Ok(ViewerSession {
            root: self.root.clone(),
            notify_addr: self.notify_addr,
            cameras: self.cameras,
            navigations: Arc::clone(&self.navigations),
            reported: false,
        })
    }
}

#[async_trait]
impl BrowserSession for ViewerSession {
    async fn navigate(&mut self, url: &str) -> std::result::Result<(), NavigationError> {
        self.navigations.fetch_add(1, Ordering::SeqCst);
        let serving = VIEWS
            .iter()
            .all(|v| self.root.join("output").join(format!("output_{v}.png")).exists());
        if !serving {
            return Err(NavigationError {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        if !self.reported {
            self.reported = true;
            let addr = self.notify_addr;
            let cameras = self.cameras;
            tokio::spawn(async move {
                let (mut ws, _) = connect_async(format!("ws://{addr}"))
                    .await
                    .expect("connect to notification listener");
                ws.send(Message::Text(ProgressEvent::step("1").encode().unwrap()))
                    .await
                    .unwrap();
                for i in 0..cameras {
                    let frame = ProgressEvent::camera(format!("camera_{i}.png")).encode().unwrap();
                    ws.send(Message::Text(frame)).await.unwrap();
                }
                let _ = ws.close(None).await;
            });
        }
        Ok(())
    }

    async fn close(&mut self) {}
}

/// Viewer that never answers.
struct DeadLauncher {
    navigations: Arc<AtomicU32>,
}

struct DeadSession {
    navigations: Arc<AtomicU32>,
}

#[async_trait]
impl BrowserLauncher for DeadLauncher {
    type Session = DeadSession;

    async fn launch(&self) -> Result<DeadSession> {
        Ok(DeadSession {
            navigations: Arc::clone(&self.navigations),
        })
    }
}

#[async_trait]
impl BrowserSession for DeadSession {
    async fn navigate(&mut self, url: &str) -> std::result::Result<(), NavigationError> {
        self.navigations.fetch_add(1, Ordering::SeqCst);
        Err(NavigationError {
            url: url.to_string(),
            reason: "connection refused".to_string(),
        })
    }

    async fn close(&mut self) {}
}

fn read(path: impl AsRef<Path>) -> String {
    fs::read_to_string(path.as_ref())
        .unwrap_or_else(|e| panic!("reading {}: {}", path.as_ref().display(), e))
}

#[tokio::test]
async fn test_two_iterations_seal_two_complete_slots() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("start.png"), "start").unwrap();

    let (channel, receiver) = NotificationChannel::bind("127.0.0.1:0".parse().unwrap(), 3)
        .await
        .unwrap();
    let navigations = Arc::new(AtomicU32::new(0));
    let launcher = ViewerLauncher {
        root: root.to_path_buf(),
        notify_addr: channel.local_addr(),
        cameras: 3,
        navigations: Arc::clone(&navigations),
    };

    let mut orchestrator = IterationOrchestrator::new(
        config(root, 2, 500),
        Arc::new(MockImageModel::new()),
        launcher,
    )
    .with_perspectives(perspectives())
    .with_trainer_command(TrainerCommand::new("sh").arg("-c").arg(trainer_script()))
    .with_notification_channel(channel, receiver);

    let summary = orchestrator.run().await.unwrap();

    assert_eq!(orchestrator.state(), IterationState::Finished);
    assert_eq!(orchestrator.trainer_state(), TrainerState::Terminated);
    assert!(!orchestrator.listener_running());
    assert_eq!(summary.iterations.len(), 2);
    assert_eq!(summary.degraded_count(), 0);
    assert!(navigations.load(Ordering::SeqCst) >= 2);

    assert_eq!(summary.slots.len(), 2);
    let transforms_source = fs::read(root.join("transforms_internal.json")).unwrap();

    for (index, slot) in summary.slots.iter().enumerate() {
        assert_eq!(slot, &orchestrator.store().slot_dir(index as u32));
        assert!(SlotManifest::is_sealed(slot));
        assert!(ArtifactStore::verify_slot(slot).unwrap().is_empty());

        let expected_strength = strength(index as u32, 2, DEFAULT_DECAY);
        for (p, view) in perspectives().iter().zip(VIEWS) {
            let seed = read(slot.join(&p.input_artifact));
            if index == 0 {
                assert_eq!(seed, "start");
            } else {
                assert_eq!(seed, format!("render-{view}"));
            }

            let synthesized = read(slot.join(&p.output_artifact));
            assert_eq!(
                synthesized,
                format!("yellow rubber duck seen from {}|{:.4}", p.label, expected_strength)
            );
        }

        assert_eq!(read(slot.join("outputs").join("model").join("config.yml")), "cfg");
        let archived = fs::read(slot.join("transforms.json")).unwrap();
        assert_eq!(archived, transforms_source);
    }

    // Renders of the last pass are the seeds for whatever runs next
    for (p, view) in perspectives().iter().zip(VIEWS) {
        assert_eq!(read(orchestrator.store().init_path(p)), format!("render-{view}"));
    }
    assert!(!root.join("outputs").exists());

    let model = orchestrator.synthesis().model();
    assert_eq!(model.call_count(), 6);
    assert_eq!(model.load_count(), 2);
}

#[tokio::test]
async fn test_unreachable_viewer_aborts_without_slots() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("start.png"), "start").unwrap();

    let (channel, receiver) = NotificationChannel::bind("127.0.0.1:0".parse().unwrap(), 3)
        .await
        .unwrap();
    let navigations = Arc::new(AtomicU32::new(0));

    let mut orchestrator = IterationOrchestrator::new(
        config(root, 2, 3),
        Arc::new(MockImageModel::new()),
        DeadLauncher {
            navigations: Arc::clone(&navigations),
        },
    )
    .with_perspectives(perspectives())
    .with_trainer_command(TrainerCommand::new("sh").arg("-c").arg("exec sleep 600"))
    .with_notification_channel(channel, receiver);

    let err = orchestrator.run().await.unwrap_err();

    match err {
        RefineryError::ProbeUnreachable { url, attempts } => {
            assert_eq!(attempts, 3);
            assert_eq!(url, "http://localhost:7007");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(navigations.load(Ordering::SeqCst), 3);
    assert_eq!(orchestrator.state(), IterationState::Aborted);
    assert_eq!(orchestrator.trainer_state(), TrainerState::Terminated);
    assert!(!orchestrator.listener_running());
    assert!(orchestrator.store().list_slots().unwrap().is_empty());
    // Lease release plus abort cleanup
    assert_eq!(orchestrator.synthesis().model().release_count(), 2);
}
