//! TrainerProcessController - lifecycle of the reconstruction subprocess.
//!
//! The trainer's stdout is discarded. Its stderr is read line by line by a
//! dedicated task and forwarded to the log under the `trainer` target.
//! Termination is a kill request; exit is never awaited.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::command::TrainerCommand;
use crate::error::{RefineryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerState {
    NotStarted,
    Running,
    Terminating,
    Terminated,
}

impl TrainerState {
    /// State of an optional handle; no handle means nothing was started.
    pub fn of(handle: Option<&TrainerHandle>) -> Self {
        handle.map_or(TrainerState::NotStarted, TrainerHandle::state)
    }
}

/// A launched trainer.
///
/// Dropping the handle kills the process.
pub struct TrainerHandle {
    child: Child,
    pid: Option<u32>,
    state: TrainerState,
    killed: watch::Sender<bool>,
    stderr_task: Option<JoinHandle<u64>>,
}

impl TrainerHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> TrainerState {
        self.state
    }

    /// Flips to `true` once termination has been requested.
    pub fn killed(&self) -> watch::Receiver<bool> {
        self.killed.subscribe()
    }

    /// Exit status if the process has already exited.
    pub fn try_exit_status(&mut self) -> Option<ExitStatus> {
        self.child.try_wait().ok().flatten()
    }

    /// Wait up to `limit` for the process to exit.
    pub async fn wait_exit(&mut self, limit: Duration) -> Option<ExitStatus> {
        tokio::time::timeout(limit, self.child.wait())
            .await
            .ok()
            .and_then(|status| status.ok())
    }

    /// Wait for the stderr drain to finish; returns the number of lines read.
    pub async fn join_diagnostics(&mut self) -> u64 {
        match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or(0),
            None => 0,
        }
    }
}

/// Starts and stops trainer processes.
#[derive(Debug, Default)]
pub struct TrainerProcessController {
    diagnostics: Option<mpsc::UnboundedSender<String>>,
}

impl TrainerProcessController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also send every stderr line to `tap`.
    pub fn with_diagnostics(mut self, tap: mpsc::UnboundedSender<String>) -> Self {
        self.diagnostics = Some(tap);
        self
    }

    /// Spawn the trainer and start draining its stderr.
    pub fn launch(&self, command: &TrainerCommand) -> Result<TrainerHandle> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.current_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| RefineryError::LaunchFailed(format!("{}: {}", command.display(), e)))?;
        let pid = child.id();

        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(drain_stderr(stderr, self.diagnostics.clone())));

        let (killed, _) = watch::channel(false);
        info!("Trainer started (pid {:?}): {}", pid, command.display());

        Ok(TrainerHandle {
            child,
            pid,
            state: TrainerState::Running,
            killed,
            stderr_task,
        })
    }

    /// Kill the trainer and publish the killed event. Does not wait for exit.
    ///
    /// This is a forced kill (SIGKILL on Unix via `start_kill`), not a graceful
    /// SIGTERM; the trainer gets no chance to flush. Terminating an already
    /// terminated handle is a no-op.
    pub fn terminate(&self, handle: &mut TrainerHandle) {
        if handle.state != TrainerState::Running {
            debug!("Trainer {:?} already {:?}", handle.pid, handle.state);
            return;
        }
        handle.state = TrainerState::Terminating;

        match handle.child.start_kill() {
            Ok(()) => info!("Kill requested for trainer (pid {:?})", handle.pid),
            // Already exited on its own
            Err(e) => debug!("Trainer (pid {:?}) not killed: {}", handle.pid, e),
        }

        handle.killed.send_replace(true);
        handle.state = TrainerState::Terminated;
    }
}

async fn drain_stderr(stderr: ChildStderr, tap: Option<mpsc::UnboundedSender<String>>) -> u64 {
    let mut lines = BufReader::new(stderr).lines();
    let mut count = 0;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                count += 1;
                info!(target: "trainer", "{}", line);
                if let Some(tap) = &tap {
                    let _ = tap.send(line);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(target: "trainer", "stderr read failed: {}", e);
                break;
            }
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sh(script: &str) -> TrainerCommand {
        TrainerCommand::new("sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn test_launch_and_terminate() {
        let controller = TrainerProcessController::new();
        let mut handle = controller.launch(&sh("exec sleep 30")).unwrap();
        assert_eq!(handle.state(), TrainerState::Running);
        assert!(handle.pid().is_some());

        let killed = handle.killed();
        assert!(!*killed.borrow());

        controller.terminate(&mut handle);
        assert_eq!(handle.state(), TrainerState::Terminated);
        assert!(*killed.borrow());

        let status = handle.wait_exit(Duration::from_secs(5)).await.unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn test_stderr_is_drained_line_by_line() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let controller = TrainerProcessController::new().with_diagnostics(tx);
        let mut handle = controller
            .launch(&sh("echo first >&2; echo second >&2; echo ignored"))
            .unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert_eq!(first.as_deref(), Some("first"));
        assert_eq!(second.as_deref(), Some("second"));
        assert_eq!(handle.join_diagnostics().await, 2);
    }

    #[tokio::test]
    async fn test_large_stderr_does_not_block() {
        let controller = TrainerProcessController::new();
        let mut handle = controller
            .launch(&sh("i=0; while [ $i -lt 5000 ]; do echo line $i >&2; i=$((i+1)); done"))
            .unwrap();
        let status = handle.wait_exit(Duration::from_secs(20)).await.unwrap();
        assert!(status.success());
        assert_eq!(handle.join_diagnostics().await, 5000);
    }

    #[tokio::test]
    async fn test_launch_missing_program() {
        let controller = TrainerProcessController::new();
        let result = controller.launch(&TrainerCommand::new("nonexistent_trainer_xyz"));
        assert!(matches!(result, Err(RefineryError::LaunchFailed(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_kills_trainer_ignoring_sigterm() {
        use std::os::unix::process::ExitStatusExt;

        let controller = TrainerProcessController::new();
        let mut handle = controller
            .launch(&sh("trap '' TERM; while :; do sleep 1; done"))
            .unwrap();
        // Let the trap install
        tokio::time::sleep(Duration::from_millis(200)).await;

        controller.terminate(&mut handle);
        let status = handle.wait_exit(Duration::from_secs(5)).await.unwrap();
        assert_eq!(status.signal(), Some(9));
    }

    #[tokio::test]
    async fn test_terminate_twice_and_after_exit() {
        let controller = TrainerProcessController::new();
        let mut handle = controller.launch(&sh("exit 0")).unwrap();
        handle.wait_exit(Duration::from_secs(5)).await.unwrap();

        controller.terminate(&mut handle);
        assert_eq!(handle.state(), TrainerState::Terminated);
        controller.terminate(&mut handle);
        assert_eq!(handle.state(), TrainerState::Terminated);
    }

    #[tokio::test]
    async fn test_runs_in_current_dir() {
        let dir = tempdir().unwrap();
        let controller = TrainerProcessController::new();
        let mut handle = controller
            .launch(&sh("touch marker").current_dir(dir.path()))
            .unwrap();
        handle.wait_exit(Duration::from_secs(5)).await.unwrap();
        assert!(dir.path().join("marker").exists());
    }

    #[test]
    fn test_state_of_missing_handle() {
        assert_eq!(TrainerState::of(None), TrainerState::NotStarted);
    }
}
