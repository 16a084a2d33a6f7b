//! Iteration states and run reports.

use std::path::PathBuf;

use crate::artifact::RotationReport;

/// Where the orchestrator is within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationState {
    Idle,
    Rotating,
    Synthesizing,
    Launching,
    ProbingReadiness,
    AwaitingTermination,
    /// Trainer of the current pass has been told to stop
    Terminated,
    Finished,
    Aborted,
}

impl IterationState {
    pub fn is_final(&self) -> bool {
        matches!(self, IterationState::Finished | IterationState::Aborted)
    }

    /// Whether a trainer may be alive in this state
    pub fn trainer_active(&self) -> bool {
        matches!(
            self,
            IterationState::Launching
                | IterationState::ProbingReadiness
                | IterationState::AwaitingTermination
        )
    }
}

/// Result of one pass.
#[derive(Debug, Clone)]
pub struct IterationReport {
    pub index: u32,
    pub strength: f64,
    /// The termination signal timed out and the trainer was stopped anyway
    pub degraded: bool,
    /// Rotation performed at the start of the pass
    pub rotation: RotationReport,
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_dir: PathBuf,
    pub iterations: Vec<IterationReport>,
    /// Rotation that sealed the last pass
    pub final_rotation: RotationReport,
    /// Sealed slots of this run, ordered by iteration
    pub slots: Vec<PathBuf>,
}

impl RunSummary {
    pub fn degraded_count(&self) -> usize {
        self.iterations.iter().filter(|r| r.degraded).count()
    }

    /// Number of artifacts that were missing across all rotations
    pub fn skipped_count(&self) -> usize {
        self.iterations
            .iter()
            .map(|r| r.rotation.skipped.len())
            .sum::<usize>()
            + self.final_rotation.skipped.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(index: u32, degraded: bool, skipped: usize) -> IterationReport {
        IterationReport {
            index,
            strength: 1.0,
            degraded,
            rotation: RotationReport {
                skipped: vec![PathBuf::from("x"); skipped],
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_summary_counts() {
        let summary = RunSummary {
            run_dir: PathBuf::from("iter/run"),
            iterations: vec![report(0, false, 2), report(1, true, 0), report(2, true, 1)],
            final_rotation: RotationReport {
                skipped: vec![PathBuf::from("y")],
                ..Default::default()
            },
            slots: Vec::new(),
        };
        assert_eq!(summary.degraded_count(), 2);
        assert_eq!(summary.skipped_count(), 4);
    }

    #[test]
    fn test_state_predicates() {
        assert!(IterationState::Finished.is_final());
        assert!(IterationState::Aborted.is_final());
        assert!(!IterationState::Terminated.is_final());
        assert!(IterationState::AwaitingTermination.trainer_active());
        assert!(!IterationState::Rotating.trainer_active());
    }
}
