//! Orchestrator module - the iteration state machine.
//!
//! - IterationOrchestrator runs the synthesize/reconstruct/archive passes
//! - IterationState tracks where a run is
//! - IterationReport and RunSummary describe what a run did

mod iteration_orchestrator;
mod state;

pub use iteration_orchestrator::IterationOrchestrator;
pub use state::{IterationReport, IterationState, RunSummary};
