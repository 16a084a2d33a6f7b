//! Reconstruction trainer subprocess.

pub mod command;
pub mod controller;

pub use command::TrainerCommand;
pub use controller::{TrainerHandle, TrainerProcessController, TrainerState};
