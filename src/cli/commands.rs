//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: drive the refinement loop (default)
//! - perspectives: print the active perspective vocabulary
//! - slots: list sealed archive slots
//! - verify: recheck a slot against its manifest

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use refinery::config::RunOverrides;
use refinery::domain::Vocabulary;

/// Refinery - iterative image synthesis and reconstruction
#[derive(Parser, Debug)]
#[command(name = "refinery")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute; defaults to `run`
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the refinement loop
    Run {
        /// Number of iterations
        #[arg(short, long)]
        iterations: Option<u32>,

        /// Reconstruction model variant (e.g. instant-ngp, nerfacto)
        #[arg(short, long)]
        model: Option<String>,

        /// Trainer steps per iteration
        #[arg(short, long)]
        steps: Option<u32>,

        /// Use plain viewpoint names instead of tokens in prompts
        #[arg(short = 'd', long)]
        not_tokenized: bool,
    },

    /// Print the perspective set
    Perspectives {
        /// Show the plain vocabulary
        #[arg(short = 'd', long)]
        not_tokenized: bool,
    },

    /// List sealed archive slots
    Slots {
        /// Archive root; defaults to the configured archive directory
        archive_root: Option<PathBuf>,
    },

    /// Recompute a slot's digests against its manifest
    Verify {
        /// Slot directory
        slot_dir: PathBuf,
    },
}

impl Commands {
    /// Config overrides carried by `run`; empty for every other command.
    pub fn run_overrides(&self) -> RunOverrides {
        match self {
            Commands::Run {
                iterations,
                model,
                steps,
                not_tokenized,
            } => RunOverrides {
                iterations: *iterations,
                model: model.clone(),
                steps: *steps,
                vocabulary: not_tokenized.then_some(Vocabulary::Plain),
            },
            _ => RunOverrides::new(),
        }
    }
}
