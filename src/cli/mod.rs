//! CLI module for refinery - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
