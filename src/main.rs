use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use refinery::artifact::{ArtifactStore, SlotManifest};
use refinery::config::{Config, RunOverrides};
use refinery::domain::Vocabulary;
use refinery::orchestrator::{IterationOrchestrator, RunSummary};
use refinery::probe::HttpBrowser;
use refinery::synthesis::CommandImageModel;

mod cli;

use cli::Cli;
use cli::commands::Commands;

fn setup_logging(default_level: &str) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("refinery")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("refinery.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    // RUST_LOG wins over the configured level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn run_application(cli: &Cli, mut config: Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        None => handle_run_command(&RunOverrides::new(), config),
        Some(command @ Commands::Run { .. }) => {
            let overrides = command.run_overrides();
            config.apply(&overrides);
            handle_run_command(&overrides, config)
        }
        Some(Commands::Perspectives { not_tokenized }) => {
            let vocabulary = if *not_tokenized {
                Vocabulary::Plain
            } else {
                config.run.vocabulary
            };
            handle_perspectives_command(vocabulary, &config)
        }
        Some(Commands::Slots { archive_root }) => {
            let root = archive_root
                .clone()
                .unwrap_or_else(|| config.run.work_dir.join(&config.layout.archive_dir));
            handle_slots_command(&root)
        }
        Some(Commands::Verify { slot_dir }) => handle_verify_command(slot_dir),
    }
}

fn handle_run_command(overrides: &RunOverrides, config: Config) -> Result<()> {
    info!("Run overrides: {:?}", overrides);
    println!(
        "{} {} iterations, model {}, {} steps, {:?} vocabulary",
        "Refining:".green(),
        config.run.iterations,
        config.trainer.model,
        config.trainer.steps,
        config.run.vocabulary
    );

    let model_id = config.synthesis.model_for(config.run.vocabulary);
    let model = Arc::new(CommandImageModel::from_config(
        &config.synthesis,
        model_id,
        &config.run.work_dir,
    ));
    let launcher = HttpBrowser::new(Duration::from_millis(config.probe.request_timeout_ms));

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let summary = runtime.block_on(async move {
        let mut orchestrator = IterationOrchestrator::new(config, model, launcher);
        orchestrator.run().await
    });

    match summary {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "Aborted:".red(), e);
            Err(e).context("Refinement run failed")
        }
    }
}

fn print_summary(summary: &RunSummary) {
    for report in &summary.iterations {
        let status = if report.degraded {
            "degraded".yellow()
        } else {
            "ok".green()
        };
        println!(
            "  iteration {:>3}  strength {:.4}  {}",
            report.index, report.strength, status
        );
    }
    println!(
        "{} {} slots sealed in {}",
        "Finished:".green(),
        summary.slots.len(),
        summary.run_dir.display()
    );
    let skipped = summary.skipped_count();
    if skipped > 0 {
        println!("  {} {} artifacts were missing during rotation", "Note:".yellow(), skipped);
    }
}

fn handle_perspectives_command(vocabulary: Vocabulary, config: &Config) -> Result<()> {
    info!("Listing {:?} perspectives", vocabulary);
    println!(
        "{} {:?} ({})",
        "Vocabulary:".green(),
        vocabulary,
        config.synthesis.model_for(vocabulary)
    );
    for perspective in vocabulary.perspectives() {
        println!(
            "  {:<20} {:<24} {} -> {}",
            perspective.label.cyan(),
            perspective.prompt_term,
            perspective.input_artifact,
            perspective.output_artifact
        );
    }
    Ok(())
}

fn handle_slots_command(archive_root: &Path) -> Result<()> {
    info!("Listing slots under {}", archive_root.display());
    let slots = ArtifactStore::list_archive(archive_root)
        .context(format!("Failed to list slots under {}", archive_root.display()))?;
    if slots.is_empty() {
        println!("{} {}", "No sealed slots under".yellow(), archive_root.display());
        return Ok(());
    }
    for slot in slots {
        let manifest = SlotManifest::load(&slot)
            .context(format!("Failed to read manifest in {}", slot.display()))?;
        println!(
            "  {}  {} files  sealed {}",
            slot.display().to_string().cyan(),
            manifest.entries.len(),
            manifest.sealed_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

fn handle_verify_command(slot_dir: &Path) -> Result<()> {
    info!("Verifying slot {}", slot_dir.display());
    let mismatched = ArtifactStore::verify_slot(slot_dir)
        .context(format!("Failed to verify {}", slot_dir.display()))?;
    if mismatched.is_empty() {
        println!("{} {}", "Intact:".green(), slot_dir.display());
        return Ok(());
    }
    println!("{} {}", "Altered:".red(), slot_dir.display());
    for path in &mismatched {
        println!("  {}", path);
    }
    eyre::bail!("{} files in {} do not match the manifest", mismatched.len(), slot_dir.display())
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    let level = if cli.is_verbose() {
        "debug".to_string()
    } else {
        config.log_level.clone().unwrap_or_else(|| "info".to_string())
    };
    setup_logging(&level).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, config).context("Application failed")?;

    Ok(())
}
