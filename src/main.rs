use anyhow::{Context, Result};
use autosubsync::app::{SyncOptions, SyncOutcome, Synchronizer, build_recognizer};
use autosubsync::cli::{Cli, Commands};
use autosubsync::config::Config;
use autosubsync::pipeline::stop::StopReason;
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Some(Commands::Completions { shell }) = cli.command {
        clap_complete::generate(
            shell,
            &mut Cli::command(),
            "autosubsync",
            &mut std::io::stdout(),
        );
        return Ok(());
    }

    let (Some(video), Some(subtitles)) = (cli.video.clone(), cli.subtitles.clone()) else {
        anyhow::bail!("both VIDEO and SUBTITLES are required");
    };

    let mut config = load_config(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    tracing::debug!(version = %autosubsync::version_string(), ?config, "starting");

    let recognizer = build_recognizer(&config)?;
    let options = SyncOptions::from_config(&config, &video, &subtitles)
        .with_overwrite(cli.overwrite)
        .with_dry_run(cli.dry_run);
    let synchronizer = Synchronizer::new(options, recognizer);

    let stop = synchronizer.stop_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && stop.trigger(StopReason::Interrupted) {
            tracing::info!("interrupted, estimating from what was heard so far");
        }
    });

    let outcome = tokio::task::spawn_blocking(move || synchronizer.run())
        .await
        .context("synchronization thread panicked")??;

    report_outcome(&outcome, cli.json, cli.quiet)?;
    Ok(())
}

/// Installs the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `-v` raises the level to info and
/// `-vv` to debug. `-q` limits output to errors.
fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("autosubsync={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration from file or defaults.
///
/// Priority order:
/// 1. Custom config path (if provided via --config)
/// 2. Default config path (~/.config/autosubsync/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path).with_context(|| format!("loading {}", path.display()))?
    } else if let Some(default_path) = Config::default_path() {
        Config::load_or_default(&default_path)
            .with_context(|| format!("loading {}", default_path.display()))?
    } else {
        Config::default()
    };

    Ok(config.with_env_overrides())
}

fn report_outcome(outcome: &SyncOutcome, json: bool, quiet: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.summary())?);
        return Ok(());
    }

    match outcome {
        SyncOutcome::Synced {
            estimate, output, ..
        } => {
            if !quiet {
                eprintln!(
                    "{} shifted by {} ({} matches) → {}",
                    "Synced:".green(),
                    format_shift(estimate.shift_ms),
                    estimate.candidates,
                    display(output)
                );
            }
        }
        SyncOutcome::DryRun {
            estimate, output, ..
        } => {
            println!(
                "Would shift by {} ({} matches) → {}",
                format_shift(estimate.shift_ms),
                estimate.candidates,
                display(output)
            );
        }
        SyncOutcome::NoMatch { report } => {
            if !quiet {
                eprintln!(
                    "{} no phrase matched a subtitle line after {:.1}s of speech; nothing written",
                    "Warning:".yellow(),
                    report.speech_ms as f64 / 1000.0
                );
            }
        }
    }
    Ok(())
}

fn format_shift(shift_ms: i64) -> String {
    format!("{:+.3}s", shift_ms as f64 / 1000.0)
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
