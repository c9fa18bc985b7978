//! buildrelay - commit-gated Jenkins build and TEM submission
//!
//! The `buildrelay` command watches a branch for new commits, builds each one
//! on Jenkins and submits a TEM execution job once the build passes.
//!
//! ## Commands
//!
//! - `check`: Report whether the branch has an unprocessed commit
//! - `run --confirm`: Run the full pipeline for a new commit
//! - `test-trigger`: Trigger the Jenkins job and report the tracking handle
//! - `test-ui`: Run the TEM submission on its own
//! - `setup`: Print setup instructions and an example configuration
//! - `aliases`: Install or remove the `push-only` / `push-build` git aliases

mod console;

use anyhow::{bail, Context, Result};
use buildrelay_browser::{UiAutomationDriver, UiError};
use buildrelay_core::{
    example_config, install_aliases, remove_aliases, verify_repository, CommitGate, Confidence,
    FileMarkerStore, GitVcs, RelayConfig, DEFAULT_CONFIG_FILE,
};
use buildrelay_jenkins::polling::cancellable;
use buildrelay_jenkins::{BuildTrigger, JenkinsClient};
use buildrelay_pipeline::{
    Dependencies, Pipeline, PipelineReport, RunOutcome, EXIT_FAILURE, EXIT_INTERRUPTED,
    EXIT_REFUSED, EXIT_SUCCESS,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

use console::ConsoleObserver;

const SAFETY_NOTICE: &str = "\
Refusing to run without --confirm.

`buildrelay run` triggers a Jenkins build and submits a TEM execution job.
Re-run with `buildrelay run --confirm` to proceed, or use `buildrelay check`
to see whether there is a new commit to process.";

#[derive(Parser)]
#[command(name = "buildrelay")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Commit-gated Jenkins build and TEM submission", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "BUILDRELAY_CONFIG",
        default_value = DEFAULT_CONFIG_FILE
    )]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and a JSON run summary
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check for a new commit without triggering anything
    Check,

    /// Run the full pipeline for a new commit
    Run {
        /// Required: confirms that a build and a TEM job should be started
        #[arg(long)]
        confirm: bool,
    },

    /// Trigger the Jenkins job and print the resolved tracking handle
    TestTrigger,

    /// Run the TEM submission on its own
    TestUi,

    /// Print setup instructions and an example configuration
    Setup,

    /// Manage the push-only / push-build git aliases
    Aliases {
        #[command(subcommand)]
        action: AliasAction,
    },
}

#[derive(Subcommand)]
enum AliasAction {
    /// Install both aliases into the repository's git config
    Install,

    /// Remove both aliases
    Remove,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    buildrelay_core::init_tracing(cli.json, level);

    let code = match cli.command {
        Commands::Setup => cmd_setup(&cli.config),
        Commands::Check => {
            let config = load_config(&cli.config)?;
            ensure_repository(&config)?;
            cmd_check(&config).await
        }
        Commands::Run { confirm } => {
            if !confirm {
                eprintln!("{SAFETY_NOTICE}");
                return Ok(ExitCode::from(EXIT_REFUSED));
            }
            let config = load_validated_config(&cli.config)?;
            ensure_repository(&config)?;
            cmd_run(&config, cli.json).await?
        }
        Commands::TestTrigger => cmd_test_trigger(&load_validated_config(&cli.config)?).await?,
        Commands::TestUi => cmd_test_ui(&load_validated_config(&cli.config)?).await,
        Commands::Aliases { action } => {
            let config = load_config(&cli.config)?;
            match action {
                AliasAction::Install => {
                    ensure_repository(&config)?;
                    cmd_aliases_install(&config)?
                }
                AliasAction::Remove => cmd_aliases_remove(&config)?,
            }
        }
    };
    Ok(ExitCode::from(code))
}

fn load_config(path: &Path) -> Result<RelayConfig> {
    RelayConfig::load(path).with_context(|| {
        format!(
            "Failed to load configuration (run `buildrelay setup` for an example): {}",
            path.display()
        )
    })
}

fn load_validated_config(path: &Path) -> Result<RelayConfig> {
    let config = load_config(path)?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Refuse to operate on a repository whose remote is not one we expect.
fn ensure_repository(config: &RelayConfig) -> Result<()> {
    let repo = &config.repository;
    if !verify_repository(&repo.dir, &repo.remote, &repo.expected_identifiers) {
        bail!(
            "{} is not the expected repository (remote '{}' should contain one of: {})",
            repo.dir.display(),
            repo.remote,
            repo.expected_identifiers.join(", ")
        );
    }
    Ok(())
}

/// Cancel the returned token on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping");
            trigger.cancel();
        }
    });
    token
}

/// Report whether the tracked branch has an unprocessed commit
async fn cmd_check(config: &RelayConfig) -> u8 {
    let gate = CommitGate::new(
        Arc::new(GitVcs::new(
            config.repository.dir.clone(),
            config.repository.remote.clone(),
        )),
        Arc::new(FileMarkerStore::new(config.marker_path())),
        config.repository.branch.clone(),
    );

    match gate.check_for_new_commit().await {
        Some(head) => println!("New commit: {}", head.short()),
        None => println!("No new commits"),
    }
    EXIT_SUCCESS
}

/// Run the full pipeline
async fn cmd_run(config: &RelayConfig, json: bool) -> Result<u8> {
    let observer = ConsoleObserver::for_config(config, json);
    let deps = Dependencies::production(config, observer)
        .context("Failed to create Jenkins client")?;
    let pipeline = Pipeline::new(config, deps);

    let cancel = cancel_on_ctrl_c();
    let report = pipeline.run(&cancel).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report.to_json())?);
    } else {
        print_report(&report);
    }
    Ok(report.exit_code())
}

fn print_report(report: &PipelineReport) {
    println!();
    println!("Run ID: {}", report.run_id);
    println!("Status: {}", report.outcome.status());
    println!("Duration: {}ms", report.duration_ms);
    for stage in &report.stages {
        let status = if stage.success { "✓" } else { "✗" };
        println!("  {} {} ({}ms)", status, stage.stage, stage.duration_ms);
    }
    println!();

    match &report.outcome {
        RunOutcome::UpToDate { head: Some(head) } => {
            println!("No new commits (head {})", head.short())
        }
        RunOutcome::UpToDate { head: None } => println!("No new commits"),
        RunOutcome::Completed {
            revision,
            execution,
            submission,
        } => {
            println!(
                "Commit {}: build {} passed, TEM job submitted",
                revision.short(),
                execution
            );
            for warning in &submission.warnings {
                println!("  warning: {warning}");
            }
        }
        RunOutcome::Failed { revision, error } => {
            println!("Commit {}: {}", revision.short(), error);
            let tail = error.log_tail();
            if !tail.is_empty() {
                println!("Last {} lines of build output:", tail.len());
                for line in tail {
                    println!("  {line}");
                }
            }
        }
        RunOutcome::Interrupted { stage } => println!("Interrupted during {stage}"),
    }
}

/// Trigger the job and print how the build would be tracked
async fn cmd_test_trigger(config: &RelayConfig) -> Result<u8> {
    let client = JenkinsClient::new(&config.jenkins).context("Failed to create Jenkins client")?;
    let trigger = BuildTrigger::new(Arc::new(client), config.jenkins.job_name.clone());
    let params = config.jenkins.build_params();

    let cancel = cancel_on_ctrl_c();
    let Ok(result) = cancellable(&cancel, trigger.trigger_build(&params)).await else {
        return Ok(EXIT_INTERRUPTED);
    };

    match result {
        Ok(handle) => {
            let confidence = match handle.confidence() {
                Confidence::High => "high",
                Confidence::Low => "low (may not be your run)",
            };
            println!("Handle: {handle}");
            println!("Confidence: {confidence}");
            Ok(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("Trigger failed: {e}");
            Ok(EXIT_FAILURE)
        }
    }
}

/// Run the TEM submission without a build
async fn cmd_test_ui(config: &RelayConfig) -> u8 {
    let driver = UiAutomationDriver::chrome(&config.webdriver, config.tem.clone());
    let cancel = cancel_on_ctrl_c();

    match driver.submit(&cancel).await {
        Ok(report) => {
            println!(
                "TEM job submitted ({} steps, confirmed: {})",
                report.steps_completed.len(),
                report.confirmed
            );
            for warning in &report.warnings {
                println!("  warning: {warning}");
            }
            EXIT_SUCCESS
        }
        Err(UiError::Interrupted(_)) => EXIT_INTERRUPTED,
        Err(e) => {
            eprintln!("TEM automation failed: {e}");
            EXIT_FAILURE
        }
    }
}

/// Print setup instructions and an example configuration
fn cmd_setup(config_path: &Path) -> u8 {
    println!("buildrelay setup");
    println!();
    println!("1. Save the configuration below as {}", config_path.display());
    println!("   and fill in your Jenkins API token and TEM details.");
    println!("   Credentials can also come from BUILDRELAY_JENKINS_USER and");
    println!("   BUILDRELAY_JENKINS_TOKEN.");
    println!("2. Make sure Chrome and chromedriver are installed. Either start");
    println!("   chromedriver yourself (webdriver.url) or set webdriver.chromedriver_path.");
    println!("3. Connect to the VPN, then run `buildrelay check`.");
    println!("4. Optionally run `buildrelay aliases install` to get `git push-build`.");
    println!();
    println!("{}", example_config());
    EXIT_SUCCESS
}

/// Install the git aliases
fn cmd_aliases_install(config: &RelayConfig) -> Result<u8> {
    let exe = std::env::current_exe().context("Failed to locate the buildrelay executable")?;
    let repo = &config.repository;
    install_aliases(&repo.dir, &repo.remote, &repo.branch, &exe)
        .context("Failed to install git aliases")?;
    info!(dir = %repo.dir.display(), "Git aliases installed");
    println!("Installed aliases:");
    println!("  git push-only   push to {}/{}", repo.remote, repo.branch);
    println!(
        "  git push-build  push to {}/{}, then run the pipeline",
        repo.remote, repo.branch
    );
    Ok(EXIT_SUCCESS)
}

/// Remove the git aliases
fn cmd_aliases_remove(config: &RelayConfig) -> Result<u8> {
    remove_aliases(&config.repository.dir).context("Failed to remove git aliases")?;
    println!("Removed git aliases push-only and push-build");
    Ok(EXIT_SUCCESS)
}
