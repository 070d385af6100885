//! mergemend command-line tool.
//!
//! Scans a git working tree for conflicted files, proposes a resolution for
//! each one, lets the user review the proposals, and writes and stages the
//! approved files. Also generates and validates configuration files.

mod resolve;
mod scan;
mod signals;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mergemend_core::completion::{CompletionService, HttpCompletionClient};
use mergemend_core::config::AppConfig;
use mergemend_core::conflict::{MergeExecutor, MergeStrategy, ProposalManager};
use mergemend_core::orchestrator::BatchOrchestrator;
use mergemend_core::vcs::GitRepository;

const LOCAL_CONFIG: &str = "mergemend.toml";

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// mergemend command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "mergemend",
    version,
    about = "Propose, review and apply resolutions for git merge conflicts"
)]
struct Cli {
    /// Path to the TOML configuration file. Defaults to ./mergemend.toml,
    /// then the user config directory, then built-in defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Repository path (overrides `repository.path`).
    #[arg(short = 'C', long = "repo", global = true)]
    repo: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List conflicted files and their proposed resolutions.
    Scan {
        /// Print the proposals as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the proposed diff for one conflicted file.
    Show {
        /// Path relative to the repository root.
        file: String,
    },

    /// Review proposals and write the approved resolutions.
    Resolve {
        /// Force one strategy on every file: auto, ours, theirs,
        /// structural, semantic.
        #[arg(short, long)]
        strategy: Option<MergeStrategy>,

        /// Approve every proposal without prompting.
        #[arg(short, long)]
        yes: bool,

        /// Never call the completion service; semantic merges fall back to
        /// structural merges.
        #[arg(long)]
        no_model: bool,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./mergemend.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => config_log_level(cli.config.as_deref()).unwrap_or_else(|| "warn".into()),
        1 => "info".into(),
        _ => "debug".into(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("Error: {:#}", e)));
            ExitCode::FAILURE
        }
    }
}

/// `engine.log_level` from the config file, read before logging is set up.
fn config_log_level(explicit: Option<&Path>) -> Option<String> {
    let path = config_path(explicit)?;
    AppConfig::load_from_file(path)
        .ok()
        .map(|config| config.engine.log_level)
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { output } => cmd_init(&output),
        Commands::Validate => cmd_validate(cli.config.as_deref()),
        Commands::Scan { json } => {
            let config = load_config(cli.config.as_deref())?;
            let mut orch = build_orchestrator(&config, cli.repo.as_deref(), true)?;
            scan::run_scan(&mut orch, json).await
        }
        Commands::Show { file } => {
            let config = load_config(cli.config.as_deref())?;
            let mut orch = build_orchestrator(&config, cli.repo.as_deref(), true)?;
            scan::run_show(&mut orch, &file).await
        }
        Commands::Resolve {
            strategy,
            yes,
            no_model,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let mut orch = build_orchestrator(&config, cli.repo.as_deref(), !no_model)?;
            signals::cancel_on_ctrl_c(orch.cancellation_flag());
            resolve::run_resolve(&mut orch, strategy, yes).await
        }
    }
}

// ---------------------------------------------------------------------------
// Config & engine helpers
// ---------------------------------------------------------------------------

/// Explicit path, then `./mergemend.toml`, then the user config directory.
fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(LOCAL_CONFIG);
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("mergemend").join("config.toml"))
        .filter(|path| path.exists())
}

fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let Some(path) = config_path(explicit) else {
        info!("no configuration file found, using defaults");
        return Ok(AppConfig::default());
    };
    AppConfig::load_and_resolve(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

fn build_orchestrator(
    config: &AppConfig,
    repo_override: Option<&Path>,
    use_model: bool,
) -> Result<BatchOrchestrator> {
    let repo_path = repo_override.unwrap_or(config.repository.path.as_path());
    let repo = GitRepository::open(repo_path).context("failed to open repository")?;

    let executor = if use_model && config.completion.enabled {
        match HttpCompletionClient::from_config(&config.completion) {
            Ok(client) => {
                info!(model = client.model(), "semantic merges enabled");
                let client: Arc<dyn CompletionService> = Arc::new(client);
                MergeExecutor::with_completion(client)
                    .semantic_timeout(Duration::from_secs(config.completion.timeout_secs))
            }
            Err(e) => {
                warn!(error = %e, "completion service unavailable, using structural merges");
                MergeExecutor::new()
            }
        }
    } else {
        MergeExecutor::new()
    };

    let manager = ProposalManager::new(config.engine.selector(), executor);
    Ok(BatchOrchestrator::new(Arc::new(repo), manager))
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    let body = AppConfig::default()
        .to_toml()
        .context("failed to render default configuration")?;
    let contents = format!(
        "# mergemend configuration\n\
         # The completion API key is read from the variable named by api_key_env.\n\n{}",
        body
    );
    std::fs::write(output, contents).context("failed to write config file")?;

    println!("{}", style::success(&format!("Default configuration written to {}", output.display())));
    println!();
    println!("Next steps:");
    println!("  1. Point [completion] at your model endpoint, or set enabled = false");
    println!("  2. Export the API key variable named by completion.api_key_env");
    println!(
        "  3. Validate with: mergemend validate --config {}",
        output.display()
    );

    Ok(())
}

fn cmd_validate(explicit: Option<&Path>) -> Result<()> {
    let Some(config_path) = config_path(explicit) else {
        anyhow::bail!("no configuration file found (pass --config or create {})", LOCAL_CONFIG);
    };
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        AppConfig::load_from_file(&config_path).context("failed to parse configuration")?;
    println!("  {}", style::success("TOML structure is valid"));

    config
        .resolve_env_vars()
        .context("failed to resolve environment variables")?;
    println!("  {}", style::success("Environment variable references processed"));

    if let Err(e) = config.validate() {
        println!("  {}", style::error(&format!("Validation error: {}", e)));
        anyhow::bail!("configuration validation failed");
    }
    println!("  {}", style::success("All values are valid"));

    println!();
    println!("Configuration summary:");
    println!("  Log level        : {}", config.engine.log_level);
    println!("  Source extensions: {}", config.engine.source_extensions.join(", "));
    println!("  Repository       : {}", config.repository.path.display());
    println!(
        "  Semantic merges  : {}",
        if config.completion.enabled { "enabled" } else { "disabled" }
    );
    if config.completion.enabled {
        println!("  Completion API   : {}", config.completion.api_url);
        println!("  Model            : {}", config.completion.model);
        println!(
            "  API key          : {}",
            if config.completion.api_key.is_some() {
                "set"
            } else {
                "NOT SET"
            }
        );
        println!("  Timeout          : {}s", config.completion.timeout_secs);
    }
    println!();
    println!("Configuration is valid.");

    Ok(())
}
