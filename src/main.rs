use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod installer;
mod repo;
mod stages;

use installer::{HookInstaller, HookState};
use stages::{Runner, StageGraph};

/// Keeps tracked git hooks installed ahead of compile and verify stages
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Repository root (defaults to the nearest directory holding `.git`)
    #[arg(long, global = true, env = "HOOKSTAGE_ROOT")]
    root: Option<PathBuf>,

    /// Config file (defaults to `<root>/hookstage.yaml` when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy the tracked hooks into the hooks directory
    Install,
    /// Run stages after everything they depend on
    Run {
        #[arg(required = true)]
        stages: Vec<String>,
    },
    /// Print the order stages would run in
    Plan {
        #[arg(required = true)]
        stages: Vec<String>,
    },
    /// Report whether installed hooks match their tracked sources
    Status {
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("HOOKSTAGE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let root = resolve_root(cli.root.as_deref())?;
    let config = config::load_for_root(&root, cli.config.as_deref())?;
    let mut hooks = config.hooks.clone();
    hooks.hooks_dir = repo::resolve_hooks_dir(&root, &hooks.hooks_dir);
    let installer = HookInstaller::new(&root, &hooks);
    tracing::debug!(
        root = %root.display(),
        hooks_dir = %installer.hooks_dir().display(),
        "resolved repository"
    );

    match cli.command {
        Commands::Install => {
            let installed = installer.install()?;
            for hook in &installed {
                tracing::debug!(
                    source = %hook.source.display(),
                    destination = %hook.destination.display(),
                    "copied"
                );
            }
            tracing::info!(count = installed.len(), "hooks installed");
        }
        Commands::Run { stages } => {
            let graph = StageGraph::from_config(&config.stages)?;
            let ran = Runner::new(&graph, &installer, &root).run(&stages)?;
            tracing::info!(stages = %ran.join(", "), "run complete");
        }
        Commands::Plan { stages } => {
            let graph = StageGraph::from_config(&config.stages)?;
            let plan = graph.plan(&stages)?;
            #[allow(clippy::print_stdout)]
            {
                for stage in plan {
                    println!("{}", stage.name);
                }
            }
        }
        Commands::Status { json } => {
            let statuses = installer.status()?;
            if json {
                let rendered = serde_json::to_string_pretty(&statuses)
                    .context("Failed to render hook status")?;
                #[allow(clippy::print_stdout)]
                {
                    println!("{}", rendered);
                }
            } else {
                #[allow(clippy::print_stdout)]
                {
                    for status in &statuses {
                        println!(
                            "{:<12} {}",
                            state_label(status.state),
                            status.destination.display()
                        );
                    }
                }
            }

            let stale = statuses
                .iter()
                .filter(|s| s.state != HookState::Current)
                .count();
            if stale > 0 {
                bail!("{} hook(s) not current; run `hookstage install`", stale);
            }
        }
    }

    Ok(())
}

fn state_label(state: HookState) -> &'static str {
    match state {
        HookState::Current => "current",
        HookState::Missing => "missing",
        HookState::Outdated => "outdated",
        HookState::WrongMode => "wrong-mode",
    }
}

/// An explicit root wins; otherwise walk up from the working directory.
fn resolve_root(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(root) = explicit {
        if !root.is_dir() {
            bail!("Repository root {} is not a directory", root.display());
        }
        return Ok(root.to_path_buf());
    }

    let cwd = std::env::current_dir().context("Failed to read working directory")?;
    Ok(repo::find_repo_root(&cwd).unwrap_or(cwd))
}
