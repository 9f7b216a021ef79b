use anyhow::Result;
use clap::{Parser, Subcommand};
use edit_coordinator_lib::config::{self, ConfigLoader, CoordinatorConfig};
use edit_coordinator_lib::replay;
use edit_coordinator_lib::{EditCoordinator, NoopApplier};
use std::path::PathBuf;
use std::sync::Arc;

/// Edit Coordinator - ownership, conflicts and review navigation for concurrent agent edits
#[derive(Parser, Debug)]
#[command(name = "edit-coordinator")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project directory used for config discovery
    #[arg(long, global = true, env = "EDIT_COORDINATOR_PROJECT")]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a JSON replay script and print every event as one JSON line
    Replay {
        /// Path to the script
        script: PathBuf,
    },
    /// Inspect or create configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective config as TOML
    Show,
    /// Write the default config to the project directory
    Init,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let project = cli.project.as_deref();

    match cli.command {
        Command::Replay { script } => {
            let config = config::load_config(project)?;
            let script = replay::load_script(&script)?;
            let coordinator = EditCoordinator::new(&config, Arc::new(NoopApplier));

            let outcome = replay::run_script(&coordinator, &script);
            for envelope in &outcome.events {
                println!("{}", serde_json::to_string(envelope)?);
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "navigation": outcome.navigation,
                    "activeConflicts": outcome.active_conflicts,
                    "failures": outcome.failures,
                }))?
            );
        }
        Command::Config { action } => match action {
            ConfigAction::Show => {
                let config = config::load_config(project)?;
                let (global, project_path) = config::get_config_paths(project);
                log::info!(
                    "Config paths: global={:?} project={:?}",
                    global,
                    project_path
                );
                print!("{}", config::to_toml(&config)?);
            }
            ConfigAction::Init => {
                let dir = match project {
                    Some(dir) => dir.to_path_buf(),
                    None => std::env::current_dir()?,
                };
                let path = ConfigLoader::new()
                    .with_project_path(&dir)
                    .save_project(&CoordinatorConfig::default())?;
                println!("Wrote {}", path.display());
            }
        },
    }

    Ok(())
}
