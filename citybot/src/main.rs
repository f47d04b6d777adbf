//! citybot CLI.
//!
//! `init` writes a default `citybot.toml`, `validate` checks it, `run` drives
//! the configured instances, and `status` prints the persisted progress of
//! every instance as JSON.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use citybot::console;
use citybot::control::{PauseControl, StatusBoard, StatusSnapshot, spawn_reporter};
use citybot::exit_codes;
use citybot::instance::{InstanceLoop, InstanceSettings, LoopExit, Runtime};
use citybot::io::clock::SystemClock;
use citybot::io::config::{
    BotConfig, DEFAULT_CONFIG_PATH, InstanceConfig, load_config, write_config,
};
use citybot::io::detector::CommandDetector;
use citybot::io::device::AdbDevice;
use citybot::io::state_store::JsonStateStore;
use citybot::logging;

#[derive(Parser)]
#[command(
    name = "citybot",
    version,
    about = "Detection-driven city builder automation"
)]
struct Cli {
    /// Path to the TOML config.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Load and validate the config.
    Validate,
    /// Run the configured instances until `q` or the cycle limit.
    Run {
        /// Run only this instance.
        #[arg(long)]
        instance: Option<String>,
        /// Stop each instance after this many gameplay iterations.
        #[arg(long)]
        max_cycles: Option<u64>,
    },
    /// Print persisted instance progress as JSON.
    Status,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Validate => cmd_validate(&cli.config),
        Command::Run {
            instance,
            max_cycles,
        } => cmd_run(&cli.config, instance.as_deref(), max_cycles),
        Command::Status => cmd_status(&cli.config),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        println!("{} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &BotConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_validate(path: &Path) -> Result<i32> {
    let config = load_config(path)?;
    println!(
        "{} is valid ({} instance(s))",
        path.display(),
        config.instances.len()
    );
    Ok(exit_codes::OK)
}

fn cmd_status(path: &Path) -> Result<i32> {
    let config = load_config(path)?;
    let store = JsonStateStore::new(&config.global.state_dir);
    let snapshots: Vec<StatusSnapshot> = store
        .load_all()?
        .iter()
        .map(|state| StatusSnapshot::from_state(state, 0))
        .collect();
    let payload = serde_json::to_string_pretty(&snapshots).context("serialize status")?;
    println!("{payload}");
    Ok(exit_codes::OK)
}

fn cmd_run(path: &Path, only: Option<&str>, max_cycles: Option<u64>) -> Result<i32> {
    let config = load_config(path)?;
    let selected: Vec<(&String, &InstanceConfig)> = match only {
        Some(id) => {
            let (key, instance) = config
                .instances
                .get_key_value(id)
                .with_context(|| format!("instance {id:?} is not configured"))?;
            vec![(key, instance)]
        }
        None => config.instances.iter().collect(),
    };

    let store = JsonStateStore::new(&config.global.state_dir);
    let control = Arc::new(PauseControl::new());
    let board = Arc::new(StatusBoard::new());
    let reporter = spawn_reporter(
        Arc::clone(&board),
        Arc::clone(&control),
        config.global.report_interval(),
    );
    // Never joined: blocks on stdin until the process exits.
    console::spawn_console(Arc::clone(&control), Arc::clone(&board));
    println!("{}", console::HELP);
    info!(instances = selected.len(), "starting");

    let results: Vec<(String, Result<LoopExit>)> = thread::scope(|scope| {
        let handles: Vec<_> = selected
            .iter()
            .map(|&(id, instance)| {
                let (config, store, control, board) = (&config, &store, &*control, &*board);
                let handle = scope.spawn(move || {
                    run_instance(config, id, instance, store, control, board, max_cycles)
                });
                (id.clone(), handle)
            })
            .collect();
        handles
            .into_iter()
            .map(|(id, handle)| {
                let result = handle
                    .join()
                    .unwrap_or_else(|_| Err(anyhow!("instance thread panicked")));
                (id, result)
            })
            .collect()
    });

    control.request_shutdown();
    if reporter.join().is_err() {
        warn!("status reporter panicked");
    }

    let mut code = exit_codes::OK;
    for (id, result) in results {
        match result {
            Ok(exit) => info!(instance = %id, exit = ?exit, "instance finished"),
            Err(err) => {
                error!(instance = %id, err = %format!("{err:#}"), "instance failed");
                code = exit_codes::INVALID;
            }
        }
    }
    Ok(code)
}

fn run_instance(
    config: &BotConfig,
    id: &str,
    instance: &InstanceConfig,
    store: &JsonStateStore,
    control: &PauseControl,
    board: &StatusBoard,
    max_cycles: Option<u64>,
) -> Result<LoopExit> {
    let device = AdbDevice::new(
        &config.device.adb_path,
        &instance.device_id,
        &config.device.package,
        Duration::from_secs(config.device.command_timeout_secs),
    );
    let detector = CommandDetector::new(
        config.vision.command.clone(),
        Duration::from_secs(config.vision.timeout_secs),
    );
    let clock = SystemClock;
    let runtime = Runtime {
        device: &device,
        detector: &detector,
        clock: &clock,
        store,
        control,
        board,
    };
    let settings = InstanceSettings::from_config(config, instance);
    let mut instance_loop = InstanceLoop::load(runtime, settings, id, &instance.device_id)
        .with_context(|| format!("load state for instance {id}"))?;
    Ok(instance_loop.run(max_cycles))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["citybot", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false }));
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["citybot", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn parse_run_options() {
        let cli = Cli::parse_from([
            "citybot",
            "run",
            "--config",
            "bots.toml",
            "--instance",
            "farm-1",
            "--max-cycles",
            "5",
        ]);
        assert_eq!(cli.config, PathBuf::from("bots.toml"));
        match cli.command {
            Command::Run {
                instance,
                max_cycles,
            } => {
                assert_eq!(instance.as_deref(), Some("farm-1"));
                assert_eq!(max_cycles, Some(5));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn init_then_validate() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("citybot.toml");
        assert_eq!(cmd_init(&path, false).expect("init"), exit_codes::OK);
        assert!(path.exists());
        assert_eq!(cmd_validate(&path).expect("validate"), exit_codes::OK);
    }

    #[test]
    fn unknown_instance_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("citybot.toml");
        cmd_init(&path, false).expect("init");
        let err = cmd_run(&path, Some("nope"), Some(1)).expect_err("unknown instance");
        assert!(format!("{err:#}").contains("not configured"));
    }
}
