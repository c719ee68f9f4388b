// plid node entry point
// One binary, three roles: beacon, miner, relay

mod beacon;
mod config;
mod handlers;
mod miner;
mod relay;
mod server;
mod sync;

use clap::{Args, Parser, Subcommand};
use config::{ConfigError, NodeConfig, Role};
use std::fs;
use std::path::PathBuf;
use std::process;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const CONFIG_FILE: &str = "config.json";

#[derive(Parser, Debug)]
#[command(name = "plid", version, about = "Proof-of-stake ledger node")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the beacon: the network's source of truth
    Beacon(RoleArgs),
    /// Run a miner: produces blocks when elected slot leader
    Miner(RoleArgs),
    /// Run a relay: mirrors the beacon and serves reads
    Relay(RoleArgs),
}

#[derive(Args, Debug)]
struct RoleArgs {
    /// Work directory holding config.json, data/ and archive/
    #[arg(short = 'd', long = "work-dir")]
    work_dir: PathBuf,

    /// Create the work directory and a default config.json
    #[arg(long)]
    init: bool,

    /// Configuration file (default: <work-dir>/config.json)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[derive(Debug, Error)]
enum NodeError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Runtime(#[from] anyhow::Error),
}

impl NodeError {
    fn exit_code(&self) -> i32 {
        match self {
            NodeError::Config(_) => 1,
            NodeError::Runtime(_) => 2,
        }
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            process::exit(1);
        }
    };

    let (role, args) = match cli.command {
        Command::Beacon(args) => (Role::Beacon, args),
        Command::Miner(args) => (Role::Miner, args),
        Command::Relay(args) => (Role::Relay, args),
    };

    if let Err(err) = run(role, args) {
        eprintln!("Error: {err}");
        process::exit(err.exit_code());
    }
}

fn run(role: Role, args: RoleArgs) -> Result<(), NodeError> {
    if args.init {
        init_work_dir(role, &args)?;
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| args.work_dir.join(CONFIG_FILE));
    let mut config = NodeConfig::load(&config_path)?;
    if config.genesis_time == 0 {
        config.genesis_time = chrono::Utc::now().timestamp();
    }
    config.validate(role)?;

    let _log_guard = init_logging(&args.work_dir, role, args.debug).map_err(NodeError::Runtime)?;
    info!(role = role.name(), work_dir = %args.work_dir.display(), "starting node");

    let result = match role {
        Role::Beacon => beacon::run(&args.work_dir, config),
        Role::Miner => miner::run(&args.work_dir, config),
        Role::Relay => relay::run(&args.work_dir, config),
    };
    result.map_err(NodeError::Runtime)
}

/// Create the work-dir skeleton and a default config for the role.
fn init_work_dir(role: Role, args: &RoleArgs) -> Result<(), ConfigError> {
    fs::create_dir_all(&args.work_dir)?;
    fs::create_dir_all(args.work_dir.join("data"))?;
    fs::create_dir_all(args.work_dir.join("archive"))?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| args.work_dir.join(CONFIG_FILE));
    if config_path.exists() {
        return Ok(());
    }

    let mut config = NodeConfig::default();
    config.genesis_time = chrono::Utc::now().timestamp();
    match role {
        Role::Beacon => {}
        Role::Miner => {
            config.miner_id = "miner1".to_string();
            config.stake = 1_000_000;
            config.beacons = vec![format!("localhost:{}", Role::Beacon.default_port())];
        }
        Role::Relay => {
            config.beacons = vec![format!("localhost:{}", Role::Beacon.default_port())];
        }
    }
    config.save(&config_path)?;
    eprintln!("Initialized {} work dir at {}", role.name(), args.work_dir.display());
    Ok(())
}

/// Console output plus a per-role log file in the work dir.
fn init_logging(
    work_dir: &std::path::Path,
    role: Role,
    debug: bool,
) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let file_appender =
        tracing_appender::rolling::never(work_dir, format!("{}.log", role.name()));
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();
    Ok(guard)
}
