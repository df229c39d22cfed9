//! Camfleet Daemon - camera fleet coordinator
//!
//! This binary runs as a background daemon, accepting camera registrations
//! and heartbeats over TCP and supervising one stream worker per camera.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! camfleetd start
//!
//! # Start the daemon (background/daemonized)
//! camfleetd start -d
//!
//! # Start with a config file and an overridden bind address
//! camfleetd start --config /etc/camfleet.toml --host 0.0.0.0 --port 12345
//!
//! # Stop the daemon
//! camfleetd stop
//!
//! # Check daemon status
//! camfleetd status
//!
//! # Enable debug logging
//! RUST_LOG=camfleetd=debug camfleetd start
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown (stop accepting, close sessions,
//!   stop every worker, drain the snapshot queue)

use std::env;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use camfleet_core::FleetConfig;
use camfleetd::announce::Announcer;
use camfleetd::registry::spawn_registry;
use camfleetd::server::FleetServer;
use camfleetd::snapshot::SnapshotWriter;
use camfleetd::supervisor::WorkerSupervisor;

/// camfleet daemon - camera fleet coordinator
#[derive(Parser, Debug)]
#[command(name = "camfleetd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        /// Path to the TOML config file (or $CAMFLEET_CONFIG)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the configured bind host
        #[arg(long)]
        host: Option<String>,

        /// Override the configured bind port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
}

fn pid_file_path() -> PathBuf {
    let state_dir = dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("camfleet");
    state_dir.join("camfleetd.pid")
}

fn log_file_path() -> PathBuf {
    let state_dir = dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("camfleet");
    state_dir.join("camfleetd.log")
}

fn read_pid() -> Option<u32> {
    let path = pid_file_path();
    let mut file = File::open(&path).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file() {
    let path = pid_file_path();
    let _ = fs::remove_file(path);
}

fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

fn is_daemon_running() -> Option<u32> {
    if let Some(pid) = read_pid() {
        if is_process_running(pid) {
            return Some(pid);
        }
        remove_pid_file();
    }
    None
}

fn stop_daemon(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let result = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {pid}");
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        config: None,
        host: None,
        port: None,
    });

    match command {
        Command::Start {
            daemon,
            config,
            host,
            port,
        } => {
            if let Some(pid) = is_daemon_running() {
                eprintln!("Daemon is already running (PID {pid})");
                eprintln!("Use 'camfleetd stop' to stop it first.");
                process::exit(1);
            }

            let config = load_config(config, host, port)?;

            if daemon {
                daemonize()?;
            }

            write_pid()?;

            let result = run_daemon(config);

            remove_pid_file();

            result
        }
        Command::Stop => {
            if let Some(pid) = is_daemon_running() {
                println!("Stopping daemon (PID {pid})...");
                stop_daemon(pid)?;

                for _ in 0..50 {
                    if !is_process_running(pid) {
                        println!("Daemon stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Daemon did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Daemon is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some(pid) = is_daemon_running() {
                println!("Daemon is running (PID {pid})");
                Ok(())
            } else {
                println!("Daemon is not running.");
                process::exit(1);
            }
        }
    }
}

/// Loads the config file (flag, then $CAMFLEET_CONFIG, then defaults) and
/// applies CLI bind overrides.
fn load_config(
    path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<FleetConfig> {
    let path = path.or_else(|| env::var("CAMFLEET_CONFIG").ok().map(PathBuf::from));

    let mut config = match path {
        Some(path) => FleetConfig::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => FleetConfig::default(),
    };

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    Ok(config)
}

fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = File::create(&log_path).context("Failed to create log file for stderr")?;

    let daemonize = Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr);

    daemonize.start().context("Failed to daemonize")?;

    Ok(())
}

/// Runs the daemon (async entry point).
#[tokio::main]
async fn run_daemon(config: FleetConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("camfleetd=info".parse()?)
                .add_directive("camfleet_core=info".parse()?)
                .add_directive("camfleet_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "camfleet daemon starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let registry = spawn_registry();
    info!("Device registry started");

    let snapshot_writer = config.snapshot.enabled.then(|| {
        info!(
            directory = %config.snapshot.directory.display(),
            every_n = config.snapshot.every_n_frames,
            "Snapshot writer started"
        );
        SnapshotWriter::spawn(&config.snapshot)
    });

    let frame_callback = snapshot_writer.as_ref().map(SnapshotWriter::callback);
    let supervisor = Arc::new(WorkerSupervisor::new(config.worker.clone(), frame_callback));

    let server = FleetServer::bind(config.clone(), registry, supervisor, cancel_token).await?;

    let announcer = if config.announce.enabled {
        let port = server.local_addr().map(|a| a.port()).unwrap_or(config.server.port);
        Announcer::publish(&config.announce, port)
    } else {
        Announcer::disabled()
    };

    server.run().await;

    // workers are gone; withdraw the advertisement and flush pending
    // snapshots before exiting
    announcer.withdraw().await;
    if let Some(writer) = snapshot_writer {
        writer.close().await;
    }

    info!("camfleet daemon stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
