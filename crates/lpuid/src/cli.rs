//! The `lpuid` command line.
//!
//! ```bash
//! # Start the daemon (foreground)
//! lpuid start
//!
//! # Start in the background, with an explicit config file
//! lpuid start -d --config ~/.config/lpui/lpuid.toml
//!
//! # Stop the daemon / check on it
//! lpuid stop
//! lpuid status
//!
//! # Custom socket path and debug logging
//! LPUI_SOCKET=/run/user/100000/lpui.sock RUST_LOG=lpuid=debug lpuid start
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown (stops polling, runs `linphonecsh exit`)

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lpui_linphone::{LinphoneCli, SystemRunner};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::DaemonConfig;
use crate::effects::CommandEffects;
use crate::monitor::spawn_monitor_task;
use crate::orchestrator::Orchestrator;
use crate::server::DaemonServer;
use crate::state::{spawn_state, EventBus};

/// LinphoneUI daemon - bridges linphonecsh to the LinphoneUI front-end
#[derive(Parser, Debug)]
#[command(name = "lpuid", version, about)]
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

        /// Config file (default: $XDG_CONFIG_HOME/lpui/lpuid.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
}

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("lpui")
}

fn pid_file_path() -> PathBuf {
    state_dir().join("lpuid.pid")
}

fn log_file_path() -> PathBuf {
    state_dir().join("lpuid.log")
}

fn read_pid() -> Option<u32> {
    let mut file = File::open(pid_file_path()).ok()?;
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
    let _ = fs::remove_file(pid_file_path());
}

fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

/// Returns the PID of a running daemon, removing a stale PID file.
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
    let pid = i32::try_from(pid).context("PID out of range")?;
    // SAFETY: kill(2) has no memory-safety preconditions.
    let result = unsafe { libc::kill(pid, libc::SIGTERM) };
    if result != 0 {
        bail!("Failed to send SIGTERM to process {pid}");
    }
    Ok(())
}

/// Entry point of the `lpuid` binary.
pub fn run() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        config: None,
    });

    match command {
        Command::Start { daemon, config } => {
            if let Some(pid) = is_daemon_running() {
                eprintln!("Daemon is already running (PID {pid})");
                eprintln!("Use 'lpuid stop' to stop it first.");
                process::exit(1);
            }

            // Fail before forking so config errors reach the terminal
            let config = DaemonConfig::load(config.as_deref()).context("Failed to load config")?;

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

                // linphonecsh exit runs during shutdown, allow for its timeout
                for _ in 0..100 {
                    if !is_process_running(pid) {
                        println!("Daemon stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Daemon did not stop within 10 seconds.");
                process::exit(1);
            } else {
                println!("Daemon is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some(pid) = is_daemon_running() {
                println!("Daemon is running (PID {pid})");

                let socket_path = DaemonConfig::load(None)
                    .map(|c| c.socket_path)
                    .unwrap_or_else(|_| DaemonConfig::default().socket_path);
                if socket_path.exists() {
                    println!("Socket: {}", socket_path.display());
                }

                Ok(())
            } else {
                println!("Daemon is not running.");
                process::exit(1);
            }
        }
    }
}

/// Forks into the background, sending stdout/stderr to the log file.
fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let open_log = || {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .context("Failed to open log file")
    };

    Daemonize::new()
        .working_directory("/")
        .stdout(open_log()?)
        .stderr(open_log()?)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

#[tokio::main]
async fn run_daemon(config: DaemonConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("lpuid=info".parse()?)
                .add_directive("lpui_core=info".parse()?)
                .add_directive("lpui_linphone=info".parse()?)
                .add_directive("lpui_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "LinphoneUI daemon starting"
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

    let bus = EventBus::new();
    let state = spawn_state(Arc::new(bus.clone()));
    info!("State actor started");

    let runner = Arc::new(SystemRunner::new());
    let linphone = LinphoneCli::new(runner.clone(), config.linphone.clone());
    let effects = Arc::new(CommandEffects::new(
        runner,
        config.frontend.clone(),
        config.audio.clone(),
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        linphone,
        config.vocabulary.clone(),
        state,
        effects,
    ));

    let monitor = spawn_monitor_task(
        Arc::clone(&orchestrator),
        config.poll_interval(),
        cancel_token.clone(),
    );

    let server = DaemonServer::new(
        &config.socket_path,
        Arc::clone(&orchestrator),
        bus,
        cancel_token.clone(),
    );
    info!(socket = %config.socket_path.display(), "Starting server");

    let served = server.run().await;
    if served.is_err() {
        // Stop polling too; the daemon is unreachable without its socket
        cancel_token.cancel();
    }

    if let Err(e) = monitor.await {
        error!(error = %e, "Monitor task failed");
    }
    orchestrator.stop_tool().await;

    if let Err(e) = served {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("LinphoneUI daemon stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
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

    Ok(())
}
