//! `lpui` command line.
//!
//! Each subcommand maps to one bus method; `watch` subscribes and prints
//! signals until the daemon goes away or Ctrl-C.
//!
//! ```text
//! lpui call 1001          # dial
//! lpui hangup
//! lpui status             # registration status text
//! lpui watch              # stream signals
//! ```

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use lpui_protocol::{ControlRequest, DaemonMessage, ReplyValue};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::client::BusClient;

/// Socket used when neither `--socket` nor `LPUI_SOCKET` is set.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/lpui.sock";

/// Environment variable naming the daemon socket.
pub const SOCKET_ENV: &str = "LPUI_SOCKET";

// ============================================================================
// CLI Arguments
// ============================================================================

/// Control client for the LinphoneUI bridge daemon
#[derive(Parser, Debug)]
#[command(name = "lpui")]
#[command(about = "Place, answer and inspect calls through lpuid")]
#[command(version)]
struct Args {
    /// Daemon socket path (defaults to $LPUI_SOCKET, then /tmp/lpui.sock)
    #[arg(long, short = 's', global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dial a number or SIP URI
    Call { identity: String },
    /// Terminate the current call
    Hangup,
    /// Accept the incoming call
    Answer,
    /// Re-check registration now (always re-emits the signal)
    Check,
    /// Print the registration status text
    Status,
    /// Print whether the account is registered
    Registered,
    /// Print the current call
    Info,
    /// Restart linphonecsh
    Restart,
    /// Print signals as they arrive
    Watch,
}

impl Command {
    fn request(&self) -> Option<ControlRequest> {
        let request = match self {
            Self::Call { identity } => ControlRequest::MakeCall {
                identity: identity.clone(),
            },
            Self::Hangup => ControlRequest::HangUp,
            Self::Answer => ControlRequest::AnswerCall,
            Self::Check => ControlRequest::CheckRegistrationStatus,
            Self::Status => ControlRequest::GetRegistrationStatus,
            Self::Registered => ControlRequest::IsRegistered,
            Self::Info => ControlRequest::GetCurrentCallInfo,
            Self::Restart => ControlRequest::RestartLinphone,
            Self::Watch => return None,
        };
        Some(request)
    }
}

/// Resolves the socket path: flag, then environment, then default.
fn socket_path(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| std::env::var_os(SOCKET_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH))
}

/// Renders a signal as one line of `watch` output.
pub fn format_signal(message: &DaemonMessage) -> Option<String> {
    match message {
        DaemonMessage::RegistrationStateChanged { registered } => {
            Some(format!("registration {registered}"))
        }
        DaemonMessage::CallStateChanged { state, identity } if identity.is_empty() => {
            Some(format!("call {state}"))
        }
        DaemonMessage::CallStateChanged { state, identity } => {
            Some(format!("call {state} {identity}"))
        }
        _ => None,
    }
}

// ============================================================================
// Entry Point
// ============================================================================

/// Parses arguments and runs the requested command.
pub fn run() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(execute(socket_path(args.socket), args.command))
}

async fn execute(socket: PathBuf, command: Command) -> Result<()> {
    debug!(socket = %socket.display(), ?command, "Connecting");
    let mut client = BusClient::connect(&socket, Some(format!("lpui-{}", std::process::id()))).await?;

    let Some(request) = command.request() else {
        return watch(client).await;
    };

    let method = request.method_name();
    let reply = client.call(request).await?;
    client.disconnect().await?;

    match reply {
        ReplyValue::Text(text) => println!("{text}"),
        ReplyValue::Bool(value) => {
            println!("{value}");
            // Commands report failure through the exit status as well
            if !value && method != ControlRequest::IsRegistered.method_name() {
                bail!("{method} failed");
            }
        }
    }
    Ok(())
}

async fn watch(mut client: BusClient) -> Result<()> {
    client.subscribe().await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            signal = client.next_signal() => match signal? {
                Some(message) => {
                    if let Some(line) = format_signal(&message) {
                        println!("{line}");
                    }
                }
                None => bail!("Daemon closed the connection"),
            },
        }
    }
    Ok(())
}
