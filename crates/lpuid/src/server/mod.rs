//! Unix socket bus server for the LinphoneUI daemon.
//!
//! The server:
//! - Listens on a Unix socket for front-end and CLI connections
//! - Spawns a ConnectionHandler for each client
//! - Broadcasts state-change signals to subscribed clients
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   DaemonServer  │
//! │                 │
//! │  UnixListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  Orchestrator   │
//! │   (per client)  │     │ (control calls) │
//! └─────────────────┘     └─────────────────┘
//!         ▲
//!         │ signals (from EventBus)
//! ┌─────────────────┐
//! │   Broadcaster   │──▶ Subscribers (one slot per connection)
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Server errors are logged and allow continued operation

mod connection;
mod subscribers;

pub use connection::{ConnectionError, ConnectionHandler};
pub use subscribers::{SignalWriter, Subscribers, SubscribersFull};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::UnixListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::orchestrator::Orchestrator;
use crate::state::EventBus;

/// Default socket path
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/lpui.sock";

/// Maximum number of concurrent signal subscribers
pub const MAX_SUBSCRIBERS: usize = 10;

/// Unix socket server for the daemon.
pub struct DaemonServer {
    socket_path: PathBuf,

    /// Control surface shared with the monitor loop
    orchestrator: Arc<Orchestrator>,

    /// Source of state-change notifications
    bus: EventBus,

    cancel_token: CancellationToken,

    /// Numbers connections; also names clients that send no id
    connection_counter: AtomicU64,

    subscribers: Subscribers,
}

impl DaemonServer {
    pub fn new(
        socket_path: impl Into<PathBuf>,
        orchestrator: Arc<Orchestrator>,
        bus: EventBus,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            orchestrator,
            bus,
            cancel_token,
            connection_counter: AtomicU64::new(0),
            subscribers: Subscribers::with_capacity(MAX_SUBSCRIBERS),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Serves connections until the cancellation token fires, then removes
    /// the socket.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = bind_socket(&self.socket_path).map_err(|e| ServerError::SocketSetup {
            path: self.socket_path.clone(),
            error: e.to_string(),
        })?;
        info!(socket = %self.socket_path.display(), "Bus server listening");

        self.spawn_event_broadcaster();

        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, _)) => {
                    let n = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                    self.handle_connection(stream, n);
                }
                Err(e) => error!(error = %e, "Failed to accept connection"),
            }
        }

        info!("Server shutdown requested");
        self.cleanup().await;
        Ok(())
    }

    /// Handles a new client connection by spawning a handler task.
    fn handle_connection(&self, stream: tokio::net::UnixStream, connection_number: u64) {
        let (reader, writer) = stream.into_split();
        let handler = ConnectionHandler::new(
            reader,
            writer,
            Arc::clone(&self.orchestrator),
            self.subscribers.clone(),
            connection_number,
        );

        tokio::spawn(handler.run());
    }

    /// Spawns the task forwarding bus events to all subscribers.
    fn spawn_event_broadcaster(&self) {
        let mut event_rx = self.bus.subscribe();
        let subscribers = self.subscribers.clone();
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Event broadcaster shutting down");
                        break;
                    }

                    result = event_rx.recv() => {
                        match result {
                            Ok(event) => subscribers.broadcast(&event).await,
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "Event broadcaster lagged, skipped events");
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                debug!("Event channel closed");
                                break;
                            }
                        }
                    }
                }
            }
        });
    }

    /// Returns the number of active subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.len().await
    }

    async fn cleanup(&self) {
        self.subscribers.clear().await;

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(
                    socket = %self.socket_path.display(),
                    error = %e,
                    "Failed to remove socket file"
                );
            }
        }

        info!("Server cleanup complete");
    }
}

/// Binds `path`, replacing a socket left by a previous run and creating
/// missing parent directories.
fn bind_socket(path: &Path) -> std::io::Result<UnixListener> {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(socket = %path.display(), "Removed stale socket"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    UnixListener::bind(path)
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to setup socket at {path}: {error}")]
    SocketSetup { path: PathBuf, error: String },

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
}
