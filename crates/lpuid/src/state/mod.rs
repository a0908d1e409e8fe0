//! Call and registration state using the Actor pattern.
//!
//! The state actor is the serialization boundary for the call state
//! machine: the monitor loop and concurrent control requests all send it
//! commands, and it applies them one at a time.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                       ┌─────────────────┐     ┌──────────────────┐
//! │  Monitor loop   │──┐  StateCommand      │   StateActor    │────▶│     EventBus     │
//! └─────────────────┘  ├──(mpsc channel)───▶│ CallStateMachine│     │   (broadcast)    │
//! ┌─────────────────┐  │                    └─────────────────┘     └────────┬─────────┘
//! │ Control requests│──┘                                                     │
//! └─────────────────┘                                                        ▼
//!                                                                   Subscribed clients
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - Channel operations handle closure gracefully

use std::sync::Arc;

use lpui_core::{NotificationEvent, NotificationSink};
use tokio::sync::{broadcast, mpsc};
use tracing::{info_span, trace, Instrument};

mod actor;
mod commands;
mod handle;

pub use actor::StateActor;
pub use commands::{StateCommand, StateError, StateSnapshot};
pub use handle::StateHandle;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 64;

/// Spawns the state actor and returns a handle to it.
///
/// Events produced by the state machine are handed to `sink` in the order
/// the transitions happened.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use lpuid::state::{spawn_state, EventBus};
///
/// #[tokio::main]
/// async fn main() {
///     let bus = EventBus::new();
///     let state = spawn_state(Arc::new(bus.clone()));
///
///     let registered = state.is_registered().await;
/// }
/// ```
pub fn spawn_state(sink: Arc<dyn NotificationSink>) -> StateHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = StateActor::new(cmd_rx, sink);
    tokio::spawn(actor.run().instrument(info_span!("state")));

    StateHandle::new(cmd_tx)
}

/// Broadcast-backed [`NotificationSink`].
///
/// The server subscribes to it and forwards every event to its subscribed
/// clients. Clones share the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<NotificationEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for EventBus {
    fn notify(&self, event: NotificationEvent) {
        if self.sender.send(event).is_err() {
            trace!("No bus listeners, notification dropped");
        }
    }
}
