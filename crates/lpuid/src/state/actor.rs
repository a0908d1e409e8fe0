//! State actor - owns the call state machine and processes commands.
//!
//! The StateActor is the single owner of registration and call state. The
//! monitor loop and every control request reach the machine through its
//! command channel, so transitions are applied one at a time and the
//! notifications they produce leave in the order they happened.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Response send failures are ignored (the caller gave up waiting)

use std::sync::Arc;

use lpui_core::{CallStateMachine, NotificationEvent, NotificationSink};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::commands::{StateCommand, StateSnapshot};

/// The state actor.
///
/// Every event the machine produces is handed to the sink *before* the
/// command is answered, so a caller that awaits its reply can rely on the
/// notification already being on its way.
pub struct StateActor {
    receiver: mpsc::Receiver<StateCommand>,
    machine: CallStateMachine,
    sink: Arc<dyn NotificationSink>,
}

impl StateActor {
    /// Creates an actor in the start state (unregistered, no call).
    pub fn new(receiver: mpsc::Receiver<StateCommand>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            receiver,
            machine: CallStateMachine::new(),
            sink,
        }
    }

    /// Runs the actor loop until every handle has been dropped.
    pub async fn run(mut self) {
        info!("State actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(
            registered = self.machine.is_registered(),
            call = %self.machine.call().phase(),
            "State actor stopped"
        );
    }

    fn handle_command(&mut self, cmd: StateCommand) {
        match cmd {
            StateCommand::ApplyRegistration {
                fact,
                force,
                respond_to,
            } => {
                let event = self.machine.apply_registration(fact, force);
                self.publish(&event);
                let _ = respond_to.send(event);
            }
            StateCommand::ApplyCall { fact, respond_to } => {
                let event = self.machine.apply_call(fact);
                self.publish(&event);
                let _ = respond_to.send(event);
            }
            StateCommand::GetSnapshot { respond_to } => {
                let _ = respond_to.send(StateSnapshot {
                    registration: self.machine.registration(),
                    call: self.machine.call().clone(),
                });
            }
            StateCommand::Resync { respond_to } => {
                let _ = respond_to.send(self.machine.resync_events());
            }
        }
    }

    fn publish(&self, event: &Option<NotificationEvent>) {
        if let Some(event) = event {
            debug!(?event, "Publishing notification");
            self.sink.notify(event.clone());
        }
    }
}
