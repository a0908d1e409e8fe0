//! Commands and errors for the state actor.

use lpui_core::{CallFact, CallRecord, NotificationEvent, RegistrationFact, RegistrationState};
use thiserror::Error;
use tokio::sync::oneshot;

/// Commands sent to the [`StateActor`](super::StateActor) via mpsc channel.
///
/// Each command that produces a result carries a oneshot sender for the
/// response. Applying a fact answers with the event it produced, after the
/// event has been handed to the notification sink.
#[derive(Debug)]
pub enum StateCommand {
    /// Apply a sampled registration fact.
    ApplyRegistration {
        fact: RegistrationFact,
        /// Emit even when the value did not change
        force: bool,
        respond_to: oneshot::Sender<Option<NotificationEvent>>,
    },

    /// Apply the call fact from one sample (`None` = no call observed).
    ApplyCall {
        fact: Option<CallFact>,
        respond_to: oneshot::Sender<Option<NotificationEvent>>,
    },

    /// Read the current registration and call state.
    GetSnapshot {
        respond_to: oneshot::Sender<StateSnapshot>,
    },

    /// Events describing the current state from scratch, for a new subscriber.
    Resync {
        respond_to: oneshot::Sender<Vec<NotificationEvent>>,
    },
}

/// Point-in-time copy of the durable state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateSnapshot {
    pub registration: RegistrationState,
    pub call: CallRecord,
}

impl StateSnapshot {
    pub fn is_registered(&self) -> bool {
        self.registration.registered
    }
}

/// Errors that can occur talking to the state actor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// The actor has shut down.
    #[error("state actor channel closed")]
    ChannelClosed,
}
