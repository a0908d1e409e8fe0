//! Handle for talking to the state actor.

use lpui_core::{CallFact, CallRecord, NotificationEvent, RegistrationFact};
use tokio::sync::{mpsc, oneshot};

use super::commands::{StateCommand, StateError, StateSnapshot};

/// Cloneable handle to the [`StateActor`](super::StateActor).
///
/// Every method sends one command and awaits its reply. Once the actor has
/// stopped, methods return [`StateError::ChannelClosed`].
#[derive(Clone)]
pub struct StateHandle {
    sender: mpsc::Sender<StateCommand>,
}

impl StateHandle {
    pub fn new(sender: mpsc::Sender<StateCommand>) -> Self {
        Self { sender }
    }

    /// Applies a registration fact; returns the event it produced, if any.
    pub async fn apply_registration(
        &self,
        fact: RegistrationFact,
        force: bool,
    ) -> Result<Option<NotificationEvent>, StateError> {
        let (tx, rx) = oneshot::channel();
        self.send(StateCommand::ApplyRegistration {
            fact,
            force,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| StateError::ChannelClosed)
    }

    /// Applies a call fact; returns the event it produced, if any.
    pub async fn apply_call(
        &self,
        fact: Option<CallFact>,
    ) -> Result<Option<NotificationEvent>, StateError> {
        let (tx, rx) = oneshot::channel();
        self.send(StateCommand::ApplyCall {
            fact,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| StateError::ChannelClosed)
    }

    pub async fn snapshot(&self) -> Result<StateSnapshot, StateError> {
        let (tx, rx) = oneshot::channel();
        self.send(StateCommand::GetSnapshot { respond_to: tx })
            .await?;
        rx.await.map_err(|_| StateError::ChannelClosed)
    }

    /// Cached registration state.
    pub async fn is_registered(&self) -> Result<bool, StateError> {
        Ok(self.snapshot().await?.is_registered())
    }

    /// Current call record.
    pub async fn call(&self) -> Result<CallRecord, StateError> {
        Ok(self.snapshot().await?.call)
    }

    /// Events that bring a fresh subscriber up to date.
    pub async fn resync(&self) -> Result<Vec<NotificationEvent>, StateError> {
        let (tx, rx) = oneshot::channel();
        self.send(StateCommand::Resync { respond_to: tx }).await?;
        rx.await.map_err(|_| StateError::ChannelClosed)
    }

    /// Check if the actor is still running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }

    async fn send(&self, cmd: StateCommand) -> Result<(), StateError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| StateError::ChannelClosed)
    }
}
