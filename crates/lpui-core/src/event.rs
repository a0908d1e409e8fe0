//! Notifications raised toward the front-end.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::call::CallSignal;

/// A transition worth telling the front-end about.
///
/// At most one event is produced per state machine invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// Becomes the `registration_state_changed(registered)` signal
    RegistrationChanged { registered: bool },

    /// Becomes the `call_state_changed(state, identity)` signal.
    /// `identity` is empty for [`CallSignal::Ended`].
    CallChanged { signal: CallSignal, identity: String },
}

impl NotificationEvent {
    pub fn registration(registered: bool) -> Self {
        Self::RegistrationChanged { registered }
    }

    pub fn call(signal: CallSignal, identity: impl Into<String>) -> Self {
        Self::CallChanged {
            signal,
            identity: identity.into(),
        }
    }

    pub fn call_ended() -> Self {
        Self::call(CallSignal::Ended, "")
    }
}

/// Receiver of notification events.
///
/// Implementations forward events toward the bus transport; they must not
/// block, since they are called from the task that owns call state.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: NotificationEvent);
}

/// Sink that keeps every event in memory, in emission order.
///
/// Handy for tests and for inspecting a reconciliation run without a bus.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns and clears the recorded events.
    pub fn take(&self) -> Vec<NotificationEvent> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, event: NotificationEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
