//! SIP registration state.

use serde::{Deserialize, Serialize};

/// Registration status reported by the tool at one sampling instant.
pub type RegistrationFact = bool;

/// Durable registration state owned by the state machine.
///
/// Starts unregistered and is only ever changed by applying a
/// [`RegistrationFact`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationState {
    pub registered: bool,
}

impl RegistrationState {
    /// Stores a new fact and returns the previous value.
    pub fn replace(&mut self, fact: RegistrationFact) -> bool {
        std::mem::replace(&mut self.registered, fact)
    }
}
