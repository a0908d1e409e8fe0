//! Call facts, call phases, and the durable call record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DomainError, DomainResult};

/// Identity stored for a call whose peer could not be read.
pub const UNKNOWN_IDENTITY: &str = "Unknown";

// ============================================================================
// Facts
// ============================================================================

/// Phase of a call line as reported by `linphonecsh generic calls`.
///
/// `Unknown` covers status tokens outside the configured vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactPhase {
    Incoming,
    Outgoing,
    Active,
    Unknown,
}

/// One call observed during a single poll.
///
/// The tool is expected to report at most one call of interest per sample,
/// so a poll yields either one fact or none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFact {
    /// Tool-assigned call id (first column of the calls listing)
    pub call_id: String,

    /// Peer description as printed by the tool, e.g. `"Alice" <sip:alice@host>`
    pub raw_peer: String,

    /// User part extracted from `raw_peer`
    pub extracted_identity: String,

    pub phase: FactPhase,
}

impl CallFact {
    /// Creates a new fact.
    pub fn new(
        call_id: impl Into<String>,
        raw_peer: impl Into<String>,
        extracted_identity: impl Into<String>,
        phase: FactPhase,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            raw_peer: raw_peer.into(),
            extracted_identity: extracted_identity.into(),
            phase,
        }
    }

    /// Creates the synthetic fact fed in after a successful dial, so the
    /// outgoing transition is visible before the next poll.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::EmptyIdentity` if `identity` is blank.
    pub fn outgoing(identity: &str) -> DomainResult<Self> {
        let identity = identity.trim();
        if identity.is_empty() {
            return Err(DomainError::EmptyIdentity);
        }
        Ok(Self::new("", identity, identity, FactPhase::Outgoing))
    }
}

// ============================================================================
// Call Phase
// ============================================================================

/// Phase of the durable call record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPhase {
    #[default]
    None,
    Incoming,
    Outgoing,
    Active,
}

impl CallPhase {
    /// Maps a fact phase onto a record phase.
    ///
    /// Returns `None` for [`FactPhase::Unknown`]: an undeterminable phase
    /// counts as "no call observed".
    pub fn from_fact(phase: FactPhase) -> Option<Self> {
        match phase {
            FactPhase::Incoming => Some(Self::Incoming),
            FactPhase::Outgoing => Some(Self::Outgoing),
            FactPhase::Active => Some(Self::Active),
            FactPhase::Unknown => None,
        }
    }

    /// Returns true while a call is in progress.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Short label used in call summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
            Self::Active => "active",
        }
    }

    /// Signal raised when a call enters this phase.
    ///
    /// Leaving a call is reported as [`CallSignal::Ended`].
    pub fn signal(&self) -> CallSignal {
        match self {
            Self::None => CallSignal::Ended,
            Self::Incoming => CallSignal::Incoming,
            Self::Outgoing => CallSignal::Outgoing,
            Self::Active => CallSignal::Connected,
        }
    }
}

impl fmt::Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ============================================================================
// Call Signal
// ============================================================================

/// The `state` argument of the `call_state_changed` signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallSignal {
    Incoming,
    Outgoing,
    Connected,
    Ended,
}

impl CallSignal {
    /// Wire token understood by the front-end.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
            Self::Connected => "connected",
            Self::Ended => "ended",
        }
    }
}

impl fmt::Display for CallSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallSignal {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incoming" => Ok(Self::Incoming),
            "outgoing" => Ok(Self::Outgoing),
            "connected" => Ok(Self::Connected),
            "ended" => Ok(Self::Ended),
            other => Err(DomainError::UnknownCallState {
                value: other.to_string(),
            }),
        }
    }
}

// ============================================================================
// Call Record
// ============================================================================

/// Durable record of the call currently in progress, if any.
///
/// Fields are private so the invariants always hold:
/// - `active == phase.is_active()`
/// - `identity` is non-empty exactly when `active`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallRecord {
    active: bool,
    identity: String,
    phase: CallPhase,
}

impl CallRecord {
    /// The record when no call is in progress.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Creates a record for `phase`.
    ///
    /// A blank identity on an active call is stored as [`UNKNOWN_IDENTITY`];
    /// `CallPhase::None` always yields the idle record.
    pub fn new(phase: CallPhase, identity: impl Into<String>) -> Self {
        if !phase.is_active() {
            return Self::idle();
        }

        let identity = identity.into();
        let identity = if identity.trim().is_empty() {
            UNKNOWN_IDENTITY.to_string()
        } else {
            identity
        };

        Self {
            active: true,
            identity,
            phase,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn phase(&self) -> CallPhase {
        self.phase
    }

    /// Checks the record invariants.
    pub fn is_consistent(&self) -> bool {
        self.active == self.phase.is_active() && self.active != self.identity.is_empty()
    }

    /// Human-readable summary returned by `get_current_call_info`.
    pub fn summary(&self) -> String {
        if self.active {
            format!("Call: {} ({})", self.identity, self.phase)
        } else {
            "No active call".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_record_is_consistent() {
        let record = CallRecord::idle();
        assert!(!record.is_active());
        assert_eq!(record.phase(), CallPhase::None);
        assert_eq!(record.identity(), "");
        assert!(record.is_consistent());
    }

    #[test]
    fn test_active_record_with_blank_identity() {
        let record = CallRecord::new(CallPhase::Incoming, "  ");
        assert!(record.is_active());
        assert_eq!(record.identity(), UNKNOWN_IDENTITY);
        assert!(record.is_consistent());
    }

    #[test]
    fn test_none_phase_discards_identity() {
        let record = CallRecord::new(CallPhase::None, "alice");
        assert_eq!(record, CallRecord::idle());
    }

    #[test]
    fn test_summary() {
        assert_eq!(CallRecord::idle().summary(), "No active call");
        assert_eq!(
            CallRecord::new(CallPhase::Active, "1001").summary(),
            "Call: 1001 (active)"
        );
    }

    #[test]
    fn test_phase_signals() {
        assert_eq!(CallPhase::Incoming.signal(), CallSignal::Incoming);
        assert_eq!(CallPhase::Outgoing.signal(), CallSignal::Outgoing);
        assert_eq!(CallPhase::Active.signal(), CallSignal::Connected);
        assert_eq!(CallPhase::None.signal(), CallSignal::Ended);
    }

    #[test]
    fn test_unknown_fact_phase_has_no_record_phase() {
        assert_eq!(CallPhase::from_fact(FactPhase::Unknown), None);
        assert_eq!(
            CallPhase::from_fact(FactPhase::Active),
            Some(CallPhase::Active)
        );
    }

    #[test]
    fn test_call_signal_parsing() {
        assert_eq!("connected".parse::<CallSignal>(), Ok(CallSignal::Connected));
        assert!(matches!(
            "ringing".parse::<CallSignal>(),
            Err(DomainError::UnknownCallState { .. })
        ));
    }

    #[test]
    fn test_outgoing_fact_rejects_blank_identity() {
        assert_eq!(CallFact::outgoing(" "), Err(DomainError::EmptyIdentity));

        let fact = CallFact::outgoing("1002").unwrap();
        assert_eq!(fact.phase, FactPhase::Outgoing);
        assert_eq!(fact.extracted_identity, "1002");
    }
}
