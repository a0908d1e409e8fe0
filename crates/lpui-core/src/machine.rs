//! Call lifecycle state machine.
//!
//! ```text
//!            fact(phase)              fact(other phase / identity)
//!   None ──────────────────▶ Incoming ─────────────────────────▶ Active
//!    ▲                      Outgoing                                │
//!    │                      Active                                  │
//!    └──────────────── no fact (Ended, folds back to None) ◀────────┘
//! ```
//!
//! Notifications are edge-triggered: re-applying the fact that produced the
//! current record emits nothing, so a call that stays up for an hour does
//! not flood the bus once per poll.

use tracing::debug;

use crate::call::{CallFact, CallPhase, CallRecord};
use crate::event::NotificationEvent;
use crate::registration::{RegistrationFact, RegistrationState};

/// Owner of the durable registration and call state.
///
/// The machine performs no I/O and no locking; its owner serializes access.
#[derive(Debug, Default)]
pub struct CallStateMachine {
    registration: RegistrationState,
    call: CallRecord,
}

impl CallStateMachine {
    /// Creates a machine in the start state: unregistered, no call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a registration fact.
    ///
    /// Emits `RegistrationChanged` when the value flips, or unconditionally
    /// when `force` is set so a reconnecting front-end can re-sync.
    pub fn apply_registration(
        &mut self,
        fact: RegistrationFact,
        force: bool,
    ) -> Option<NotificationEvent> {
        let previous = self.registration.replace(fact);

        if previous == fact && !force {
            return None;
        }

        debug!(was = previous, now = fact, force, "Registration state emitted");
        Some(NotificationEvent::registration(fact))
    }

    /// Applies the call fact from one sample (`None` = no call observed).
    ///
    /// A fact whose phase is unknown is handled as if no call were observed,
    /// so an unrecognized status cannot keep a stale call alive.
    pub fn apply_call(&mut self, fact: Option<CallFact>) -> Option<NotificationEvent> {
        let next = fact.and_then(|fact| {
            CallPhase::from_fact(fact.phase).map(|phase| CallRecord::new(phase, fact.extracted_identity))
        });

        match next {
            None if !self.call.is_active() => None,
            None => {
                debug!(identity = %self.call.identity(), "Call ended");
                self.call = CallRecord::idle();
                Some(NotificationEvent::call_ended())
            }
            Some(record) if record == self.call => None,
            Some(record) => {
                debug!(
                    from = %self.call.phase(),
                    to = %record.phase(),
                    identity = %record.identity(),
                    "Call transition"
                );
                let event = NotificationEvent::call(record.phase().signal(), record.identity());
                self.call = record;
                Some(event)
            }
        }
    }

    /// Returns the cached registration state.
    pub fn is_registered(&self) -> bool {
        self.registration.registered
    }

    pub fn registration(&self) -> RegistrationState {
        self.registration
    }

    /// Returns the current call record.
    pub fn call(&self) -> &CallRecord {
        &self.call
    }

    /// Events that describe the current state from scratch.
    ///
    /// Sent to a subscriber when it attaches, before any live events.
    pub fn resync_events(&self) -> Vec<NotificationEvent> {
        let mut events = vec![NotificationEvent::registration(self.registration.registered)];
        if self.call.is_active() {
            events.push(NotificationEvent::call(
                self.call.phase().signal(),
                self.call.identity(),
            ));
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{CallSignal, FactPhase};

    fn fact(phase: FactPhase, identity: &str) -> Option<CallFact> {
        Some(CallFact::new(
            "1",
            format!("sip:{identity}@example.org"),
            identity,
            phase,
        ))
    }

    #[test]
    fn test_registration_edge_triggered() {
        let mut machine = CallStateMachine::new();

        assert_eq!(machine.apply_registration(false, false), None);
        assert_eq!(
            machine.apply_registration(true, false),
            Some(NotificationEvent::registration(true))
        );
        assert_eq!(machine.apply_registration(true, false), None);
        assert_eq!(
            machine.apply_registration(false, false),
            Some(NotificationEvent::registration(false))
        );
        assert!(!machine.is_registered());
    }

    #[test]
    fn test_forced_registration_always_emits() {
        let mut machine = CallStateMachine::new();

        assert_eq!(
            machine.apply_registration(true, true),
            Some(NotificationEvent::registration(true))
        );
        assert_eq!(
            machine.apply_registration(true, true),
            Some(NotificationEvent::registration(true))
        );
        assert_eq!(
            machine.apply_registration(false, true),
            Some(NotificationEvent::registration(false))
        );
    }

    #[test]
    fn test_same_fact_twice_notifies_once() {
        let mut machine = CallStateMachine::new();

        assert!(machine.apply_call(fact(FactPhase::Incoming, "1001")).is_some());
        assert_eq!(machine.apply_call(fact(FactPhase::Incoming, "1001")), None);
    }

    #[test]
    fn test_incoming_active_ended_lifecycle() {
        let mut machine = CallStateMachine::new();

        let events: Vec<_> = [
            fact(FactPhase::Incoming, "alice"),
            fact(FactPhase::Active, "alice"),
            None,
        ]
        .into_iter()
        .filter_map(|f| machine.apply_call(f))
        .collect();

        assert_eq!(
            events,
            vec![
                NotificationEvent::call(CallSignal::Incoming, "alice"),
                NotificationEvent::call(CallSignal::Connected, "alice"),
                NotificationEvent::call_ended(),
            ]
        );
        assert_eq!(machine.call(), &CallRecord::idle());
    }

    #[test]
    fn test_outgoing_to_active() {
        let mut machine = CallStateMachine::new();

        assert_eq!(
            machine.apply_call(fact(FactPhase::Outgoing, "1002")),
            Some(NotificationEvent::call(CallSignal::Outgoing, "1002"))
        );
        assert_eq!(
            machine.apply_call(fact(FactPhase::Active, "1002")),
            Some(NotificationEvent::call(CallSignal::Connected, "1002"))
        );
        assert_eq!(machine.call().phase(), CallPhase::Active);
    }

    #[test]
    fn test_identity_change_notifies() {
        let mut machine = CallStateMachine::new();

        machine.apply_call(fact(FactPhase::Active, "1001"));
        assert_eq!(
            machine.apply_call(fact(FactPhase::Active, "1003")),
            Some(NotificationEvent::call(CallSignal::Connected, "1003"))
        );
    }

    #[test]
    fn test_no_call_while_idle_is_noop() {
        let mut machine = CallStateMachine::new();
        assert_eq!(machine.apply_call(None), None);
        assert_eq!(machine.apply_call(None), None);
    }

    #[test]
    fn test_unknown_phase_ends_call() {
        let mut machine = CallStateMachine::new();

        machine.apply_call(fact(FactPhase::Active, "1001"));
        assert_eq!(
            machine.apply_call(fact(FactPhase::Unknown, "1001")),
            Some(NotificationEvent::call_ended())
        );
        assert_eq!(machine.apply_call(fact(FactPhase::Unknown, "1001")), None);
        assert!(!machine.call().is_active());
    }

    #[test]
    fn test_invariants_hold_after_every_step() {
        let mut machine = CallStateMachine::new();
        let steps = [
            fact(FactPhase::Outgoing, ""),
            fact(FactPhase::Active, "bob"),
            fact(FactPhase::Unknown, "bob"),
            None,
            fact(FactPhase::Incoming, "carol"),
            None,
        ];

        for step in steps {
            machine.apply_call(step);
            assert!(machine.call().is_consistent());
        }
    }

    #[test]
    fn test_resync_events() {
        let mut machine = CallStateMachine::new();
        assert_eq!(
            machine.resync_events(),
            vec![NotificationEvent::registration(false)]
        );

        machine.apply_registration(true, false);
        machine.apply_call(fact(FactPhase::Incoming, "1001"));
        assert_eq!(
            machine.resync_events(),
            vec![
                NotificationEvent::registration(true),
                NotificationEvent::call(CallSignal::Incoming, "1001"),
            ]
        );
    }
}
