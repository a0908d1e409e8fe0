//! Parsing `linphonecsh` status output.
//!
//! Both parsers are total: malformed or unexpected text degrades to
//! "not registered" / "no call" and never produces an error.

use lpui_core::{CallFact, FactPhase, RegistrationFact};
use serde::{Deserialize, Serialize};

use crate::sip::extract_identity;

/// Prefix of `status register` output for a live registration,
/// e.g. `registered, identity=sip:1001@example.org duration=300`.
const REGISTERED_PREFIX: &str = "registered,";

/// Exact `status register` output for a failed registration.
const NOT_REGISTERED: &str = "registered=0";

/// Parses the output of `linphonecsh status register`.
///
/// Rules, first match wins:
/// 1. empty → not registered
/// 2. starts with `registered,` → registered
/// 3. exactly `registered=0` → not registered
/// 4. contains `registered` (any case) → registered
/// 5. anything else → not registered
///
/// Rule 3 must run before rule 4, which would otherwise read `registered=0`
/// as a registration.
pub fn parse_registration(text: &str) -> RegistrationFact {
    let text = text.trim();

    if text.is_empty() {
        return false;
    }
    if text.starts_with(REGISTERED_PREFIX) {
        return true;
    }
    if text == NOT_REGISTERED {
        return false;
    }

    text.to_lowercase().contains("registered")
}

/// Table mapping the tool's call status tokens onto call phases.
///
/// The tool's vocabulary differs between releases, so the table is loaded
/// from configuration and only defaults to the tokens liblinphone uses for
/// its call states. Tokens are matched exactly, after trimming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseVocabulary {
    /// Tokens meaning "ringing in"
    pub incoming: Vec<String>,

    /// Tokens meaning "ringing out"
    pub outgoing: Vec<String>,

    /// Tokens meaning an established call.
    ///
    /// Held calls (`Pausing`, `Paused`, `PausedByRemote`, `Resuming`) are
    /// listed here on purpose: a call on hold stays `connected` instead of
    /// flapping to `ended` and back.
    pub active: Vec<String>,
}

impl Default for PhaseVocabulary {
    fn default() -> Self {
        fn tokens(list: &[&str]) -> Vec<String> {
            list.iter().map(|t| (*t).to_string()).collect()
        }

        Self {
            incoming: tokens(&["IncomingReceived", "IncomingEarlyMedia"]),
            outgoing: tokens(&[
                "OutgoingInit",
                "OutgoingProgress",
                "OutgoingRinging",
                "OutgoingEarlyMedia",
            ]),
            active: tokens(&[
                "Connected",
                "StreamsRunning",
                "Pausing",
                "Paused",
                "PausedByRemote",
                "Resuming",
                "Updating",
                "UpdatedByRemote",
            ]),
        }
    }
}

impl PhaseVocabulary {
    /// Looks up the phase for a status token.
    pub fn phase_of(&self, token: &str) -> FactPhase {
        let token = token.trim();
        let known = |list: &[String]| list.iter().any(|t| t == token);

        if known(&self.incoming) {
            FactPhase::Incoming
        } else if known(&self.outgoing) {
            FactPhase::Outgoing
        } else if known(&self.active) {
            FactPhase::Active
        } else {
            FactPhase::Unknown
        }
    }

    /// Returns true if no token is configured at all.
    pub fn is_empty(&self) -> bool {
        self.incoming.is_empty() && self.outgoing.is_empty() && self.active.is_empty()
    }
}

/// Parses the output of `linphonecsh generic calls`.
///
/// Each line is `call_id | peer | status [| ...]`. The first line with at
/// least three fields and a status token known to `vocabulary` becomes the
/// fact; short lines, header lines and unknown statuses are skipped.
pub fn parse_call(text: &str, vocabulary: &PhaseVocabulary) -> Option<CallFact> {
    text.lines().find_map(|line| parse_call_line(line, vocabulary))
}

fn parse_call_line(line: &str, vocabulary: &PhaseVocabulary) -> Option<CallFact> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let mut fields = line.split('|').map(str::trim);
    let call_id = fields.next()?;
    let peer = fields.next()?;
    let status = fields.next()?;

    match vocabulary.phase_of(status) {
        FactPhase::Unknown => None,
        phase => Some(CallFact::new(call_id, peer, extract_identity(peer), phase)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CALLS_HEADER: &str = "\
Call states
Id |            Destination              |      State    |    Flags   |
------------------------------------------------------------------------";

    #[test]
    fn test_registration_rules() {
        assert!(parse_registration(
            "registered, identity=sip:1001@host duration=300"
        ));
        assert!(!parse_registration("registered=0"));
        assert!(!parse_registration(""));
        assert!(parse_registration("REGISTERED SOMEHOW"));
        // Substring rule: any other text mentioning "registered" counts
        assert!(parse_registration("unregistered"));
    }

    #[test]
    fn test_registration_trims_tool_output() {
        assert!(!parse_registration("registered=0\n"));
        assert!(!parse_registration("  \n"));
        assert!(parse_registration("registered, identity=sip:1@h\n"));
    }

    #[test]
    fn test_registration_unrelated_text() {
        assert!(!parse_registration("Failed to connect to linphonec"));
    }

    #[test]
    fn test_parse_incoming_call() {
        let text = format!(
            "{CALLS_HEADER}\n2  | \"Alice\" <sip:alice@example.org> | IncomingReceived | |\n"
        );
        let fact = parse_call(&text, &PhaseVocabulary::default()).unwrap();

        assert_eq!(fact.call_id, "2");
        assert_eq!(fact.raw_peer, "\"Alice\" <sip:alice@example.org>");
        assert_eq!(fact.extracted_identity, "alice");
        assert_eq!(fact.phase, FactPhase::Incoming);
    }

    #[test]
    fn test_parse_active_and_outgoing() {
        let vocabulary = PhaseVocabulary::default();

        let active = parse_call("1 | sip:1002@pbx | StreamsRunning", &vocabulary).unwrap();
        assert_eq!(active.phase, FactPhase::Active);
        assert_eq!(active.extracted_identity, "1002");

        let outgoing = parse_call("1 | sip:1002@pbx | OutgoingRinging", &vocabulary).unwrap();
        assert_eq!(outgoing.phase, FactPhase::Outgoing);
    }

    #[test]
    fn test_held_call_stays_active() {
        let vocabulary = PhaseVocabulary::default();

        for token in ["Pausing", "Paused", "PausedByRemote", "Resuming"] {
            let fact = parse_call(&format!("1 | sip:1002@pbx | {token}"), &vocabulary).unwrap();
            assert_eq!(fact.phase, FactPhase::Active, "token {token}");
        }
        assert_eq!(parse_call("1 | sip:1002@pbx | Released", &vocabulary), None);
    }

    #[test]
    fn test_first_recognized_line_wins() {
        let text = "\
1 | sip:first@pbx | Released
2 | sip:second@pbx | IncomingReceived
3 | sip:third@pbx | StreamsRunning";
        let fact = parse_call(text, &PhaseVocabulary::default()).unwrap();
        assert_eq!(fact.extracted_identity, "second");
    }

    #[test]
    fn test_short_and_empty_lines_are_skipped() {
        let text = "garbage\n\n1 | only-two\n   \n";
        assert_eq!(parse_call(text, &PhaseVocabulary::default()), None);
        assert_eq!(parse_call("", &PhaseVocabulary::default()), None);
        assert_eq!(parse_call(CALLS_HEADER, &PhaseVocabulary::default()), None);
    }

    #[test]
    fn test_no_calls_output() {
        assert_eq!(parse_call("No active call.\n", &PhaseVocabulary::default()), None);
    }

    #[test]
    fn test_custom_vocabulary() {
        let vocabulary = PhaseVocabulary {
            incoming: vec!["ringing-in".to_string()],
            outgoing: vec![],
            active: vec!["talking".to_string()],
        };

        let fact = parse_call("7 | sip:x@y | talking", &vocabulary).unwrap();
        assert_eq!(fact.phase, FactPhase::Active);
        assert_eq!(parse_call("7 | sip:x@y | StreamsRunning", &vocabulary), None);
    }

    #[test]
    fn test_vocabulary_from_partial_toml() {
        let vocabulary: PhaseVocabulary = toml::from_str("active = [\"Talking\"]").unwrap();
        assert_eq!(vocabulary.active, vec!["Talking".to_string()]);
        assert_eq!(vocabulary.incoming, PhaseVocabulary::default().incoming);
        assert!(!vocabulary.is_empty());
    }
}
