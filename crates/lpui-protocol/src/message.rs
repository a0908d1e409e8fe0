//! Bus message types exchanged between the daemon and its clients.
//!
//! Messages are JSON objects, one per line. Clients issue method calls and
//! receive replies; subscribed clients additionally receive the
//! `registration_state_changed` and `call_state_changed` signals.

use lpui_core::{CallSignal, NotificationEvent};
use serde::{Deserialize, Serialize};

use crate::version::ProtocolVersion;

/// Methods of the daemon's control surface.
///
/// Method names and arities are part of the front-end compatibility contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Dial `identity`; replies `bool`
    MakeCall { identity: String },

    /// Terminate the current call; replies `bool`
    HangUp,

    /// Answer the ringing call; replies `bool`
    AnswerCall,

    /// Re-check registration and re-emit its signal; replies `bool`
    CheckRegistrationStatus,

    /// Raw `status register` output; replies `string`
    GetRegistrationStatus,

    /// Cached registration state; replies `bool`
    IsRegistered,

    /// Summary of the current call; replies `string`
    GetCurrentCallInfo,

    /// Tear down and re-initialize linphonecsh; replies `bool`
    RestartLinphone,
}

impl ControlRequest {
    /// Bus method name.
    pub fn method_name(&self) -> &'static str {
        match self {
            Self::MakeCall { .. } => "make_call",
            Self::HangUp => "hang_up",
            Self::AnswerCall => "answer_call",
            Self::CheckRegistrationStatus => "check_registration_status",
            Self::GetRegistrationStatus => "get_registration_status",
            Self::IsRegistered => "is_registered",
            Self::GetCurrentCallInfo => "get_current_call_info",
            Self::RestartLinphone => "restart_linphone",
        }
    }
}

/// Return value of a method call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplyValue {
    Bool(bool),
    Text(String),
}

impl ReplyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Bool(_) => None,
            Self::Text(s) => Some(s),
        }
    }
}

impl From<bool> for ReplyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<String> for ReplyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Message types that can be sent by clients to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageType {
    /// Client handshake/connection request
    Connect {
        /// Client identifier (optional)
        #[serde(skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
    },

    /// Method call on the control surface
    Call {
        /// Echoed back in the matching reply
        request_id: u64,
        request: ControlRequest,
    },

    /// Start receiving signals
    Subscribe,

    /// Stop receiving signals
    Unsubscribe,

    /// Ping to check connection
    Ping {
        /// Sequence number for matching pong response
        seq: u64,
    },

    /// Client disconnecting gracefully
    Disconnect,
}

/// Messages sent from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Protocol version
    pub protocol_version: ProtocolVersion,

    /// Message payload
    #[serde(flatten)]
    pub message: MessageType,
}

impl ClientMessage {
    /// Creates a new client message with current protocol version.
    pub fn new(message: MessageType) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            message,
        }
    }

    pub fn connect(client_id: Option<String>) -> Self {
        Self::new(MessageType::Connect { client_id })
    }

    pub fn call(request_id: u64, request: ControlRequest) -> Self {
        Self::new(MessageType::Call {
            request_id,
            request,
        })
    }

    pub fn subscribe() -> Self {
        Self::new(MessageType::Subscribe)
    }

    pub fn unsubscribe() -> Self {
        Self::new(MessageType::Unsubscribe)
    }

    pub fn ping(seq: u64) -> Self {
        Self::new(MessageType::Ping { seq })
    }

    pub fn disconnect() -> Self {
        Self::new(MessageType::Disconnect)
    }
}

/// Messages sent from daemon to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonMessage {
    /// Connection accepted
    Connected {
        /// Daemon's protocol version
        protocol_version: ProtocolVersion,
        /// Assigned client ID
        client_id: String,
    },

    /// Connection rejected (version mismatch, etc.)
    Rejected {
        /// Reason for rejection
        reason: String,
        /// Daemon's protocol version (for client to upgrade)
        protocol_version: ProtocolVersion,
    },

    /// Result of a method call
    Reply { request_id: u64, value: ReplyValue },

    /// Signal: registration state changed (or forced re-sync)
    RegistrationStateChanged { registered: bool },

    /// Signal: call state changed.
    ///
    /// `state` is one of `incoming`, `outgoing`, `connected`, `ended`;
    /// `identity` is the peer's user part, empty for `ended`.
    CallStateChanged { state: String, identity: String },

    /// Pong response to ping
    Pong {
        /// Sequence number from ping
        seq: u64,
    },

    /// Error response
    Error {
        /// Error message
        message: String,
        /// Error code (optional)
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl DaemonMessage {
    pub fn connected(client_id: String) -> Self {
        Self::Connected {
            protocol_version: ProtocolVersion::CURRENT,
            client_id,
        }
    }

    pub fn rejected(reason: &str) -> Self {
        Self::Rejected {
            reason: reason.to_string(),
            protocol_version: ProtocolVersion::CURRENT,
        }
    }

    pub fn reply(request_id: u64, value: impl Into<ReplyValue>) -> Self {
        Self::Reply {
            request_id,
            value: value.into(),
        }
    }

    pub fn pong(seq: u64) -> Self {
        Self::Pong { seq }
    }

    pub fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: None,
        }
    }

    pub fn error_with_code(message: &str, code: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: Some(code.to_string()),
        }
    }

    /// Builds the signal message for a notification event.
    pub fn signal(event: &NotificationEvent) -> Self {
        match event {
            NotificationEvent::RegistrationChanged { registered } => {
                Self::RegistrationStateChanged {
                    registered: *registered,
                }
            }
            NotificationEvent::CallChanged { signal, identity } => Self::CallStateChanged {
                state: signal.as_str().to_string(),
                identity: identity.clone(),
            },
        }
    }

    /// Reads a signal message back into a notification event.
    ///
    /// Returns `None` for non-signal messages and unknown call states.
    pub fn as_event(&self) -> Option<NotificationEvent> {
        match self {
            Self::RegistrationStateChanged { registered } => {
                Some(NotificationEvent::registration(*registered))
            }
            Self::CallStateChanged { state, identity } => {
                let signal = state.parse::<CallSignal>().ok()?;
                Some(NotificationEvent::call(signal, identity.clone()))
            }
            _ => None,
        }
    }
}
