//! Reconciliation between `linphonecsh` and the call state machine.
//!
//! The [`Orchestrator`] samples the tool, parses the output into facts,
//! feeds them to the state actor and runs the side effects the resulting
//! notifications call for. It also owns the tool lifecycle
//! (`init`/`exit`/restart) and implements the control surface exposed on
//! the bus.
//!
//! # Ordering
//!
//! Each fact category has its own async mutex, held from the moment the
//! tool is invoked until the resulting fact has been applied. A tick's
//! call sample and a `make_call`/`hang_up` therefore never interleave: the
//! later one always sees what the earlier one did, so a sample taken before
//! a control request cannot be applied after it.
//!
//! # Failure handling
//!
//! A failed sample (timeout, non-zero exit, spawn failure) produces no fact:
//! the cached state is kept and nothing is emitted. Registration and call
//! sampling are independent, so one failing does not hold back the other.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lpui_core::{CallFact, DomainError, NotificationEvent};
use lpui_linphone::{LinphoneCli, ProcessError};
use lpui_protocol::{
    extract_identity, parse_call, parse_registration, ControlRequest, PhaseVocabulary, ReplyValue,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::effects::{self, SideEffects};
use crate::state::{StateError, StateHandle};

/// Errors from a single control request.
///
/// Never crosses the bus: the request's reply carries `false` or an
/// `Error: ...` string instead.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("linphone failed to start")]
    StartFailed,
}

/// What one monitor tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Event from the registration sample
    pub registration: Option<NotificationEvent>,

    /// Event from the call sample
    pub call: Option<NotificationEvent>,

    /// Samples that failed and were skipped
    pub failed_samples: u8,

    /// The tool was not running and the tick tried to start it instead
    pub start_attempted: bool,
}

/// Drives `linphonecsh` and the state machine.
///
/// Shared as `Arc<Orchestrator>` between the monitor loop and the
/// connection handlers.
pub struct Orchestrator {
    linphone: LinphoneCli,
    vocabulary: PhaseVocabulary,
    state: StateHandle,
    effects: Arc<dyn SideEffects>,

    /// Whether `init` succeeded and `exit` has not run since
    tool_started: AtomicBool,

    /// Serializes start, stop and restart
    lifecycle: Mutex<()>,

    /// Held across a registration sample and its apply
    registration_sync: Mutex<()>,

    /// Held across a call sample, dial or terminate and its apply
    call_sync: Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        linphone: LinphoneCli,
        vocabulary: PhaseVocabulary,
        state: StateHandle,
        effects: Arc<dyn SideEffects>,
    ) -> Self {
        Self {
            linphone,
            vocabulary,
            state,
            effects,
            tool_started: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
            registration_sync: Mutex::new(()),
            call_sync: Mutex::new(()),
        }
    }

    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    pub fn is_tool_started(&self) -> bool {
        self.tool_started.load(Ordering::Acquire)
    }

    // ========================================================================
    // Tool lifecycle
    // ========================================================================

    /// Starts the tool: `init`, settle, then a forced registration check.
    ///
    /// Returns whether `init` succeeded.
    pub async fn start_tool(&self) -> bool {
        let _guard = self.lifecycle.lock().await;
        self.start_locked().await
    }

    /// Runs `exit`. Errors are logged and otherwise ignored.
    pub async fn stop_tool(&self) {
        let _guard = self.lifecycle.lock().await;
        self.stop_locked().await;
    }

    /// `exit`, pause, then a full start.
    pub async fn restart_tool(&self) -> bool {
        let _guard = self.lifecycle.lock().await;
        info!("Restarting linphone");

        self.stop_locked().await;
        tokio::time::sleep(self.linphone.settings().restart_pause()).await;
        self.start_locked().await
    }

    async fn start_locked(&self) -> bool {
        info!(config = %self.linphone.settings().config_path.display(), "Starting linphone");

        if let Err(e) = self.linphone.init().await {
            error!(error = %e, "linphonecsh init failed");
            self.tool_started.store(false, Ordering::Release);
            return false;
        }

        self.tool_started.store(true, Ordering::Release);
        tokio::time::sleep(self.linphone.settings().startup_settle()).await;

        if let Err(e) = self.refresh_registration(true).await {
            warn!(error = %e, "Initial registration check failed");
        }

        info!("Linphone started");
        true
    }

    async fn stop_locked(&self) {
        self.tool_started.store(false, Ordering::Release);
        match self.linphone.exit().await {
            Ok(_) => info!("Linphone stopped"),
            Err(e) => debug!(error = %e, "linphonecsh exit failed (ignored)"),
        }
    }

    // ========================================================================
    // Sampling
    // ========================================================================

    /// One monitor tick.
    ///
    /// While the tool is not started the tick tries to start it instead of
    /// sampling; if a start or restart is already in progress the tick is a
    /// no-op.
    pub async fn poll_once(&self) -> TickReport {
        let mut report = TickReport::default();

        if !self.is_tool_started() {
            report.start_attempted = true;
            match self.lifecycle.try_lock() {
                Ok(_guard) => {
                    warn!("Linphone not running, attempting start");
                    self.start_locked().await;
                }
                Err(_) => debug!("Linphone start already in progress"),
            }
            return report;
        }

        let (registration, call) = tokio::join!(self.sample_registration(), self.sample_call());

        match registration {
            Ok(event) => report.registration = event,
            Err(e) => {
                warn!(error = %e, "Registration sample failed");
                report.failed_samples += 1;
            }
        }

        match call {
            Ok(event) => report.call = event,
            Err(e) => {
                warn!(error = %e, "Call sample failed");
                report.failed_samples += 1;
            }
        }

        report
    }

    async fn sample_registration(&self) -> Result<Option<NotificationEvent>, ProcessError> {
        let _guard = self.registration_sync.lock().await;
        let text = self.linphone.registration_status().await?;
        Ok(self.apply_registration(parse_registration(&text), false).await)
    }

    async fn sample_call(&self) -> Result<Option<NotificationEvent>, ProcessError> {
        let _guard = self.call_sync.lock().await;
        let text = self.linphone.calls().await?;
        Ok(self.apply_call(parse_call(&text, &self.vocabulary)).await)
    }

    /// Samples registration and applies it, emitting unconditionally when
    /// `force` is set.
    pub async fn refresh_registration(
        &self,
        force: bool,
    ) -> Result<Option<NotificationEvent>, ControlError> {
        let _guard = self.registration_sync.lock().await;
        let text = self.linphone.registration_status().await?;
        let fact = parse_registration(&text);
        debug!(registered = fact, force, "Registration sampled");

        let event = self.state.apply_registration(fact, force).await?;
        if let Some(ref event) = event {
            self.after_event(event).await;
        }
        Ok(event)
    }

    async fn apply_registration(&self, fact: bool, force: bool) -> Option<NotificationEvent> {
        match self.state.apply_registration(fact, force).await {
            Ok(Some(event)) => {
                self.after_event(&event).await;
                Some(event)
            }
            Ok(None) => None,
            Err(e) => {
                error!(error = %e, "Failed to apply registration fact");
                None
            }
        }
    }

    async fn apply_call(&self, fact: Option<CallFact>) -> Option<NotificationEvent> {
        match self.state.apply_call(fact).await {
            Ok(Some(event)) => {
                self.after_event(&event).await;
                Some(event)
            }
            Ok(None) => None,
            Err(e) => {
                error!(error = %e, "Failed to apply call fact");
                None
            }
        }
    }

    async fn after_event(&self, event: &NotificationEvent) {
        info!(?event, "State changed");
        effects::dispatch(self.effects.as_ref(), event).await;
    }

    // ========================================================================
    // Control surface
    // ========================================================================

    /// Runs a bus method and builds its reply.
    pub async fn dispatch(&self, request: &ControlRequest) -> ReplyValue {
        debug!(method = request.method_name(), "Control request");

        match request {
            ControlRequest::MakeCall { identity } => self.make_call(identity).await.into(),
            ControlRequest::HangUp => self.hang_up().await.into(),
            ControlRequest::AnswerCall => self.answer_call().await.into(),
            ControlRequest::CheckRegistrationStatus => {
                self.check_registration_status().await.into()
            }
            ControlRequest::GetRegistrationStatus => self.get_registration_status().await.into(),
            ControlRequest::IsRegistered => self.is_registered().await.into(),
            ControlRequest::GetCurrentCallInfo => self.get_current_call_info().await.into(),
            ControlRequest::RestartLinphone => self.restart_linphone().await.into(),
        }
    }

    /// Dials `identity` and records the call as outgoing.
    pub async fn make_call(&self, identity: &str) -> bool {
        report("make_call", self.try_make_call(identity).await)
    }

    pub async fn try_make_call(&self, identity: &str) -> Result<(), ControlError> {
        // Validates before the tool is touched
        let mut fact = CallFact::outgoing(identity)?;
        fact.extracted_identity = extract_identity(&fact.raw_peer);

        let _guard = self.call_sync.lock().await;
        self.linphone.dial(&fact.raw_peer).await?;
        info!(identity = %fact.extracted_identity, "Dialing");

        self.apply_control_call(Some(fact)).await
    }

    /// Terminates the current call and records it as ended.
    ///
    /// `ended` is emitted as soon as the tool accepts the command rather
    /// than on the next tick, mirroring `make_call`. Hanging up with no
    /// call is silent.
    pub async fn hang_up(&self) -> bool {
        report("hang_up", self.try_hang_up().await)
    }

    pub async fn try_hang_up(&self) -> Result<(), ControlError> {
        let _guard = self.call_sync.lock().await;
        self.linphone.terminate().await?;
        self.apply_control_call(None).await
    }

    /// Answers the ringing call. The state catches up on the next tick.
    pub async fn answer_call(&self) -> bool {
        report("answer_call", self.try_answer_call().await)
    }

    pub async fn try_answer_call(&self) -> Result<(), ControlError> {
        self.linphone.answer().await?;
        Ok(())
    }

    /// Re-checks registration and re-emits its signal even if unchanged.
    pub async fn check_registration_status(&self) -> bool {
        report(
            "check_registration_status",
            self.refresh_registration(true).await.map(|_| ()),
        )
    }

    /// Raw `status register` output, or `Error: ...`.
    pub async fn get_registration_status(&self) -> String {
        match self.linphone.registration_status().await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "get_registration_status failed");
                format!("Error: {e}")
            }
        }
    }

    /// Cached registration state; `false` if the state is unreachable.
    pub async fn is_registered(&self) -> bool {
        self.state.is_registered().await.unwrap_or_else(|e| {
            error!(error = %e, "is_registered failed");
            false
        })
    }

    /// Summary of the cached call record.
    pub async fn get_current_call_info(&self) -> String {
        match self.state.call().await {
            Ok(call) => call.summary(),
            Err(e) => {
                error!(error = %e, "get_current_call_info failed");
                format!("Error: {e}")
            }
        }
    }

    pub async fn restart_linphone(&self) -> bool {
        let result = if self.restart_tool().await {
            Ok(())
        } else {
            Err(ControlError::StartFailed)
        };
        report("restart_linphone", result)
    }

    async fn apply_control_call(&self, fact: Option<CallFact>) -> Result<(), ControlError> {
        if let Some(event) = self.state.apply_call(fact).await? {
            self.after_event(&event).await;
        }
        Ok(())
    }
}

fn report(method: &str, result: Result<(), ControlError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(method, error = %e, "Control request failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_maps_result_to_bool() {
        assert!(report("hang_up", Ok(())));
        assert!(!report(
            "make_call",
            Err(ControlError::Domain(DomainError::EmptyIdentity))
        ));
    }

    #[test]
    fn test_control_error_is_transparent() {
        let err = ControlError::from(ProcessError::SpawnFailure {
            program: "linphonecsh".to_string(),
            reason: "No such file or directory".to_string(),
        });
        assert!(err.to_string().contains("linphonecsh"));
        assert_eq!(ControlError::StartFailed.to_string(), "linphone failed to start");
    }
}
