//! Side effects triggered by call transitions.
//!
//! - `incoming` brings the front-end to the foreground
//! - `connected` asks for in-call audio routing
//! - `ended` asks for the normal audio routing back
//!
//! Effects are best effort: failures are logged and never reach the state
//! machine or the bus.

use std::sync::Arc;

use async_trait::async_trait;
use lpui_core::{CallSignal, NotificationEvent};
use lpui_linphone::CommandRunner;
use tracing::{debug, info, warn};

use crate::config::{AudioConfig, FrontendConfig};

/// Host actions tied to call transitions.
#[async_trait]
pub trait SideEffects: Send + Sync {
    /// Launches the front-end; must not wait for it to exit.
    async fn launch_frontend(&self);

    /// Hint: route audio for an active call.
    async fn route_audio(&self);

    /// Hint: restore normal audio routing.
    async fn restore_audio(&self);
}

/// Runs the side effects a notification calls for, if any.
pub async fn dispatch(effects: &dyn SideEffects, event: &NotificationEvent) {
    if let NotificationEvent::CallChanged { signal, .. } = event {
        match signal {
            CallSignal::Incoming => effects.launch_frontend().await,
            CallSignal::Connected => effects.route_audio().await,
            CallSignal::Ended => effects.restore_audio().await,
            CallSignal::Outgoing => {}
        }
    }
}

/// [`SideEffects`] that run configured host commands.
pub struct CommandEffects {
    runner: Arc<dyn CommandRunner>,
    frontend: FrontendConfig,
    audio: AudioConfig,
}

impl CommandEffects {
    pub fn new(runner: Arc<dyn CommandRunner>, frontend: FrontendConfig, audio: AudioConfig) -> Self {
        Self {
            runner,
            frontend,
            audio,
        }
    }

    async fn run_hint(&self, hint: &str, command: &[String]) {
        let Some((program, args)) = command.split_first() else {
            info!(hint, "Audio hint (no command configured)");
            return;
        };

        match self.runner.run(program, args, self.audio.timeout()).await {
            Ok(_) => debug!(hint, program = %program, "Audio hint applied"),
            Err(e) => warn!(hint, error = %e, "Audio hint command failed"),
        }
    }
}

#[async_trait]
impl SideEffects for CommandEffects {
    async fn launch_frontend(&self) {
        let Some((program, args)) = self.frontend.launch_command.split_first() else {
            debug!("Front-end launch disabled");
            return;
        };

        match self.runner.spawn_detached(program, args) {
            Ok(pid) => info!(program = %program, ?pid, "Front-end launched"),
            Err(e) => warn!(error = %e, "Failed to launch front-end"),
        }
    }

    async fn route_audio(&self) {
        self.run_hint("route", &self.audio.route_command).await;
    }

    async fn restore_audio(&self) {
        self.run_hint("restore", &self.audio.restore_command).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lpui_linphone::ProcessError;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        ran: Mutex<Vec<String>>,
        spawned: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CommandRunner for Recorder {
        async fn run(&self, program: &str, _: &[String], _: Duration) -> Result<String, ProcessError> {
            self.ran.lock().unwrap().push(program.to_string());
            Ok(String::new())
        }

        fn spawn_detached(&self, program: &str, _: &[String]) -> Result<Option<u32>, ProcessError> {
            self.spawned.lock().unwrap().push(program.to_string());
            Err(ProcessError::SpawnFailure {
                program: program.to_string(),
                reason: "not here".to_string(),
            })
        }
    }

    fn effects(audio: AudioConfig) -> (CommandEffects, Arc<Recorder>) {
        let runner = Arc::new(Recorder::default());
        let effects = CommandEffects::new(runner.clone(), FrontendConfig::default(), audio);
        (effects, runner)
    }

    #[tokio::test]
    async fn test_incoming_launches_frontend() {
        let (effects, runner) = effects(AudioConfig::default());

        dispatch(&effects, &NotificationEvent::call(CallSignal::Incoming, "1001")).await;

        // A failed launch is only logged
        assert_eq!(*runner.spawned.lock().unwrap(), vec!["invoker".to_string()]);
        assert!(runner.ran.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_audio_hints_run_nothing() {
        let (effects, runner) = effects(AudioConfig::default());

        dispatch(&effects, &NotificationEvent::call(CallSignal::Connected, "1001")).await;
        dispatch(&effects, &NotificationEvent::call_ended()).await;

        assert!(runner.ran.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_configured_audio_hints() {
        let (effects, runner) = effects(AudioConfig {
            route_command: vec!["route-earpiece".to_string()],
            restore_command: vec!["route-speaker".to_string(), "--reset".to_string()],
            ..Default::default()
        });

        dispatch(&effects, &NotificationEvent::call(CallSignal::Connected, "1001")).await;
        dispatch(&effects, &NotificationEvent::call_ended()).await;

        assert_eq!(
            *runner.ran.lock().unwrap(),
            vec!["route-earpiece".to_string(), "route-speaker".to_string()]
        );
    }

    #[tokio::test]
    async fn test_outgoing_and_registration_have_no_effect() {
        let (effects, runner) = effects(AudioConfig {
            route_command: vec!["x".to_string()],
            restore_command: vec!["y".to_string()],
            ..Default::default()
        });

        dispatch(&effects, &NotificationEvent::call(CallSignal::Outgoing, "1002")).await;
        dispatch(&effects, &NotificationEvent::registration(true)).await;

        assert!(runner.ran.lock().unwrap().is_empty());
        assert!(runner.spawned.lock().unwrap().is_empty());
    }
}
