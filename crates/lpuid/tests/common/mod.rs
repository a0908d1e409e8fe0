//! Shared fixtures: a scripted `linphonecsh` and recording side effects.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lpui_core::NotificationEvent;
use lpui_linphone::{CommandRunner, LinphoneCli, LinphoneSettings, ProcessError};
use lpui_protocol::PhaseVocabulary;
use lpuid::effects::SideEffects;
use lpuid::orchestrator::Orchestrator;
use lpuid::state::{spawn_state, EventBus};
use tokio::sync::broadcast;

pub const REGISTERED: &str = "registered, identity=sip:1000@pbx.example.org duration=600";
pub const NOT_REGISTERED: &str = "registered=0";

pub fn calls_line(peer: &str, status: &str) -> String {
    format!("Call states\n 1 | {peer} | {status} |\n")
}

#[derive(Default)]
struct Script {
    registration: String,
    calls: String,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    log: Vec<Vec<String>>,
    spawned: Vec<String>,
}

/// Fake `linphonecsh` whose outputs the test controls.
#[derive(Default)]
pub struct ScriptedRunner {
    script: Mutex<Script>,
}

impl ScriptedRunner {
    /// Starts registered with no call.
    pub fn new() -> Arc<Self> {
        let runner = Self::default();
        runner.set_registration(REGISTERED);
        Arc::new(runner)
    }

    pub fn set_registration(&self, text: &str) {
        self.script.lock().unwrap().registration = text.to_string();
    }

    pub fn set_calls(&self, text: &str) {
        self.script.lock().unwrap().calls = text.to_string();
    }

    /// Makes a command fail with a non-zero exit. `command` is the
    /// subcommand as typed, e.g. `"generic calls"`, `"dial"`, `"init"`.
    pub fn fail(&self, command: &str) {
        self.script.lock().unwrap().failing.insert(command.to_string());
    }

    /// Makes a command take `delay` to return. Its output is captured when
    /// the command starts, like a real process sampling the tool.
    pub fn slow(&self, command: &str, delay: Duration) {
        self.script
            .lock()
            .unwrap()
            .delays
            .insert(command.to_string(), delay);
    }

    pub fn recover(&self, command: &str) {
        self.script.lock().unwrap().failing.remove(command);
    }

    /// Every invocation so far, as argument lists.
    pub fn invocations(&self) -> Vec<Vec<String>> {
        self.script.lock().unwrap().log.clone()
    }

    /// Number of invocations of `command`.
    pub fn count(&self, command: &str) -> usize {
        self.invocations()
            .iter()
            .filter(|args| command_key(args) == command)
            .count()
    }

    pub fn spawned(&self) -> Vec<String> {
        self.script.lock().unwrap().spawned.clone()
    }
}

fn command_key(args: &[String]) -> String {
    match args {
        [first, second, ..] if first == "generic" || first == "status" => {
            format!("{first} {second}")
        }
        [first, ..] => first.clone(),
        [] => String::new(),
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        _timeout: Duration,
    ) -> Result<String, ProcessError> {
        let key = command_key(args);
        let (result, delay) = {
            let mut script = self.script.lock().unwrap();
            script.log.push(args.to_vec());

            let result = if script.failing.contains(&key) {
                Err(ProcessError::NonZeroExit {
                    program: program.to_string(),
                    code: Some(1),
                    stderr: format!("{key} failed"),
                })
            } else {
                Ok(match key.as_str() {
                    "status register" => format!("{}\n", script.registration),
                    "generic calls" => script.calls.clone(),
                    _ => String::new(),
                })
            };
            (result, script.delays.get(&key).copied())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }

    fn spawn_detached(&self, program: &str, _args: &[String]) -> Result<Option<u32>, ProcessError> {
        self.script.lock().unwrap().spawned.push(program.to_string());
        Ok(Some(4242))
    }
}

/// Side effects that only record what was asked of them.
#[derive(Default)]
pub struct RecordingEffects {
    calls: Mutex<Vec<&'static str>>,
}

impl RecordingEffects {
    pub fn taken(&self) -> Vec<&'static str> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }
}

#[async_trait]
impl SideEffects for RecordingEffects {
    async fn launch_frontend(&self) {
        self.calls.lock().unwrap().push("launch");
    }

    async fn route_audio(&self) {
        self.calls.lock().unwrap().push("route");
    }

    async fn restore_audio(&self) {
        self.calls.lock().unwrap().push("restore");
    }
}

/// Settings with no settle or restart pauses.
pub fn fast_settings() -> LinphoneSettings {
    LinphoneSettings {
        startup_settle_ms: 0,
        restart_pause_ms: 0,
        ..Default::default()
    }
}

/// A wired-up daemon core without the socket server.
pub struct Harness {
    pub runner: Arc<ScriptedRunner>,
    pub effects: Arc<RecordingEffects>,
    pub bus: EventBus,
    pub events: broadcast::Receiver<NotificationEvent>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Harness {
    pub fn new() -> Self {
        let runner = ScriptedRunner::new();
        let effects = Arc::new(RecordingEffects::default());
        let bus = EventBus::new();
        let events = bus.subscribe();
        let state = spawn_state(Arc::new(bus.clone()));

        let linphone = LinphoneCli::new(runner.clone(), fast_settings());
        let orchestrator = Arc::new(Orchestrator::new(
            linphone,
            PhaseVocabulary::default(),
            state,
            effects.clone(),
        ));

        Self {
            runner,
            effects,
            bus,
            events,
            orchestrator,
        }
    }

    /// Harness whose tool has already been started.
    pub async fn started() -> Self {
        let mut harness = Self::new();
        assert!(harness.orchestrator.start_tool().await);
        harness.drain();
        harness.effects.taken();
        harness
    }

    /// Events published since the last drain, in order.
    pub fn drain(&mut self) -> Vec<NotificationEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
