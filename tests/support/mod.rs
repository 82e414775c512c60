#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use devicebridge::{
    Command, DebugEvent, DebugStubConnector, DebugTransport, InstalledApp, LogSink, ReceiveParams,
    SessionConfig, TransportError,
};

pub const CONTAINER: &str = "/var/mobile/Containers/Data/Application/DEMO";
pub const BUNDLE_PATH: &str = "/private/var/containers/Bundle/Application/DEMO/Demo.app";
pub const BUNDLE_ID: &str = "com.example.demo";

/// Answer to one sent command.
#[derive(Debug, Clone)]
pub enum Reply {
    Response(String),
    Silent,
    Closed,
}

/// Next result of `receive_response`.
#[derive(Debug, Clone)]
pub enum Incoming {
    Payload(String),
    /// Blocks in poll slices until the cancel predicate fires.
    WaitForCancel,
    Closed,
}

#[derive(Debug, Default)]
pub struct TransportTrace {
    pub sent: Vec<String>,
    /// `(cancellable, timeout)` for every `set_receive_params` call.
    pub receive_params: Vec<(bool, Duration)>,
    pub receives: usize,
    pub releases: usize,
}

impl TransportTrace {
    pub fn sent_verbs(&self) -> Vec<&str> {
        self.sent.iter().map(String::as_str).collect()
    }

    pub fn was_sent(&self, encoded: &str) -> bool {
        self.sent.iter().any(|sent| sent == encoded)
    }
}

#[derive(Debug, Clone)]
pub struct Script {
    replies: HashMap<String, Reply>,
    incoming: VecDeque<Incoming>,
}

impl Script {
    /// Every setup and launch step answers `OK`; everything else is silent.
    pub fn happy() -> Self {
        let replies = [
            "QSetMaxPacketSize:",
            "QSetWorkingDir:",
            "QEnvironmentHexEncoded:",
            "A",
            "qLaunchSuccess",
            "Hc0",
        ]
        .into_iter()
        .map(|verb| (verb.to_string(), Reply::Response("OK".to_string())))
        .collect();

        Self {
            replies,
            incoming: VecDeque::new(),
        }
    }

    pub fn reply(mut self, verb: &str, reply: Reply) -> Self {
        self.replies.insert(verb.to_string(), reply);
        self
    }

    pub fn respond(self, verb: &str, response: &str) -> Self {
        self.reply(verb, Reply::Response(response.to_string()))
    }

    pub fn incoming(mut self, incoming: Incoming) -> Self {
        self.incoming.push_back(incoming);
        self
    }

    pub fn payload(self, payload: &str) -> Self {
        self.incoming(Incoming::Payload(payload.to_string()))
    }
}

pub struct ScriptedTransport {
    script: Script,
    params: ReceiveParams,
    trace: Arc<Mutex<TransportTrace>>,
}

impl ScriptedTransport {
    pub fn new(script: Script, trace: Arc<Mutex<TransportTrace>>) -> Self {
        Self {
            script,
            params: ReceiveParams::uncancellable(Duration::from_millis(10)),
            trace,
        }
    }

    fn wait_for_cancel(&self) -> Result<Option<String>, TransportError> {
        loop {
            thread::sleep(self.params.timeout);
            if self.params.cancel.is_none() {
                return Err(TransportError::Timeout {
                    timeout_ms: self.params.timeout.as_millis() as u64,
                });
            }
            if self.params.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
        }
    }
}

impl DebugTransport for ScriptedTransport {
    fn set_receive_params(&mut self, params: ReceiveParams) -> Result<(), TransportError> {
        lock_unpoisoned(&self.trace)
            .receive_params
            .push((params.cancel.is_some(), params.timeout));
        self.params = params;
        Ok(())
    }

    fn send_command(&mut self, command: &Command) -> Result<Option<String>, TransportError> {
        lock_unpoisoned(&self.trace).sent.push(command.encode());
        match self.script.replies.get(command.verb()) {
            Some(Reply::Response(response)) => Ok(Some(response.clone())),
            Some(Reply::Closed) => Err(TransportError::Closed),
            Some(Reply::Silent) | None => Ok(None),
        }
    }

    fn receive_response(&mut self) -> Result<Option<String>, TransportError> {
        lock_unpoisoned(&self.trace).receives += 1;
        match self.script.incoming.pop_front() {
            Some(Incoming::Payload(payload)) => Ok(Some(payload)),
            Some(Incoming::Closed) => Err(TransportError::Closed),
            Some(Incoming::WaitForCancel) | None => self.wait_for_cancel(),
        }
    }
}

impl Drop for ScriptedTransport {
    fn drop(&mut self) {
        lock_unpoisoned(&self.trace).releases += 1;
    }
}

type TransportFactory = Box<dyn Fn() -> Result<ScriptedTransport, TransportError> + Send + Sync>;

pub struct ScriptedConnector {
    factory: TransportFactory,
    pub services: Mutex<Vec<String>>,
}

impl ScriptedConnector {
    /// Hands out a fresh transport running `script` on every start.
    pub fn new(script: Script, trace: Arc<Mutex<TransportTrace>>) -> Self {
        Self {
            factory: Box::new(move || Ok(ScriptedTransport::new(script.clone(), Arc::clone(&trace)))),
            services: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            factory: Box::new(|| {
                Err(TransportError::ServiceStart {
                    service: "com.apple.debugserver".to_string(),
                    message: "developer disk image not mounted".to_string(),
                })
            }),
            services: Mutex::new(Vec::new()),
        }
    }
}

impl DebugStubConnector for ScriptedConnector {
    fn start_debug_stub(
        &self,
        service_name: &str,
    ) -> Result<Box<dyn DebugTransport>, TransportError> {
        lock_unpoisoned(&self.services).push(service_name.to_string());
        let transport = (self.factory)()?;
        Ok(Box::new(transport))
    }
}

pub type EventLog = Arc<Mutex<Vec<DebugEvent>>>;

pub fn recording_sink() -> (Arc<dyn LogSink>, EventLog) {
    let events: EventLog = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&events);
    let sink: Arc<dyn LogSink> =
        Arc::new(move |event: DebugEvent| lock_unpoisoned(&recorder).push(event));
    (sink, events)
}

pub fn output_lines(events: &EventLog) -> Vec<String> {
    lock_unpoisoned(events)
        .iter()
        .filter_map(|event| match event {
            DebugEvent::Output(text) => Some(text.clone()),
            _ => None,
        })
        .collect()
}

pub fn demo_app() -> InstalledApp {
    InstalledApp {
        container: CONTAINER.to_string(),
        path: BUNDLE_PATH.to_string(),
        executable: "Demo".to_string(),
    }
}

pub fn fast_config() -> SessionConfig {
    SessionConfig {
        poll_timeout: Duration::from_millis(10),
        shutdown_timeout: Duration::from_millis(20),
        ..SessionConfig::default()
    }
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
