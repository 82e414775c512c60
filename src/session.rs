//! Launch-and-monitor session against a debug stub.
//!
//! A session walks `SettingUp → Launching → Monitoring → Interrupting →
//! Killing` and always ends back in `Idle` with the transport released and
//! the cancellation flag cleared. Setup and launch failures return early
//! without sending interrupt or kill.

use std::fmt;

use tracing::{debug, info, warn};

use crate::cancel::CancellationFlag;
use crate::catalog::InstalledApp;
use crate::classify::{classify, ClassifiedResponse};
use crate::command::Command;
use crate::config::SessionConfig;
use crate::error::{SessionError, TransportError};
use crate::sink::{DebugEvent, LogSink};
use crate::transport::{DebugStubConnector, DebugTransport, ReceiveParams};

/// Shown when the debug stub service cannot be started at all.
pub const STUB_START_GUIDANCE: &str = "Could not start the debug server on the device!\n\
Please make sure to mount the developer disk image first:\n  \
1) Get the device OS version.\n  \
2) Find the matching developer disk image.\n  \
3) Mount it on the device and try again.";

/// Parameters of one `start_debugging` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub bundle_id: String,
    /// Detach right after a successful launch instead of monitoring.
    pub detach_after_start: bool,
    /// Whitespace-separated `KEY=VALUE` entries.
    pub environment: String,
    /// Whitespace-separated process arguments.
    pub arguments: String,
}

impl LaunchRequest {
    #[must_use]
    pub fn new(bundle_id: impl Into<String>) -> Self {
        Self {
            bundle_id: bundle_id.into(),
            detach_after_start: false,
            environment: String::new(),
            arguments: String::new(),
        }
    }

    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    #[must_use]
    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = arguments.into();
        self
    }

    #[must_use]
    pub fn detached(mut self) -> Self {
        self.detach_after_start = true;
        self
    }
}

/// Mutable state owned by one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub container_path: String,
    /// Full argv; entry 0 is the executable path.
    pub process_arguments: Vec<String>,
    pub environment_variables: Vec<String>,
    pub exit_status: Option<i32>,
}

impl SessionState {
    #[must_use]
    pub fn new(app: &InstalledApp, request: &LaunchRequest) -> Self {
        let process_arguments = std::iter::once(app.executable_path())
            .chain(request.arguments.split_whitespace().map(str::to_string))
            .collect();
        let environment_variables = request
            .environment
            .split_whitespace()
            .map(str::to_string)
            .collect();

        Self {
            container_path: app.container.clone(),
            process_arguments,
            environment_variables,
            exit_status: None,
        }
    }
}

/// Why a session that got past launch came to an end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The process exited (`W`/`X`).
    Exited,
    /// The stub reported an abnormal thread stop (`T`).
    Stopped,
    /// Detached right after launch.
    Detached,
    /// `stop_debugging` was observed while monitoring.
    Cancelled,
    ReceiveFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub end: SessionEnd,
    pub exit_status: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    SettingUp,
    Launching,
    Monitoring,
    Interrupting,
    Killing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::SettingUp => "setting-up",
            Self::Launching => "launching",
            Self::Monitoring => "monitoring",
            Self::Interrupting => "interrupting",
            Self::Killing => "killing",
        };
        f.write_str(name)
    }
}

/// Starts the stub and runs one full session. The flag is cleared on every path.
pub fn run_session(
    connector: &dyn DebugStubConnector,
    app: &InstalledApp,
    request: &LaunchRequest,
    config: &SessionConfig,
    cancel: &CancellationFlag,
    sink: &dyn LogSink,
) -> Result<SessionReport, SessionError> {
    let transport = match connector.start_debug_stub(&config.service_name) {
        Ok(transport) => transport,
        Err(error) => {
            warn!(service = %config.service_name, %error, "debug stub failed to start");
            sink.log(DebugEvent::SessionFailed(STUB_START_GUIDANCE.to_string()));
            cancel.reset();
            return Err(SessionError::StubStart(error));
        }
    };

    let state = SessionState::new(app, request);
    SessionController::new(transport, state, config, cancel.clone(), sink)
        .run(request.detach_after_start)
}

/// Drives one session over an already started transport.
pub struct SessionController<'a> {
    transport: Box<dyn DebugTransport>,
    state: SessionState,
    phase: Phase,
    config: &'a SessionConfig,
    cancel: CancellationFlag,
    sink: &'a dyn LogSink,
}

impl<'a> SessionController<'a> {
    pub fn new(
        transport: Box<dyn DebugTransport>,
        state: SessionState,
        config: &'a SessionConfig,
        cancel: CancellationFlag,
        sink: &'a dyn LogSink,
    ) -> Self {
        Self {
            transport,
            state,
            phase: Phase::Idle,
            config,
            cancel,
            sink,
        }
    }

    /// Runs the session to completion, then releases the transport and clears
    /// the cancellation flag.
    pub fn run(mut self, detach_after_start: bool) -> Result<SessionReport, SessionError> {
        let outcome = self.drive(detach_after_start);
        if let Err(error) = &outcome {
            warn!(phase = %self.phase, %error, "session aborted");
            self.sink.log(DebugEvent::SessionFailed(error.to_string()));
        }

        let Self {
            transport, cancel, ..
        } = self;
        drop(transport);
        cancel.reset();
        info!(phase = %Phase::Idle, "session finished");

        outcome
    }

    fn drive(&mut self, detach_after_start: bool) -> Result<SessionReport, SessionError> {
        self.enter(Phase::SettingUp);
        self.transport
            .set_receive_params(ReceiveParams::cancellable(
                self.cancel.predicate(),
                self.config.poll_timeout,
            ))
            .map_err(SessionError::ReceiveParams)?;

        self.expect_ok(
            "set-max-packet-size",
            &Command::set_max_packet_size(self.config.max_packet_size),
        )?;
        let working_dir = Command::set_working_dir(&self.state.container_path);
        self.expect_ok("set-working-directory", &working_dir)?;

        for entry in self.state.environment_variables.clone() {
            debug!(%entry, "setting environment variable");
            self.best_effort("set-environment-variable", &Command::set_environment(&entry));
        }

        self.enter(Phase::Launching);
        for (index, arg) in self.state.process_arguments.iter().enumerate() {
            debug!(index, %arg, "argv");
        }
        let argv = Command::set_argv(&self.state.process_arguments);
        self.best_effort("set-arguments", &argv);
        self.expect_ok("launch-success", &Command::launch_success())?;

        if detach_after_start {
            info!("detaching from launched process");
            // The stub's answer to `D` does not change the outcome.
            self.best_effort("detach", &Command::detach());
            return Ok(SessionReport {
                end: SessionEnd::Detached,
                exit_status: None,
            });
        }

        self.expect_ok("set-thread", &Command::set_thread())?;
        let first = self.transport.send_command(&Command::continue_process());

        self.enter(Phase::Monitoring);
        let end = self.monitor(first);

        self.shutdown();

        Ok(SessionReport {
            end,
            exit_status: self.state.exit_status,
        })
    }

    fn monitor(&mut self, first: Result<Option<String>, TransportError>) -> SessionEnd {
        let mut received = first;
        loop {
            match received {
                Ok(Some(payload)) => {
                    if let Some(end) = self.handle_payload(&payload) {
                        return end;
                    }
                }
                Ok(None) => {}
                Err(error) if error.is_cancelled() => {
                    info!("cancellation observed while waiting for the stub");
                    return SessionEnd::Cancelled;
                }
                Err(error) => {
                    warn!(%error, "failed to receive response");
                    self.sink.log(DebugEvent::SessionFailed(format!(
                        "Lost connection to the debug server: {error}"
                    )));
                    return SessionEnd::ReceiveFailed(error.to_string());
                }
            }

            if self.cancel.is_requested() {
                info!("cancellation requested");
                return SessionEnd::Cancelled;
            }

            received = self.transport.receive_response();
        }
    }

    /// Forwards one monitoring payload to the sink; returns the end reason
    /// for terminal responses.
    fn handle_payload(&mut self, payload: &str) -> Option<SessionEnd> {
        debug!(%payload, "response");
        if payload.starts_with("OK") {
            return None;
        }

        let classified = classify(payload);
        self.report(&classified);
        if !classified.is_terminal() {
            return None;
        }

        self.state.exit_status = classified.exit_status();
        match classified {
            ClassifiedResponse::ThreadStopped(_) => Some(SessionEnd::Stopped),
            _ => Some(SessionEnd::Exited),
        }
    }

    fn report(&self, classified: &ClassifiedResponse) {
        match classified {
            ClassifiedResponse::Output(text) => {
                self.sink.log(DebugEvent::Output(text.clone()));
            }
            ClassifiedResponse::ThreadStopped(details) => {
                info!(%details, "thread stopped");
                self.sink.log(DebugEvent::ThreadStopped(details.clone()));
            }
            ClassifiedResponse::Error(message) => {
                warn!(%message, "stub reported an error");
                self.sink.log(DebugEvent::RemoteError(message.clone()));
            }
            ClassifiedResponse::ProcessExited { code, via_signal } => {
                info!(code, via_signal, "process exited");
                self.sink.log(DebugEvent::Exited {
                    code: *code,
                    via_signal: *via_signal,
                });
            }
            ClassifiedResponse::Empty => debug!("empty response"),
            ClassifiedResponse::Unrecognized(raw) => {
                warn!(%raw, "unhandled response");
                self.sink.log(DebugEvent::Unrecognized(raw.clone()));
            }
        }
    }

    /// Sends `command` and requires an `OK`-prefixed answer. A missing answer
    /// is accepted.
    fn expect_ok(&mut self, step: &'static str, command: &Command) -> Result<(), SessionError> {
        debug!(step, %command, "sending");
        match self.transport.send_command(command) {
            Ok(None) => Ok(()),
            Ok(Some(response)) if response.starts_with("OK") => Ok(()),
            Ok(Some(response)) => {
                self.report(&classify(&response));
                Err(SessionError::Rejected { step, response })
            }
            Err(source) => Err(SessionError::send(step, source)),
        }
    }

    /// Sends `command` and only logs whatever comes back.
    fn best_effort(&mut self, step: &'static str, command: &Command) {
        debug!(step, %command, "sending");
        match self.transport.send_command(command) {
            Ok(Some(response)) if !response.starts_with("OK") => {
                debug!(step, classified = ?classify(&response), "ignored response");
            }
            Ok(_) => {}
            Err(error) => warn!(step, %error, "best-effort command failed"),
        }
    }

    fn shutdown(&mut self) {
        self.enter(Phase::Interrupting);
        // Stop requests are no longer honoured from here on.
        if let Err(error) = self
            .transport
            .set_receive_params(ReceiveParams::uncancellable(self.config.shutdown_timeout))
        {
            warn!(%error, "could not reconfigure receive parameters for shutdown");
        }
        self.best_effort("interrupt", &Command::interrupt());

        self.enter(Phase::Killing);
        self.best_effort("kill", &Command::kill());
    }

    fn enter(&mut self, phase: Phase) {
        info!(from = %self.phase, to = %phase, "session phase");
        self.phase = phase;
    }
}
