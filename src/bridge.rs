//! Application-facing entry points: start and stop a debugging session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::cancel::CancellationFlag;
use crate::catalog::AppCatalog;
use crate::config::{BridgeConfig, SessionConfig};
use crate::error::SessionError;
use crate::pool::WorkerPool;
use crate::session::{run_session, LaunchRequest, SessionReport};
use crate::sink::{DebugEvent, LogSink};
use crate::transport::DebugStubConnector;

pub type SessionResult = Result<SessionReport, SessionError>;

/// Completion signal of a submitted session. Dropping it is fine.
#[derive(Debug)]
pub struct SessionTicket {
    receiver: Receiver<SessionResult>,
}

impl SessionTicket {
    fn ready(result: SessionResult) -> Self {
        let (sender, receiver) = mpsc::channel();
        let _ = sender.send(result);
        Self { receiver }
    }

    /// Blocks until the session has fully shut down.
    pub fn wait(self) -> SessionResult {
        self.receiver
            .recv()
            .unwrap_or(Err(SessionError::WorkerLost))
    }

    /// Like [`SessionTicket::wait`], giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<SessionResult> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(SessionError::WorkerLost)),
        }
    }
}

/// Runs debugging sessions for one device connection on a worker pool.
pub struct DeviceBridge {
    connector: Arc<dyn DebugStubConnector>,
    catalog: Arc<dyn AppCatalog>,
    sink: Arc<dyn LogSink>,
    config: Arc<SessionConfig>,
    cancel: CancellationFlag,
    active: Arc<AtomicBool>,
    pool: WorkerPool,
}

impl DeviceBridge {
    pub fn new(
        connector: Arc<dyn DebugStubConnector>,
        catalog: Arc<dyn AppCatalog>,
        sink: Arc<dyn LogSink>,
        config: BridgeConfig,
    ) -> std::io::Result<Self> {
        let pool = WorkerPool::new("devicebridge-worker", config.workers)?;
        Ok(Self {
            connector,
            catalog,
            sink,
            config: Arc::new(config.session),
            cancel: CancellationFlag::new(),
            active: Arc::new(AtomicBool::new(false)),
            pool,
        })
    }

    /// Launches `bundle_id` under the debug stub and monitors it in the
    /// background. Progress and output arrive on the log sink.
    pub fn start_debugging(
        &self,
        bundle_id: &str,
        detach_after_start: bool,
        environment: &str,
        arguments: &str,
    ) -> SessionTicket {
        let mut request = LaunchRequest::new(bundle_id)
            .with_environment(environment)
            .with_arguments(arguments);
        request.detach_after_start = detach_after_start;
        self.start(request)
    }

    pub fn start(&self, request: LaunchRequest) -> SessionTicket {
        if self.active.swap(true, Ordering::SeqCst) {
            warn!(bundle_id = %request.bundle_id, "session already running");
            let error = SessionError::AlreadyRunning;
            self.sink.log(DebugEvent::SessionFailed(error.to_string()));
            return SessionTicket::ready(Err(error));
        }
        // Any stop request seen before this point targeted no session.
        self.cancel.reset();

        let (sender, receiver) = mpsc::channel();
        let connector = Arc::clone(&self.connector);
        let catalog = Arc::clone(&self.catalog);
        let sink = Arc::clone(&self.sink);
        let config = Arc::clone(&self.config);
        let cancel = self.cancel.clone();
        let active = ActiveGuard(Arc::clone(&self.active));

        let submitted = self.pool.submit(move || {
            info!(bundle_id = %request.bundle_id, "debugging session started");
            let result = match catalog.lookup(&request.bundle_id) {
                Some(app) => run_session(
                    connector.as_ref(),
                    &app,
                    &request,
                    &config,
                    &cancel,
                    sink.as_ref(),
                ),
                None => {
                    let error = SessionError::UnknownBundle {
                        bundle_id: request.bundle_id.clone(),
                    };
                    sink.log(DebugEvent::SessionFailed(error.to_string()));
                    cancel.reset();
                    Err(error)
                }
            };
            drop(active);
            let _ = sender.send(result);
        });

        if !submitted {
            self.active.store(false, Ordering::SeqCst);
            return SessionTicket::ready(Err(SessionError::WorkerLost));
        }

        SessionTicket { receiver }
    }

    /// Asks the running session to stop. Returns immediately; the session
    /// notices within one poll timeout.
    pub fn stop_debugging(&self) {
        info!("stop requested");
        self.cancel.request();
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for DeviceBridge {
    fn drop(&mut self) {
        // Workers are joined when the pool drops; unblock a monitoring session first.
        if self.is_active() {
            self.cancel.request();
        }
    }
}

struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
