//! Transport contract consumed by the session controller.
//!
//! Device discovery, service startup and packet framing live behind these
//! traits. Releasing a stub handle is tied to dropping the boxed transport.

use std::fmt;
use std::time::Duration;

use crate::command::Command;
use crate::error::TransportError;

/// Polled by a blocking receive; returning true aborts the wait.
pub type CancelPredicate = Box<dyn Fn() -> bool + Send>;

/// How a blocking receive waits for the next packet.
pub struct ReceiveParams {
    pub cancel: Option<CancelPredicate>,
    pub timeout: Duration,
}

impl ReceiveParams {
    /// Waits in `timeout` slices and stops once `cancel` returns true.
    #[must_use]
    pub fn cancellable(cancel: CancelPredicate, timeout: Duration) -> Self {
        Self {
            cancel: Some(cancel),
            timeout,
        }
    }

    /// Waits at most one `timeout` and ignores cancellation.
    #[must_use]
    pub fn uncancellable(timeout: Duration) -> Self {
        Self {
            cancel: None,
            timeout,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|cancel| cancel())
    }
}

impl fmt::Debug for ReceiveParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiveParams")
            .field("cancellable", &self.cancel.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// An open connection to a debug stub.
pub trait DebugTransport: Send {
    fn set_receive_params(&mut self, params: ReceiveParams) -> Result<(), TransportError>;

    /// Sends `command` and waits for its response.
    ///
    /// `Ok(None)` means the stub accepted the command without replying.
    fn send_command(&mut self, command: &Command) -> Result<Option<String>, TransportError>;

    /// Blocks for the next unsolicited packet under the current receive params.
    fn receive_response(&mut self) -> Result<Option<String>, TransportError>;
}

/// Starts the debug-stub service on a device and opens a transport to it.
pub trait DebugStubConnector: Send + Sync + 'static {
    fn start_debug_stub(&self, service_name: &str)
        -> Result<Box<dyn DebugTransport>, TransportError>;
}
