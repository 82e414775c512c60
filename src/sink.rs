//! Log-output interface for user-visible session events.

use std::fmt;
use std::sync::mpsc::Sender;

/// One user-visible event, delivered in receipt order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEvent {
    /// Decoded output of the target process.
    Output(String),
    ThreadStopped(String),
    /// Error reported by the stub (`E` packet).
    RemoteError(String),
    Exited { code: i32, via_signal: bool },
    /// Payload the session could not make sense of, passed through raw.
    Unrecognized(String),
    /// Setup, launch or transport failure with guidance for the user.
    SessionFailed(String),
}

impl fmt::Display for DebugEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Output(text) => f.write_str(text),
            Self::ThreadStopped(details) => write!(f, "Thread stopped. Details:\n{details}"),
            Self::RemoteError(message) => write!(f, "ERROR: {message}"),
            Self::Exited {
                code,
                via_signal: false,
            } => write!(f, "Exit status: {code}"),
            Self::Exited {
                code,
                via_signal: true,
            } => write!(f, "Exit due to signal: {code}"),
            Self::Unrecognized(raw) => write!(f, "Unhandled response: {raw}"),
            Self::SessionFailed(message) => f.write_str(message),
        }
    }
}

/// Receives session events. Called from the session worker thread.
pub trait LogSink: Send + Sync {
    fn log(&self, event: DebugEvent);
}

impl<F> LogSink for F
where
    F: Fn(DebugEvent) + Send + Sync,
{
    fn log(&self, event: DebugEvent) {
        self(event);
    }
}

/// Forwards events over a channel to whoever owns the receiving end.
#[derive(Debug)]
pub struct ChannelSink {
    sender: Sender<DebugEvent>,
}

impl ChannelSink {
    #[must_use]
    pub fn new(sender: Sender<DebugEvent>) -> Self {
        Self { sender }
    }
}

impl LogSink for ChannelSink {
    fn log(&self, event: DebugEvent) {
        // A dropped receiver means nobody is listening anymore.
        let _ = self.sender.send(event);
    }
}
