//! Remote process control over a GDB-remote debug stub.
//!
//! The engine configures, launches, monitors and terminates one process on an
//! attached device by talking to the device's debug stub.
//!
//! # Public API Overview
//! - [`DeviceBridge`] runs sessions on a worker pool: `start_debugging` and
//!   `stop_debugging`.
//! - [`SessionController`] is the per-session state machine; [`run_session`]
//!   starts the stub and drives it.
//! - [`classify`] maps a response payload to a [`ClassifiedResponse`].
//! - [`Command`] builds wire-ready requests; [`codec`] holds the hex codec.
//! - [`DebugTransport`] and [`DebugStubConnector`] are the transport seam;
//!   `gdb_remote` implements them over TCP.
//!
//! Invariant: the cancellation flag handed to a session is false again once
//! that session has ended, whatever the outcome.

pub mod bridge;
pub mod cancel;
pub mod catalog;
pub mod classify;
pub mod codec;
pub mod command;
pub mod config;
pub mod error;
pub mod pool;
pub mod session;
pub mod sink;
pub mod transport;

pub use crate::bridge::{DeviceBridge, SessionResult, SessionTicket};
pub use crate::cancel::CancellationFlag;
pub use crate::catalog::{AppCatalog, InstalledApp, JsonAppCatalog};
pub use crate::classify::{classify, ClassifiedResponse, ABNORMAL_STOP_EXIT_STATUS};
pub use crate::command::Command;
pub use crate::config::{BridgeConfig, SessionConfig};
pub use crate::error::{CatalogError, ConfigError, SessionError, TransportError};
pub use crate::pool::WorkerPool;
pub use crate::session::{
    run_session, LaunchRequest, SessionController, SessionEnd, SessionReport, SessionState,
};
pub use crate::sink::{ChannelSink, DebugEvent, LogSink};
pub use crate::transport::{CancelPredicate, DebugStubConnector, DebugTransport, ReceiveParams};
