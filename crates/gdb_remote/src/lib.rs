//! GDB-remote transport for `devicebridge` over a TCP connection.
//!
//! [`TcpDebugClient`] frames commands, acknowledges and checksums replies,
//! and honours the receive parameters the session sets. [`TcpStubConnector`]
//! opens one client per session against a debug stub that has already been
//! exposed on a socket (for example through a USB port forward).

pub mod client;
pub mod connector;
pub mod packet;

pub use client::TcpDebugClient;
pub use connector::TcpStubConnector;
pub use packet::{frame, Frame, PacketParser, INTERRUPT_BYTE};
