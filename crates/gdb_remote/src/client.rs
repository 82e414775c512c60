use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use devicebridge::{Command, DebugTransport, ReceiveParams, TransportError};
use tracing::{debug, trace, warn};

use crate::packet::{frame, Frame, PacketParser, INTERRUPT_BYTE};

/// Times a rejected packet is sent again before giving up.
pub const MAX_RETRANSMITS: u32 = 3;

const READ_CHUNK: usize = 4096;
const INITIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Blocking GDB-remote client over one TCP stream.
pub struct TcpDebugClient {
    stream: TcpStream,
    parser: PacketParser,
    pending: VecDeque<String>,
    params: ReceiveParams,
    last_sent: Option<Vec<u8>>,
    retransmits: u32,
}

impl TcpDebugClient {
    /// Connects to the first resolved address that accepts within `timeout`.
    pub fn connect(address: &str, timeout: Duration) -> io::Result<Self> {
        let mut last_error = None;
        for candidate in address.to_socket_addrs()? {
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => return Self::from_stream(stream),
                Err(error) => {
                    debug!(%candidate, %error, "connect attempt failed");
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("'{address}' did not resolve to any address"),
            )
        }))
    }

    pub fn from_stream(stream: TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            parser: PacketParser::default(),
            pending: VecDeque::new(),
            params: ReceiveParams::uncancellable(INITIAL_TIMEOUT),
            last_sent: None,
            retransmits: 0,
        })
    }

    fn write_all(&mut self, bytes: &[u8], operation: &'static str) -> Result<(), TransportError> {
        self.stream
            .write_all(bytes)
            .map_err(|error| TransportError::io(operation, error))
    }

    /// Waits for the next packet, slicing the wait by the receive timeout.
    fn wait_packet(&mut self) -> Result<String, TransportError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(packet) = self.pending.pop_front() {
                return Ok(packet);
            }
            if self.params.is_cancelled() {
                return Err(TransportError::Cancelled);
            }

            self.stream
                .set_read_timeout(Some(self.params.timeout))
                .map_err(|error| TransportError::io("setting read timeout", error))?;

            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(read) => self.absorb(&chunk[..read])?,
                Err(error)
                    if matches!(
                        error.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    if self.params.cancel.is_none() {
                        return Err(TransportError::Timeout {
                            timeout_ms: u64::try_from(self.params.timeout.as_millis())
                                .unwrap_or(u64::MAX),
                        });
                    }
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return Err(TransportError::io("reading from debug stub", error)),
            }
        }
    }

    /// Drops packets that arrived before the next command goes out, so a
    /// command is only ever paired with what the stub sends after it.
    fn discard_unsolicited(&mut self) -> Result<(), TransportError> {
        let mut buffered = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        self.stream
            .set_nonblocking(true)
            .map_err(|error| TransportError::io("draining stale input", error))?;
        let drained = loop {
            match self.stream.read(&mut chunk) {
                // A closed stream is reported by the wait that follows.
                Ok(0) => break Ok(()),
                Ok(read) => buffered.extend_from_slice(&chunk[..read]),
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => break Err(TransportError::io("draining stale input", error)),
            }
        };
        self.stream
            .set_nonblocking(false)
            .map_err(|error| TransportError::io("draining stale input", error))?;
        drained?;

        self.absorb(&buffered)?;
        for packet in self.pending.drain(..) {
            debug!(%packet, "discarding unsolicited packet");
        }
        Ok(())
    }

    fn absorb(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        for frame in self.parser.feed(bytes) {
            match frame {
                Frame::Packet(payload) => {
                    trace!(%payload, "received packet");
                    self.write_all(b"+", "acknowledging packet")?;
                    self.pending.push_back(payload);
                }
                Frame::Corrupt { expected, actual } => {
                    warn!(%expected, actual = %format!("{actual:02x}"), "checksum mismatch");
                    self.write_all(b"-", "rejecting packet")?;
                }
                Frame::Ack => self.retransmits = 0,
                Frame::Nack => self.retransmit()?,
                Frame::Interrupt => debug!("ignoring interrupt byte from stub"),
            }
        }
        Ok(())
    }

    fn retransmit(&mut self) -> Result<(), TransportError> {
        let Some(packet) = self.last_sent.clone() else {
            debug!("nack with nothing to retransmit");
            return Ok(());
        };
        if self.retransmits >= MAX_RETRANSMITS {
            return Err(TransportError::Protocol(format!(
                "packet rejected {} times",
                MAX_RETRANSMITS + 1
            )));
        }

        self.retransmits += 1;
        warn!(attempt = self.retransmits, "stub rejected packet, retransmitting");
        self.write_all(&packet, "retransmitting packet")
    }
}

impl DebugTransport for TcpDebugClient {
    fn set_receive_params(&mut self, params: ReceiveParams) -> Result<(), TransportError> {
        if params.timeout.is_zero() {
            return Err(TransportError::Config(
                "receive timeout must be greater than zero".to_string(),
            ));
        }
        debug!(?params, "receive params");
        self.params = params;
        Ok(())
    }

    fn send_command(&mut self, command: &Command) -> Result<Option<String>, TransportError> {
        if command.is_interrupt() {
            self.last_sent = None;
            self.write_all(&[INTERRUPT_BYTE], "sending interrupt")?;
        } else {
            self.discard_unsolicited()?;
            let packet = frame(&command.encode());
            self.write_all(&packet, "sending packet")?;
            self.last_sent = Some(packet);
        }
        self.retransmits = 0;
        trace!(%command, "sent");

        self.wait_packet().map(Some)
    }

    fn receive_response(&mut self) -> Result<Option<String>, TransportError> {
        self.wait_packet().map(Some)
    }
}

impl Drop for TcpDebugClient {
    fn drop(&mut self) {
        if let Err(error) = self.stream.shutdown(Shutdown::Both) {
            debug!(%error, "debug stub connection already closed");
        }
    }
}
