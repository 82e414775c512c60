//! GDB-remote packet framing.
//!
//! A packet is `$<escaped payload>#<checksum>`, where the checksum is the
//! modulo-256 sum of the escaped payload bytes as two lower-case hex digits.

/// Out-of-band interrupt request, sent unframed.
pub const INTERRUPT_BYTE: u8 = 0x03;

const ESCAPE: u8 = b'}';
const ESCAPE_XOR: u8 = 0x20;
const RUN_LENGTH: u8 = b'*';
const RUN_LENGTH_BIAS: u8 = 29;

/// Wraps `payload` into a wire packet.
#[must_use]
pub fn frame(payload: &str) -> Vec<u8> {
    let body = escape(payload.as_bytes());
    let sum = checksum(&body);
    let mut framed = Vec::with_capacity(body.len() + 4);
    framed.push(b'$');
    framed.extend_from_slice(&body);
    framed.push(b'#');
    framed.extend_from_slice(format!("{sum:02x}").as_bytes());
    framed
}

#[must_use]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, byte| sum.wrapping_add(*byte))
}

fn escape(payload: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(payload.len());
    for &byte in payload {
        if matches!(byte, b'#' | b'$' | ESCAPE | RUN_LENGTH) {
            escaped.push(ESCAPE);
            escaped.push(byte ^ ESCAPE_XOR);
        } else {
            escaped.push(byte);
        }
    }
    escaped
}

/// Undoes escaping and run-length encoding of a received packet body.
fn expand(body: &[u8]) -> Vec<u8> {
    let mut expanded = Vec::with_capacity(body.len());
    let mut bytes = body.iter().copied();
    while let Some(byte) = bytes.next() {
        match byte {
            ESCAPE => {
                if let Some(next) = bytes.next() {
                    expanded.push(next ^ ESCAPE_XOR);
                }
            }
            RUN_LENGTH => {
                let (Some(count), Some(&last)) = (bytes.next(), expanded.last()) else {
                    continue;
                };
                let repeats = usize::from(count.saturating_sub(RUN_LENGTH_BIAS));
                expanded.extend(std::iter::repeat(last).take(repeats));
            }
            _ => expanded.push(byte),
        }
    }
    expanded
}

/// One unit read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Ack,
    Nack,
    Interrupt,
    Packet(String),
    /// Packet whose checksum did not match; the peer should be sent a nack.
    Corrupt { expected: String, actual: u8 },
}

/// Incremental parser for the byte stream coming from a debug stub.
#[derive(Debug, Default)]
pub struct PacketParser {
    buffer: Vec<u8>,
}

impl PacketParser {
    /// Feed arbitrary bytes into the parser and drain complete frames.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }
        frames
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.is_empty()
    }

    fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match *self.buffer.first()? {
                b'+' => {
                    self.buffer.remove(0);
                    return Some(Frame::Ack);
                }
                b'-' => {
                    self.buffer.remove(0);
                    return Some(Frame::Nack);
                }
                INTERRUPT_BYTE => {
                    self.buffer.remove(0);
                    return Some(Frame::Interrupt);
                }
                b'$' => return self.take_packet(),
                _ => {
                    // Noise between packets.
                    self.buffer.remove(0);
                }
            }
        }
    }

    fn take_packet(&mut self) -> Option<Frame> {
        let hash = self.buffer.iter().skip(1).position(|byte| *byte == b'#')? + 1;
        if self.buffer.len() < hash + 3 {
            return None;
        }

        let packet: Vec<u8> = self.buffer.drain(..hash + 3).collect();
        let body = &packet[1..hash];
        let digit_bytes = &packet[hash + 1..];
        let digits = String::from_utf8_lossy(digit_bytes).into_owned();
        let actual = checksum(body);

        let declared = if digit_bytes.iter().all(u8::is_ascii_hexdigit) {
            u8::from_str_radix(&digits, 16).ok()
        } else {
            None
        };
        if declared != Some(actual) {
            return Some(Frame::Corrupt {
                expected: digits,
                actual,
            });
        }

        Some(Frame::Packet(
            String::from_utf8_lossy(&expand(body)).into_owned(),
        ))
    }
}
