//! Classification of decoded stub responses.
//!
//! Dispatch is on the first byte of the payload, which the remote protocol
//! defines as the response-type tag.

use crate::codec;

/// Exit status reported when the stub stops a thread abnormally
/// (shell convention: 128 + signal number).
pub const ABNORMAL_STOP_EXIT_STATUS: i32 = 128 + libc::SIGABRT;

/// Offset added to a terminating signal number to form an exit status.
pub const SIGNAL_EXIT_OFFSET: i32 = 128;

/// Semantic category of one response payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedResponse {
    /// Decoded stdout/stderr text from the target process.
    Output(String),
    /// Thread stop report; the raw details follow the `T` tag.
    ThreadStopped(String),
    /// Protocol-level error code or message.
    Error(String),
    ProcessExited { code: i32, via_signal: bool },
    Empty,
    Unrecognized(String),
}

impl ClassifiedResponse {
    /// True for responses that end the monitoring loop.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ThreadStopped(_) | Self::ProcessExited { .. })
    }

    /// Exit status implied by a terminal response.
    #[must_use]
    pub fn exit_status(&self) -> Option<i32> {
        match self {
            Self::ProcessExited { code, .. } => Some(*code),
            Self::ThreadStopped(_) => Some(ABNORMAL_STOP_EXIT_STATUS),
            Self::Output(_) | Self::Error(_) | Self::Empty | Self::Unrecognized(_) => None,
        }
    }
}

/// Maps a payload to exactly one [`ClassifiedResponse`]. Never fails.
#[must_use]
pub fn classify(payload: &str) -> ClassifiedResponse {
    let Some(tag) = payload.chars().next() else {
        return ClassifiedResponse::Empty;
    };
    let rest = &payload[tag.len_utf8()..];

    match tag {
        'O' => match codec::decode(rest) {
            Some(text) => ClassifiedResponse::Output(text),
            None => ClassifiedResponse::Unrecognized(payload.to_string()),
        },
        'T' => ClassifiedResponse::ThreadStopped(rest.to_string()),
        'E' => ClassifiedResponse::Error(rest.to_string()),
        'W' | 'X' => {
            let via_signal = tag == 'X';
            match exit_byte(rest) {
                Some(value) => ClassifiedResponse::ProcessExited {
                    code: i32::from(value) + if via_signal { SIGNAL_EXIT_OFFSET } else { 0 },
                    via_signal,
                },
                None => ClassifiedResponse::Unrecognized(payload.to_string()),
            }
        }
        _ => ClassifiedResponse::Unrecognized(payload.to_string()),
    }
}

/// First decoded byte of an exit payload. `;key:value` suffixes are ignored.
fn exit_byte(rest: &str) -> Option<u8> {
    let value = rest.split(';').next().unwrap_or_default();
    codec::decode_bytes(value)?.first().copied()
}
