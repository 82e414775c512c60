//! Hex string codec used by the remote protocol.
//!
//! Process output (`O` packets), exit payloads (`W`/`X`), environment entries
//! and argv entries all travel as pairs of hex digits, one pair per byte.

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Decodes hex-digit pairs into raw bytes.
///
/// Returns `None` for odd-length input or any non-hex character.
#[must_use]
pub fn decode_bytes(encoded: &str) -> Option<Vec<u8>> {
    let bytes = encoded.as_bytes();
    if bytes.len() % 2 != 0 {
        return None;
    }

    bytes
        .chunks_exact(2)
        .map(|pair| Some((hex_value(pair[0])? << 4) | hex_value(pair[1])?))
        .collect()
}

/// Decodes hex-digit pairs into text. Invalid UTF-8 sequences are replaced.
#[must_use]
pub fn decode(encoded: &str) -> Option<String> {
    decode_bytes(encoded).map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// Encodes arbitrary text as lower-case hex-digit pairs.
#[must_use]
pub fn encode_hex(text: &str) -> String {
    encode_hex_bytes(text.as_bytes())
}

#[must_use]
pub fn encode_hex_bytes(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        encoded.push(HEX_DIGITS[usize::from(byte >> 4)] as char);
        encoded.push(HEX_DIGITS[usize::from(byte & 0x0f)] as char);
    }
    encoded
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}
