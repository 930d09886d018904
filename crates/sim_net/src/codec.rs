//! MessagePack codec helpers and packet framing.
//!
//! All network payloads use MessagePack. A packet on the wire is the
//! string-table id of the message name as an unsigned LEB128 varint,
//! followed by the MessagePack body:
//!
//! ```text
//! ┌──────────────────┬──────────────────────────┐
//! │ id (LEB128, 1-5B)│ body (MessagePack)       │
//! └──────────────────┴──────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::NetError;

/// Encode a value to MessagePack bytes.
///
/// # Errors
///
/// Returns [`NetError::Encode`] if serialisation fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, NetError> {
    rmp_serde::to_vec_named(value).map_err(NetError::Encode)
}

/// Decode a value from MessagePack bytes.
///
/// # Errors
///
/// Returns [`NetError::Decode`] if deserialisation fails.
pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, NetError> {
    rmp_serde::from_slice(bytes).map_err(NetError::Decode)
}

/// Append `value` to `buf` as an unsigned LEB128 varint.
pub fn write_varint(buf: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Read an unsigned LEB128 varint from the front of `bytes`.
///
/// Returns the value and the number of bytes consumed.
///
/// # Errors
///
/// Returns [`NetError::MalformedFrame`] if the varint is truncated or does
/// not fit in a `u32`.
pub fn read_varint(bytes: &[u8]) -> Result<(u32, usize), NetError> {
    let mut value: u32 = 0;
    for (i, byte) in bytes.iter().enumerate().take(5) {
        let bits = u32::from(byte & 0x7f);
        if i == 4 && bits > 0x0f {
            return Err(NetError::MalformedFrame("varint overflows u32"));
        }
        value |= bits << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(NetError::MalformedFrame("truncated varint"))
}

/// Build a frame from a message id and an already-encoded body.
#[must_use]
pub fn encode_frame(id: u32, body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(body.len() + 2);
    write_varint(&mut frame, id);
    frame.extend_from_slice(body);
    frame
}

/// Split a frame into its message id and body.
///
/// # Errors
///
/// Returns [`NetError::MalformedFrame`] for an empty frame or a bad id.
pub fn decode_frame(frame: &[u8]) -> Result<(u32, &[u8]), NetError> {
    if frame.is_empty() {
        return Err(NetError::MalformedFrame("empty packet"));
    }
    let (id, used) = read_varint(frame)?;
    Ok((id, &frame[used..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct TestMsg {
        value: u32,
        name: String,
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let msg = TestMsg {
            value: 42,
            name: "hello".to_string(),
        };
        let bytes = encode(&msg).unwrap();
        let restored: TestMsg = decode(&bytes).unwrap();
        assert_eq!(msg, restored);
    }

    #[test]
    fn test_decode_invalid_bytes() {
        let result: Result<TestMsg, _> = decode(&[0xFF, 0xFF]);
        assert!(result.is_err());
    }

    #[test]
    fn test_varint_boundaries() {
        for (value, len) in [(0u32, 1usize), (127, 1), (128, 2), (16_383, 2), (16_384, 3), (u32::MAX, 5)] {
            let mut buf = Vec::new();
            write_varint(&mut buf, value);
            assert_eq!(buf.len(), len, "length for {value}");
            assert_eq!(read_varint(&buf).unwrap(), (value, len));
        }
    }

    #[test]
    fn test_truncated_varint_rejected() {
        assert!(matches!(
            read_varint(&[0x80, 0x80]),
            Err(NetError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_frame_split() {
        let frame = encode_frame(300, &[1, 2, 3]);
        let (id, body) = decode_frame(&frame).unwrap();
        assert_eq!(id, 300);
        assert_eq!(body, &[1, 2, 3]);
    }

    #[test]
    fn test_empty_frame_rejected() {
        assert!(matches!(
            decode_frame(&[]),
            Err(NetError::MalformedFrame("empty packet"))
        ));
    }
}
