use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: magic (2) + length (4) + message id (4) = 10 bytes.
pub const HEADER_SIZE: usize = 10;

/// Magic bytes: "RL" (0x52 0x4C).
pub const MAGIC: [u8; 2] = [0x52, 0x4C];

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Default line delimiter.
pub const DEFAULT_DELIMITER: u8 = b'\n';

/// One decoded message. `id` correlates requests with responses when several
/// calls share the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: u32,
    pub payload: Bytes,
}

impl Message {
    pub fn new(id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }
}

/// Encode a length-prefixed message.
///
/// Wire format:
/// ```text
/// ┌────────────┬─────────────┬─────────────┬────────────────┐
/// │ Magic (2B) │ Length      │ Message id  │ Payload        │
/// │ "RL"       │ (4B LE)     │ (4B LE)     │ (Length bytes) │
/// └────────────┴─────────────┴─────────────┴────────────────┘
/// ```
pub fn encode_message(id: u32, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(payload.len() as u32);
    dst.put_u32_le(id);
    dst.put_slice(payload);
    Ok(())
}

/// Parsed header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub payload_len: usize,
    pub id: u32,
}

/// Validate and parse a header.
pub fn parse_header(header: &[u8; HEADER_SIZE], max_payload: usize) -> Result<Header> {
    if header[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }
    let payload_len = u32::from_le_bytes([header[2], header[3], header[4], header[5]]) as usize;
    let id = u32::from_le_bytes([header[6], header[7], header[8], header[9]]);
    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }
    Ok(Header { payload_len, id })
}

/// Decode a message from an accumulated buffer.
///
/// Returns `Ok(None)` if the buffer doesn't hold a complete message yet.
/// On success, consumes the message bytes from the buffer.
pub fn decode_message(src: &mut BytesMut, max_payload: usize) -> Result<Option<Message>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }
    let mut header = [0u8; HEADER_SIZE];
    header.copy_from_slice(&src[..HEADER_SIZE]);
    let Header { payload_len, id } = parse_header(&header, max_payload)?;

    if src.len() < HEADER_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();
    Ok(Some(Message { id, payload }))
}

/// Configuration shared by the protocol handlers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Message separator for [`LineHandler`](crate::LineHandler). Default: `\n`.
    pub delimiter: u8,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            delimiter: DEFAULT_DELIMITER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let mut buf = BytesMut::new();
        encode_message(0x0102_0304, b"abc", &mut buf).unwrap();

        assert_eq!(buf.len(), HEADER_SIZE + 3);
        assert_eq!(&buf[0..2], b"RL");
        assert_eq!(&buf[2..6], &[3, 0, 0, 0]);
        assert_eq!(&buf[6..10], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&buf[10..], b"abc");
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut buf = BytesMut::from(&[0x52, 0x4C, 0x00][..]);
        assert!(decode_message(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let mut buf = BytesMut::new();
        encode_message(1, b"hello", &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);

        assert!(decode_message(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
    }

    #[test]
    fn test_decode_invalid_magic() {
        let mut buf = BytesMut::from(&[0xFF; HEADER_SIZE][..]);
        let result = decode_message(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::InvalidMagic)));
    }

    #[test]
    fn test_header_payload_too_large() {
        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC);
        buf.put_u32_le(1024);
        buf.put_u32_le(9);
        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&buf);

        let result = parse_header(&header, 16);
        assert!(matches!(
            result,
            Err(FrameError::PayloadTooLarge { size: 1024, max: 16 })
        ));
    }

    #[test]
    fn test_back_to_back_messages() {
        let mut buf = BytesMut::new();
        encode_message(1, b"first", &mut buf).unwrap();
        encode_message(2, b"", &mut buf).unwrap();

        let m1 = decode_message(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        let m2 = decode_message(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(m1, Message::new(1, &b"first"[..]));
        assert_eq!(m2.id, 2);
        assert!(m2.payload.is_empty());
        assert!(buf.is_empty());
    }
}
