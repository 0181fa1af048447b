use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::checksum::crc16;
use crate::error::{FrameError, Result};

/// Marker opening the first line of a frame.
pub const START_MARKER: [u8; 2] = [0x06, 0x09];

/// Marker opening every following line of a frame.
pub const CONTINUATION_MARKER: [u8; 2] = [0x04, 0x14];

/// Base64 characters carried per line.
pub const DEFAULT_BURST_SIZE: usize = 124;

/// Default serial MTU reported to sessions.
pub const DEFAULT_SERIAL_MTU: usize = 512;

/// Size of the big-endian length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 2;

/// Size of the trailing CRC16.
pub const CHECKSUM_SIZE: usize = 2;

/// Largest payload whose framed length still fits the 16-bit length field.
pub const MAX_SERIAL_PAYLOAD: usize = u16::MAX as usize - CHECKSUM_SIZE;

/// Configuration for serial framing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Idle timeout for a blocking receive. Default: 10 seconds.
    pub read_timeout: Option<Duration>,
    /// MTU reported for the link. Default: 512.
    pub mtu: usize,
    /// Base64 characters per line; must be a positive multiple of 4.
    pub burst_size: usize,
    /// Pause between consecutive lines of one frame. Default: 20 ms.
    pub burst_delay: Duration,
    /// Largest payload accepted in either direction.
    pub max_payload_size: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            read_timeout: Some(Duration::from_secs(10)),
            mtu: DEFAULT_SERIAL_MTU,
            burst_size: DEFAULT_BURST_SIZE,
            burst_delay: Duration::from_millis(20),
            max_payload_size: MAX_SERIAL_PAYLOAD,
        }
    }
}

/// Encode a payload into newline-terminated serial lines.
///
/// Wire format, before base64:
/// ```text
/// ┌──────────────┬──────────────────┬──────────────┐
/// │ Length (2B)  │ Payload          │ CRC16 (2B)   │
/// │ BE, incl CRC │                  │ BE           │
/// └──────────────┴──────────────────┴──────────────┘
/// ```
/// The base64 text is cut into `burst_size` chunks; the first line starts
/// with [`START_MARKER`], the rest with [`CONTINUATION_MARKER`].
pub fn encode_frame(payload: &[u8], burst_size: usize) -> Result<Vec<Bytes>> {
    if burst_size == 0 || burst_size % 4 != 0 {
        return Err(FrameError::InvalidBurstSize(burst_size));
    }
    if payload.len() > MAX_SERIAL_PAYLOAD {
        return Err(FrameError::FrameTooLarge {
            size: payload.len(),
            max: MAX_SERIAL_PAYLOAD,
        });
    }

    let framed_len = payload.len() + CHECKSUM_SIZE;
    let mut body = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + framed_len);
    body.put_u16(framed_len as u16);
    body.put_slice(payload);
    body.put_u16(crc16(payload));

    let text = STANDARD.encode(&body);
    let lines = text
        .as_bytes()
        .chunks(burst_size)
        .enumerate()
        .map(|(i, chunk)| {
            let mut line = BytesMut::with_capacity(START_MARKER.len() + chunk.len() + 1);
            line.put_slice(if i == 0 {
                &START_MARKER
            } else {
                &CONTINUATION_MARKER
            });
            line.put_slice(chunk);
            line.put_u8(b'\n');
            line.freeze()
        })
        .collect();
    Ok(lines)
}

/// Role of a received line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineKind {
    Start,
    Continuation,
}

/// Split a trimmed line into its marker kind and base64 text.
/// Lines without a recognized marker yield `None`.
pub(crate) fn classify_line(line: &[u8]) -> Option<(LineKind, &[u8])> {
    if line.len() < 2 {
        return None;
    }
    let (marker, rest) = line.split_at(2);
    if marker == START_MARKER {
        Some((LineKind::Start, rest))
    } else if marker == CONTINUATION_MARKER {
        Some((LineKind::Continuation, rest))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_lines(lines: &[Bytes]) -> Vec<u8> {
        let mut out = Vec::new();
        for line in lines {
            let (_, text) = classify_line(&line[..line.len() - 1]).unwrap();
            out.extend(STANDARD.decode(text).unwrap());
        }
        out
    }

    #[test]
    fn short_payload_is_one_start_line() {
        let lines = encode_frame(b"hi", DEFAULT_BURST_SIZE).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(&lines[0][..2], &START_MARKER);
        assert_eq!(lines[0].last(), Some(&b'\n'));

        let body = decode_lines(&lines);
        assert_eq!(&body[..2], &[0x00, 0x04]);
        assert_eq!(&body[2..4], b"hi");
        assert_eq!(crc16(&body[2..]), 0);
    }

    #[test]
    fn long_payload_splits_into_continuation_lines() {
        let payload = vec![0x5A; 300];
        let lines = encode_frame(&payload, DEFAULT_BURST_SIZE).unwrap();

        // 304 bytes -> 408 base64 chars -> 124 + 124 + 124 + 36
        assert_eq!(lines.len(), 4);
        assert_eq!(&lines[0][..2], &START_MARKER);
        for line in &lines[1..] {
            assert_eq!(&line[..2], &CONTINUATION_MARKER);
        }
        for line in &lines[..3] {
            assert_eq!(line.len(), 2 + DEFAULT_BURST_SIZE + 1);
        }

        let body = decode_lines(&lines);
        assert_eq!(u16::from_be_bytes([body[0], body[1]]), 302);
        assert_eq!(&body[2..302], payload.as_slice());
    }

    #[test]
    fn burst_size_must_be_multiple_of_four() {
        assert!(matches!(
            encode_frame(b"x", 10),
            Err(FrameError::InvalidBurstSize(10))
        ));
        assert!(matches!(
            encode_frame(b"x", 0),
            Err(FrameError::InvalidBurstSize(0))
        ));
    }

    #[test]
    fn oversized_payload_rejected() {
        let payload = vec![0u8; MAX_SERIAL_PAYLOAD + 1];
        assert!(matches!(
            encode_frame(&payload, DEFAULT_BURST_SIZE),
            Err(FrameError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn classify_recognizes_markers_only() {
        assert_eq!(
            classify_line(b"\x06\x09AAAA"),
            Some((LineKind::Start, &b"AAAA"[..]))
        );
        assert_eq!(
            classify_line(b"\x04\x14AAAA"),
            Some((LineKind::Continuation, &b"AAAA"[..]))
        );
        assert_eq!(classify_line(b"log output"), None);
        assert_eq!(classify_line(b"\x06"), None);
    }

    #[test]
    fn config_defaults() {
        let config = SerialConfig::default();
        assert_eq!(config.read_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.mtu, 512);
        assert_eq!(config.burst_size, 124);
        assert_eq!(config.burst_delay, Duration::from_millis(20));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: SerialConfig = serde_json::from_str(r#"{"mtu": 256}"#).unwrap();
        assert_eq!(config.mtu, 256);
        assert_eq!(config.burst_size, DEFAULT_BURST_SIZE);
    }
}
