use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::{BufMut, Bytes, BytesMut};
use nodelink_transport::{Publisher, TransportError};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::addr::Eui64;
use crate::checksum::crc16;
use crate::error::{FrameError, Result};

/// High bit of the fragment number: this is the final segment.
pub const LAST_FRAGMENT: u8 = 0x80;

/// First segment header: number, reserved byte, payload CRC16 (LE).
pub const FIRST_HEADER_SIZE: usize = 4;

/// Continuation segment header: number only.
pub const CONTINUATION_HEADER_SIZE: usize = 1;

/// Application port used for management traffic on the gateway.
pub const DEFAULT_RADIO_PORT: u16 = 0xBB;

const MAX_FRAGMENTS: usize = 128;

/// Configuration for the radio link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Application port stamped on every downlink. Default: 0xBB.
    pub port: u16,
    /// Request link-layer acknowledgement for downlinks.
    pub confirmed_tx: bool,
    /// Segment size used until the gateway reports an MTU. Default: 33.
    pub min_mtu: usize,
    /// Largest message sent without relying on a larger reported MTU.
    pub max_packet_out: usize,
    /// Largest message accepted from a device.
    pub max_packet_in: usize,
    /// Bytes of each message budget consumed by protocol headers.
    pub message_overhead: usize,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_RADIO_PORT,
            confirmed_tx: false,
            min_mtu: 33,
            max_packet_out: 128,
            max_packet_in: 2048,
            message_overhead: 21,
        }
    }
}

/// Header carried at the front of each radio segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    /// Running index, 0 for the first segment.
    pub number: u8,
    pub last: bool,
    /// CRC16 of the whole payload; present on the first segment only.
    pub checksum: Option<u16>,
}

impl FragmentHeader {
    pub fn first(checksum: u16, last: bool) -> Self {
        Self {
            number: 0,
            last,
            checksum: Some(checksum),
        }
    }

    pub fn continuation(number: u8, last: bool) -> Self {
        Self {
            number,
            last,
            checksum: None,
        }
    }

    pub fn size(&self) -> usize {
        if self.checksum.is_some() {
            FIRST_HEADER_SIZE
        } else {
            CONTINUATION_HEADER_SIZE
        }
    }

    pub fn write_to(&self, dst: &mut BytesMut) {
        let flag = if self.last { LAST_FRAGMENT } else { 0 };
        dst.put_u8(self.number | flag);
        if let Some(crc) = self.checksum {
            dst.put_u8(0);
            dst.put_u16_le(crc);
        }
    }

    /// Split a segment into its header and data slice.
    ///
    /// Segment 0 is parsed with the 4-byte header, any other number with
    /// the 1-byte header.
    pub fn parse(segment: &[u8]) -> Result<(Self, &[u8])> {
        let Some(&first) = segment.first() else {
            return Err(FrameError::InvalidLength(0));
        };
        let number = first & !LAST_FRAGMENT;
        let last = first & LAST_FRAGMENT != 0;
        if number != 0 {
            return Ok((Self::continuation(number, last), &segment[1..]));
        }
        if segment.len() < FIRST_HEADER_SIZE {
            return Err(FrameError::InvalidLength(segment.len()));
        }
        let crc = u16::from_le_bytes([segment[2], segment[3]]);
        Ok((Self::first(crc, last), &segment[FIRST_HEADER_SIZE..]))
    }
}

/// Cut a payload into headered segments of at most `segment_size` bytes.
///
/// An empty payload still produces one (header-only) final segment.
pub fn split_fragments(payload: &[u8], segment_size: usize) -> Result<Vec<Bytes>> {
    if segment_size <= FIRST_HEADER_SIZE {
        return Err(FrameError::InvalidSegmentSize {
            size: segment_size,
            min: FIRST_HEADER_SIZE + 1,
        });
    }

    let first_len = payload.len().min(segment_size - FIRST_HEADER_SIZE);
    let rest = &payload[first_len..];
    let count = 1 + rest.len().div_ceil(segment_size - CONTINUATION_HEADER_SIZE);
    if count > MAX_FRAGMENTS {
        return Err(FrameError::TooManyFragments(count));
    }

    let mut segments = Vec::with_capacity(count);
    let header = FragmentHeader::first(crc16(payload), rest.is_empty());
    segments.push(build_segment(header, &payload[..first_len]));

    let chunks = rest.chunks(segment_size - CONTINUATION_HEADER_SIZE);
    let total = chunks.len();
    for (i, chunk) in chunks.enumerate() {
        let header = FragmentHeader::continuation((i + 1) as u8, i + 1 == total);
        segments.push(build_segment(header, chunk));
    }
    Ok(segments)
}

fn build_segment(header: FragmentHeader, data: &[u8]) -> Bytes {
    let mut seg = BytesMut::with_capacity(header.size() + data.len());
    header.write_to(&mut seg);
    seg.put_slice(data);
    seg.freeze()
}

#[derive(Serialize)]
struct Downlink<'a> {
    port: u16,
    data: &'a str,
    ack: bool,
}

/// Wrap one segment in the gateway downlink command:
/// `lora/<dashed-eui>/down {"port":..,"data":"<base64>","ack":..}\n`.
pub fn downlink_envelope(dest: &Eui64, port: u16, ack: bool, segment: &[u8]) -> Result<Vec<u8>> {
    let data = STANDARD.encode(segment);
    let body = serde_json::to_string(&Downlink {
        port,
        data: &data,
        ack,
    })?;
    Ok(format!("lora/{}/down {}\n", dest.dashed(), body).into_bytes())
}

/// Publishes fragmented payloads to radio devices.
pub struct FragmentSender<P> {
    publisher: P,
    config: RadioConfig,
    send_lock: Mutex<()>,
}

impl<P: Publisher> FragmentSender<P> {
    pub fn new(publisher: P, config: RadioConfig) -> Self {
        Self {
            publisher,
            config,
            send_lock: Mutex::new(()),
        }
    }

    /// Fragment `payload` and publish every segment in order.
    ///
    /// Segments of one payload are never interleaved with another send.
    /// The first publish error aborts the remaining segments.
    pub fn send_fragmented(&self, dest: &Eui64, payload: &[u8], segment_size: usize) -> Result<usize> {
        let segments = split_fragments(payload, segment_size)?;
        let _guard = self
            .send_lock
            .lock()
            .map_err(|_| FrameError::Transport(TransportError::Poisoned))?;

        for (i, segment) in segments.iter().enumerate() {
            let envelope =
                downlink_envelope(dest, self.config.port, self.config.confirmed_tx, segment)?;
            trace!(%dest, index = i, len = segment.len(), "publishing segment");
            if let Err(err) = self.publisher.publish(&envelope) {
                debug!(%dest, index = i, total = segments.len(), error = %err, "segment publish failed");
                return Err(err.into());
            }
        }
        Ok(segments.len())
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn config(&self) -> &RadioConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn reassemble(segments: &[Bytes]) -> (Vec<u8>, u16) {
        let mut out = Vec::new();
        let mut crc = 0;
        for (i, seg) in segments.iter().enumerate() {
            let (header, data) = FragmentHeader::parse(seg).unwrap();
            assert_eq!(usize::from(header.number), i);
            assert_eq!(header.last, i + 1 == segments.len());
            if let Some(c) = header.checksum {
                crc = c;
            }
            out.extend_from_slice(data);
        }
        (out, crc)
    }

    #[test]
    fn short_payload_fits_first_segment() {
        let segments = split_fragments(b"abc", 20).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0][0], LAST_FRAGMENT);
        assert_eq!(segments[0][1], 0);
        assert_eq!(&segments[0][2..4], &crc16(b"abc").to_le_bytes());
        assert_eq!(&segments[0][4..], b"abc");
    }

    #[test]
    fn long_payload_spans_segments() {
        let payload: Vec<u8> = (0..100u8).collect();
        let segments = split_fragments(&payload, 20).unwrap();

        // 16 bytes in the first segment, then 84 / 19 -> 5 continuations
        assert_eq!(segments.len(), 6);
        assert_eq!(segments[0].len(), 20);
        assert!(segments.iter().all(|s| s.len() <= 20));
        assert_eq!(segments[5][0], 5 | LAST_FRAGMENT);

        let (joined, crc) = reassemble(&segments);
        assert_eq!(joined, payload);
        assert_eq!(crc, crc16(&payload));
    }

    #[test]
    fn exact_fit_sets_last_on_first() {
        let payload = [9u8; 16];
        let segments = split_fragments(&payload, 20).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0][0] & LAST_FRAGMENT, LAST_FRAGMENT);
    }

    #[test]
    fn empty_payload_is_single_header() {
        let segments = split_fragments(&[], 20).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].len(), FIRST_HEADER_SIZE);
        assert_eq!(segments[0][0], LAST_FRAGMENT);
    }

    #[test]
    fn tiny_segment_size_rejected() {
        assert!(matches!(
            split_fragments(b"abc", 4),
            Err(FrameError::InvalidSegmentSize { size: 4, min: 5 })
        ));
    }

    #[test]
    fn fragment_count_is_bounded() {
        // segment size 5: one byte in the first segment, four per continuation
        let payload = vec![0u8; 1 + 127 * 4 + 1];
        assert!(matches!(
            split_fragments(&payload, 5),
            Err(FrameError::TooManyFragments(129))
        ));
        assert_eq!(split_fragments(&payload[..1 + 127 * 4], 5).unwrap().len(), 128);
    }

    #[test]
    fn envelope_format() {
        let dest = Eui64::parse("0011223344556677").unwrap();
        let line = downlink_envelope(&dest, 0xBB, true, &[0x80, 0x00]).unwrap();
        assert_eq!(
            String::from_utf8(line).unwrap(),
            "lora/00-11-22-33-44-55-66-77/down {\"port\":187,\"data\":\"gAA=\",\"ack\":true}\n"
        );
    }

    fn recording() -> (Arc<Mutex<Vec<Vec<u8>>>>, impl Publisher) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let publisher = move |data: &[u8]| -> nodelink_transport::Result<()> {
            sink.lock().unwrap().push(data.to_vec());
            Ok(())
        };
        (seen, publisher)
    }

    #[test]
    fn sender_publishes_each_segment_in_order() {
        let (seen, publisher) = recording();
        let sender = FragmentSender::new(publisher, RadioConfig::default());
        let dest = Eui64::parse("aa:bb:cc:dd:ee:ff:00:11").unwrap();

        let sent = sender.send_fragmented(&dest, &[1u8; 50], 20).unwrap();
        assert_eq!(sent, 3);

        let lines = seen.lock().unwrap();
        assert_eq!(lines.len(), 3);
        for line in lines.iter() {
            let text = std::str::from_utf8(line).unwrap();
            assert!(text.starts_with("lora/aa-bb-cc-dd-ee-ff-00-11/down {"));
            assert!(text.ends_with("}\n"));
            let json = &text["lora/aa-bb-cc-dd-ee-ff-00-11/down ".len()..];
            let value: serde_json::Value = serde_json::from_str(json.trim_end()).unwrap();
            assert_eq!(value["port"], 187);
            assert_eq!(value["ack"], false);
        }
    }

    #[test]
    fn publish_error_aborts_remaining_segments() {
        let calls = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&calls);
        let publisher = move |_: &[u8]| -> nodelink_transport::Result<()> {
            let mut n = counter.lock().unwrap();
            *n += 1;
            if *n == 2 {
                return Err(TransportError::Shutdown);
            }
            Ok(())
        };
        let sender = FragmentSender::new(publisher, RadioConfig::default());
        let dest = Eui64::parse("0011223344556677").unwrap();

        let err = sender.send_fragmented(&dest, &[0u8; 100], 20).unwrap_err();
        assert!(matches!(err, FrameError::Transport(TransportError::Shutdown)));
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[test]
    fn parse_rejects_short_first_header() {
        assert!(FragmentHeader::parse(&[]).is_err());
        assert!(FragmentHeader::parse(&[0x80, 0x00]).is_err());
    }
}
