use std::io::{BufRead, BufReader, ErrorKind, Read};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use nodelink_transport::Port;
use tracing::{debug, trace, warn};

use crate::checksum::crc16;
use crate::codec::{
    classify_line, LineKind, SerialConfig, CHECKSUM_SIZE, LENGTH_PREFIX_SIZE, START_MARKER,
};
use crate::error::{FrameError, Result};
use crate::packet::Packet;

const LINE_BUFFER_CAPACITY: usize = 4 * 1024;

/// Reads framed payloads from serial lines on any `Read` stream.
///
/// Lines without a marker (device console output) are skipped. Callers
/// always get complete, checksum-verified payloads.
pub struct SerialFrameReader<T> {
    lines: BufReader<T>,
    line: Vec<u8>,
    packet: Option<Packet>,
    config: SerialConfig,
    max_line: usize,
    overlong: bool,
}

impl<T: Read> SerialFrameReader<T> {
    /// Create a new reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, SerialConfig::default())
    }

    /// Create a new reader with explicit configuration.
    pub fn with_config(inner: T, config: SerialConfig) -> Self {
        Self {
            lines: BufReader::with_capacity(LINE_BUFFER_CAPACITY, inner),
            line: Vec::with_capacity(LINE_BUFFER_CAPACITY),
            packet: None,
            max_line: max_line_len(&config),
            config,
            overlong: false,
        }
    }

    /// Read the next complete payload (blocking).
    ///
    /// Returns `Err(FrameError::Timeout)` when the port's read timeout
    /// elapses; any partial line is dropped and the next call starts clean.
    /// Returns `Err(FrameError::ConnectionClosed)` at end of stream.
    /// A checksum failure discards the frame being assembled. A line longer
    /// than any valid frame could produce is dropped as noise.
    pub fn receive(&mut self) -> Result<Bytes> {
        loop {
            self.line.clear();
            let limit = self.max_line as u64;
            match (&mut self.lines).take(limit).read_until(b'\n', &mut self.line) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    self.reset_lines();
                    return Err(FrameError::Timeout(self.config.read_timeout));
                }
                Err(err) => return Err(FrameError::Io(err)),
            }

            let terminated = self.line.last() == Some(&b'\n');
            if self.overlong {
                self.overlong = !terminated;
                continue;
            }
            if !terminated && self.line.len() >= self.max_line {
                debug!(limit = self.max_line, "discarding overlong serial line");
                self.overlong = true;
                continue;
            }

            if let Some(payload) = self.process_line()? {
                return Ok(payload);
            }
        }
    }

    fn process_line(&mut self) -> Result<Option<Bytes>> {
        let line = trim_line(&self.line);
        let Some((kind, text)) = classify_line(line) else {
            trace!(len = line.len(), "ignoring unmarked line");
            return Ok(None);
        };

        let decoded = match STANDARD.decode(text) {
            Ok(decoded) => decoded,
            Err(err) => {
                self.packet = None;
                return Err(FrameError::Base64(err));
            }
        };

        let data = match kind {
            LineKind::Start => {
                if decoded.len() < LENGTH_PREFIX_SIZE {
                    debug!(len = decoded.len(), "start line too short for length prefix");
                    return Ok(None);
                }
                let declared = usize::from(u16::from_be_bytes([decoded[0], decoded[1]]));
                if self.packet.take().is_some() {
                    debug!("start line interrupted partial frame");
                }
                if declared < CHECKSUM_SIZE {
                    return Err(FrameError::InvalidLength(declared));
                }
                if declared - CHECKSUM_SIZE > self.config.max_payload_size {
                    return Err(FrameError::FrameTooLarge {
                        size: declared - CHECKSUM_SIZE,
                        max: self.config.max_payload_size,
                    });
                }
                self.packet = Some(Packet::new(declared));
                &decoded[LENGTH_PREFIX_SIZE..]
            }
            LineKind::Continuation => &decoded[..],
        };

        let Some(packet) = self.packet.as_mut() else {
            trace!("continuation line without start, ignoring");
            return Ok(None);
        };
        if !packet.add_bytes(data) {
            return Ok(None);
        }

        let Some(mut packet) = self.packet.take() else {
            return Ok(None);
        };
        let residual = crc16(packet.bytes());
        if residual != 0 {
            warn!(residual, len = packet.len(), "serial frame checksum mismatch");
            return Err(FrameError::ChecksumMismatch { residual });
        }
        packet.trim_end(CHECKSUM_SIZE);
        trace!(len = packet.len(), "received serial frame");
        Ok(Some(packet.into_bytes()))
    }

    /// Drop whatever the line reader has buffered.
    fn reset_lines(&mut self) {
        let buffered = self.lines.buffer().len();
        self.lines.consume(buffered);
        self.line.clear();
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        self.lines.get_ref()
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        self.lines.get_mut()
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.lines.into_inner()
    }

    /// Current reader configuration.
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }
}

impl<P: Port> SerialFrameReader<P> {
    /// Create a reader over a port and apply the read timeout from config.
    pub fn with_config_port(inner: P, config: SerialConfig) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}

/// Longest line a valid frame can produce: marker, base64 of the whole
/// frame on one line, and a CRLF terminator.
fn max_line_len(config: &SerialConfig) -> usize {
    let frame = LENGTH_PREFIX_SIZE + config.max_payload_size + CHECKSUM_SIZE;
    let encoded = frame.div_ceil(3) * 4;
    (START_MARKER.len() + encoded + 2).max(LINE_BUFFER_CAPACITY)
}

/// Strip the line terminator and any leading carriage returns.
fn trim_line(mut line: &[u8]) -> &[u8] {
    if let Some(rest) = line.strip_suffix(b"\n") {
        line = rest;
    }
    if let Some(rest) = line.strip_suffix(b"\r") {
        line = rest;
    }
    while let Some(rest) = line.strip_prefix(b"\r") {
        line = rest;
    }
    line
}
