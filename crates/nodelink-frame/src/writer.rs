use std::io::{ErrorKind, Write};
use std::thread;

use tracing::trace;

use crate::codec::{encode_frame, SerialConfig};
use crate::error::{FrameError, Result};

/// Writes framed payloads as serial lines to any `Write` stream.
///
/// Lines of one frame are separated by `burst_delay` so slow device UARTs
/// can drain their receive buffer.
pub struct SerialFrameWriter<T> {
    inner: T,
    config: SerialConfig,
}

impl<T: Write> SerialFrameWriter<T> {
    /// Create a new writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, SerialConfig::default())
    }

    /// Create a new writer with explicit configuration.
    pub fn with_config(inner: T, config: SerialConfig) -> Self {
        Self { inner, config }
    }

    /// Frame and send one payload (blocking).
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_payload_size {
            return Err(FrameError::FrameTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }

        let lines = encode_frame(payload, self.config.burst_size)?;
        trace!(len = payload.len(), lines = lines.len(), "sending serial frame");

        for (i, line) in lines.iter().enumerate() {
            if i > 0 && !self.config.burst_delay.is_zero() {
                thread::sleep(self.config.burst_delay);
            }
            self.write_all(line)?;
        }
        self.inner.flush().map_err(FrameError::Io)
    }

    fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            match self.inner.write(buf) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => buf = &buf[n..],
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        Ok(())
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current writer configuration.
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }
}
