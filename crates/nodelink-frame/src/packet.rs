use bytes::{Bytes, BytesMut};

/// Accumulates the decoded bytes of one serial frame.
///
/// The buffer never grows past the length declared on the start line.
#[derive(Debug)]
pub struct Packet {
    expected_len: usize,
    buf: BytesMut,
}

impl Packet {
    /// Start a packet expecting `expected_len` bytes (payload plus checksum).
    pub fn new(expected_len: usize) -> Self {
        Self {
            expected_len,
            buf: BytesMut::with_capacity(expected_len),
        }
    }

    /// Append decoded bytes. Returns `true` once the packet is complete.
    ///
    /// Bytes beyond the declared length are dropped.
    pub fn add_bytes(&mut self, data: &[u8]) -> bool {
        let take = data.len().min(self.remaining());
        self.buf.extend_from_slice(&data[..take]);
        self.is_complete()
    }

    pub fn is_complete(&self) -> bool {
        self.buf.len() >= self.expected_len
    }

    /// Bytes still missing.
    pub fn remaining(&self) -> usize {
        self.expected_len - self.buf.len()
    }

    pub fn expected_len(&self) -> usize {
        self.expected_len
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Accumulated bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Drop `n` trailing bytes (used to strip the checksum).
    pub fn trim_end(&mut self, n: usize) {
        let keep = self.buf.len().saturating_sub(n);
        self.buf.truncate(keep);
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}
