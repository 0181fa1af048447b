use std::time::Duration;

/// Errors that can occur during framing and fragmentation.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The reassembled frame failed its checksum; the frame was discarded.
    #[error("crc error (residual 0x{residual:04x})")]
    ChecksumMismatch { residual: u16 },

    /// A marked line did not carry valid base64.
    #[error("couldn't decode base64 line: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The payload does not fit in a frame.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// A start line declared a length too short to hold the checksum.
    #[error("invalid declared frame length {0}")]
    InvalidLength(usize),

    /// Burst size must be a positive multiple of four.
    #[error("invalid burst size {0}")]
    InvalidBurstSize(usize),

    /// Segment size leaves no room for payload after the fragment header.
    #[error("segment size {size} too small (min {min})")]
    InvalidSegmentSize { size: usize, min: usize },

    /// The payload needs more fragments than the 7-bit counter allows.
    #[error("payload needs {0} fragments (max 128)")]
    TooManyFragments(usize),

    /// A device address could not be parsed.
    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    /// No complete line arrived within the read timeout.
    #[error("timeout reading from serial connection after {0:?}")]
    Timeout(Option<Duration>),

    /// The port reached end of stream.
    #[error("connection closed")]
    ConnectionClosed,

    /// An I/O error occurred on the port.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] nodelink_transport::TransportError),

    /// Downlink envelope could not be serialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
