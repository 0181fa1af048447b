use std::time::Duration;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// `open` called on an open session.
    #[error("session already open")]
    AlreadyOpen,

    /// `close` called on a session that is not open.
    #[error("session not open")]
    NotOpen,

    /// The session is closed, or was closed while a request was in flight.
    #[error("session closed")]
    SessionClosed,

    /// The in-flight request was aborted by the caller.
    #[error("rx aborted")]
    Aborted,

    /// No response arrived in time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The target address could not be normalized.
    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    /// Another listener already owns this target.
    #[error("listener already registered for {0}")]
    DuplicateListener(String),

    /// A shared lock was poisoned by a panicking thread.
    #[error("session state poisoned")]
    Poisoned,

    /// Message encode/decode error.
    #[error("codec error: {0}")]
    Codec(#[from] nodelink_coap::CodecError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] nodelink_frame::FrameError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] nodelink_transport::TransportError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
