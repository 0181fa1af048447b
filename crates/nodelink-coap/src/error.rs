use crate::option::OptionId;
use crate::registry::ValueFormat;

/// Errors that can occur while encoding or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The token is longer than the protocol allows.
    #[error("invalid token length {0} (max 8)")]
    InvalidTokenLen(usize),

    /// An option value is longer than its registry bound (or the wire limit).
    #[error("option {id} is too long ({len} bytes, max {max})")]
    OptionTooLong { id: OptionId, len: usize, max: usize },

    /// An option value is shorter than its registry bound.
    #[error("option {id} is too short ({len} bytes, min {min})")]
    OptionTooShort { id: OptionId, len: usize, min: usize },

    /// The caller supplied a value variant the registry entry cannot carry.
    #[error("invalid value type for option {id} (expected {expected})")]
    InvalidOptionType { id: OptionId, expected: ValueFormat },

    /// A delta or length nibble used the reserved value 15.
    #[error("unexpected extended option marker")]
    ReservedNibble,

    /// The input ended inside a header, token, extension or option value.
    #[error("truncated {0}")]
    Truncated(&'static str),

    /// Accumulated option deltas ran past the largest option id.
    #[error("option id {0} out of range")]
    OptionIdOverflow(u32),

    /// The header carries a protocol version other than 1.
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
}

impl CodecError {
    /// True for errors caused by malformed input rather than caller misuse.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::InvalidTokenLen(_)
                | Self::ReservedNibble
                | Self::Truncated(_)
                | Self::OptionIdOverflow(_)
                | Self::UnsupportedVersion(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
