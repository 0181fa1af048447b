use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

/// Numeric option identifier.
///
/// Registered options fit in a byte, but deltas on the wire may address any
/// id up to `u16::MAX`; unregistered ids are carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OptionId(pub u16);

impl OptionId {
    pub const IF_MATCH: Self = Self(1);
    pub const URI_HOST: Self = Self(3);
    pub const ETAG: Self = Self(4);
    pub const IF_NONE_MATCH: Self = Self(5);
    pub const OBSERVE: Self = Self(6);
    pub const URI_PORT: Self = Self(7);
    pub const LOCATION_PATH: Self = Self(8);
    pub const URI_PATH: Self = Self(11);
    pub const CONTENT_FORMAT: Self = Self(12);
    pub const MAX_AGE: Self = Self(14);
    pub const URI_QUERY: Self = Self(15);
    pub const ACCEPT: Self = Self(17);
    pub const LOCATION_QUERY: Self = Self(20);
    pub const PROXY_URI: Self = Self(35);
    pub const PROXY_SCHEME: Self = Self(39);
    pub const SIZE1: Self = Self(60);

    /// Integer options whose values are media types rather than plain numbers.
    pub fn carries_media_type(self) -> bool {
        self == Self::CONTENT_FORMAT || self == Self::ACCEPT
    }
}

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content format of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediaType(pub u16);

impl MediaType {
    /// text/plain;charset=utf-8
    pub const TEXT_PLAIN: Self = Self(0);
    /// application/link-format
    pub const LINK_FORMAT: Self = Self(40);
    /// application/xml
    pub const XML: Self = Self(41);
    /// application/octet-stream
    pub const OCTET_STREAM: Self = Self(42);
    /// application/exi
    pub const EXI: Self = Self(47);
    /// application/json
    pub const JSON: Self = Self(50);
    /// application/cbor
    pub const CBOR: Self = Self(60);
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::TEXT_PLAIN => "text/plain",
            Self::LINK_FORMAT => "application/link-format",
            Self::XML => "application/xml",
            Self::OCTET_STREAM => "application/octet-stream",
            Self::EXI => "application/exi",
            Self::JSON => "application/json",
            Self::CBOR => "application/cbor",
            Self(other) => return write!(f, "media-type({other})"),
        };
        f.write_str(name)
    }
}

/// A typed option value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    /// Zero-length marker option.
    Empty,
    /// Raw bytes.
    Opaque(Bytes),
    /// Unsigned integer, sent as minimal big-endian.
    Uint(u32),
    /// Unsigned integer naming a content format.
    Media(MediaType),
    /// UTF-8 text.
    Text(String),
}

impl OptionValue {
    /// Number of value bytes this option occupies on the wire.
    pub fn wire_len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Opaque(bytes) => bytes.len(),
            Self::Uint(v) => uint_len(*v),
            Self::Media(m) => uint_len(u32::from(m.0)),
            Self::Text(s) => s.len(),
        }
    }

    /// Append the value bytes to `dst`.
    pub fn write_to(&self, dst: &mut BytesMut) {
        match self {
            Self::Empty => {}
            Self::Opaque(bytes) => dst.put_slice(bytes),
            Self::Uint(v) => put_uint(*v, dst),
            Self::Media(m) => put_uint(u32::from(m.0), dst),
            Self::Text(s) => dst.put_slice(s.as_bytes()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Opaque(bytes) => Some(bytes.as_ref()),
            Self::Empty => Some(&[][..]),
            _ => None,
        }
    }

    /// Integer view; media types read as their numeric value.
    pub fn as_uint(&self) -> Option<u32> {
        match self {
            Self::Uint(v) => Some(*v),
            Self::Media(m) => Some(u32::from(m.0)),
            _ => None,
        }
    }

    pub fn as_media_type(&self) -> Option<MediaType> {
        match self {
            Self::Media(m) => Some(*m),
            _ => None,
        }
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<u32> for OptionValue {
    fn from(value: u32) -> Self {
        Self::Uint(value)
    }
}

impl From<u16> for OptionValue {
    fn from(value: u16) -> Self {
        Self::Uint(u32::from(value))
    }
}

impl From<MediaType> for OptionValue {
    fn from(value: MediaType) -> Self {
        Self::Media(value)
    }
}

impl From<Bytes> for OptionValue {
    fn from(value: Bytes) -> Self {
        Self::Opaque(value)
    }
}

impl From<Vec<u8>> for OptionValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Opaque(Bytes::from(value))
    }
}

impl From<&[u8]> for OptionValue {
    fn from(value: &[u8]) -> Self {
        Self::Opaque(Bytes::copy_from_slice(value))
    }
}

/// One option entry attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageOption {
    pub id: OptionId,
    pub value: OptionValue,
}

impl MessageOption {
    /// Integer values are stored as `Media` on media-type ids and as `Uint`
    /// everywhere else, matching what decoding yields for the same bytes.
    pub fn new(id: OptionId, value: impl Into<OptionValue>) -> Self {
        let value = match value.into() {
            OptionValue::Uint(v) if id.carries_media_type() => match u16::try_from(v) {
                Ok(media) => OptionValue::Media(MediaType(media)),
                Err(_) => OptionValue::Uint(v),
            },
            OptionValue::Media(m) if !id.carries_media_type() => {
                OptionValue::Uint(u32::from(m.0))
            }
            value => value,
        };
        Self { id, value }
    }
}

fn uint_len(v: u32) -> usize {
    4 - (v.leading_zeros() as usize / 8)
}

fn put_uint(v: u32, dst: &mut BytesMut) {
    let bytes = v.to_be_bytes();
    dst.put_slice(&bytes[4 - uint_len(v)..]);
}

/// Decode a big-endian unsigned integer of at most four bytes.
/// An empty slice decodes to zero.
pub(crate) fn decode_uint(raw: &[u8]) -> Option<u32> {
    if raw.len() > 4 {
        return None;
    }
    Some(raw.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b)))
}
