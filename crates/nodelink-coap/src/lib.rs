//! Compact request/response message codec.
//!
//! Messages follow the constrained-application datagram layout: a 4-byte
//! header, a 0-8 byte token, delta-encoded options sorted by id, and an
//! optional payload behind a `0xFF` marker. Option values are interpreted
//! through an explicitly constructed [`OptionRegistry`] owned by the
//! [`Codec`]; nothing here relies on global tables.

pub mod codec;
pub mod error;
pub mod message;
pub mod option;
pub mod registry;

pub use codec::{Codec, HEADER_SIZE, MAX_TOKEN_LEN, PAYLOAD_MARKER, VERSION};
pub use error::{CodecError, Result};
pub use message::{Code, Message, MessageType};
pub use option::{MediaType, MessageOption, OptionId, OptionValue};
pub use registry::{OptionDef, OptionRegistry, ValueFormat};
