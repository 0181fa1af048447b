//! Link-level framing for nodelink messages.
//!
//! Two schemes turn encoded messages into robust on-wire units:
//!
//! - **Serial**: `length | payload | crc16`, base64 encoded, split into
//!   newline-terminated bursts tagged with start/continuation markers.
//!   [`SerialFrameWriter`] emits them, [`SerialFrameReader`] scans lines and
//!   reassembles complete frames through a [`Packet`].
//! - **Radio**: the payload is cut into small segments, each with a fragment
//!   header, base64 encoded and wrapped in an addressed downlink command.
//!   [`FragmentSender`] publishes them in order.

pub mod addr;
pub mod checksum;
pub mod codec;
pub mod error;
pub mod fragment;
pub mod packet;
pub mod reader;
pub mod writer;

pub use addr::Eui64;
pub use checksum::crc16;
pub use codec::{
    encode_frame, SerialConfig, CONTINUATION_MARKER, DEFAULT_BURST_SIZE, DEFAULT_SERIAL_MTU,
    MAX_SERIAL_PAYLOAD, START_MARKER,
};
pub use error::{FrameError, Result};
pub use fragment::{
    downlink_envelope, split_fragments, FragmentHeader, FragmentSender, RadioConfig,
    DEFAULT_RADIO_PORT, LAST_FRAGMENT,
};
pub use packet::Packet;
pub use reader::SerialFrameReader;
pub use writer::SerialFrameWriter;
