use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace};

use crate::error::{CodecError, Result};
use crate::message::{Code, Message, MessageType};
use crate::option::{decode_uint, MediaType, MessageOption, OptionId, OptionValue};
use crate::registry::{OptionRegistry, ValueFormat};

/// Fixed header: version/type/token-length (1) + code (1) + message id (2).
pub const HEADER_SIZE: usize = 4;

/// Protocol version written into every header.
pub const VERSION: u8 = 1;

/// Maximum token length.
pub const MAX_TOKEN_LEN: usize = 8;

/// Separates options from the payload.
pub const PAYLOAD_MARKER: u8 = 0xFF;

const EXT_BYTE_CODE: u8 = 13;
const EXT_BYTE_ADDEND: usize = 13;
const EXT_WORD_CODE: u8 = 14;
const EXT_WORD_ADDEND: usize = 269;
const EXT_RESERVED: u8 = 15;

/// Largest delta or length the extended nibble encoding can express.
const MAX_EXTENDED: usize = EXT_WORD_ADDEND + u16::MAX as usize;

/// Message encoder/decoder bound to one option registry.
#[derive(Debug, Clone)]
pub struct Codec {
    registry: Arc<OptionRegistry>,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(OptionRegistry::rfc7252())
    }
}

impl Codec {
    /// Create a codec that owns `registry`.
    pub fn new(registry: OptionRegistry) -> Self {
        Self::with_shared_registry(Arc::new(registry))
    }

    /// Create a codec sharing an existing registry.
    pub fn with_shared_registry(registry: Arc<OptionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &OptionRegistry {
        &self.registry
    }

    /// Encode a whole message.
    ///
    /// Wire format:
    /// ```text
    /// ┌─────┬──────┬─────┬────────┬────────────┬───────────┬─────────┬─────────┐
    /// │ Ver │ Type │ TKL │ Code   │ Message ID │ Token     │ Options │ 0xFF +  │
    /// │ 2b  │ 2b   │ 4b  │ (1B)   │ (2B BE)    │ (TKL B)   │         │ payload │
    /// └─────┴──────┴─────┴────────┴────────────┴───────────┴─────────┴─────────┘
    /// ```
    pub fn encode(&self, msg: &Message) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(HEADER_SIZE + MAX_TOKEN_LEN + msg.payload().len() + 32);
        self.encode_into(msg, &mut dst)?;
        Ok(dst.freeze())
    }

    /// Encode a whole message, appending to `dst`.
    pub fn encode_into(&self, msg: &Message, dst: &mut BytesMut) -> Result<()> {
        let token = msg.token();
        if token.len() > MAX_TOKEN_LEN {
            return Err(CodecError::InvalidTokenLen(token.len()));
        }

        dst.put_u8((VERSION << 6) | (msg.msg_type().bits() << 4) | token.len() as u8);
        dst.put_u8(msg.code().0);
        dst.put_u16(msg.message_id());
        dst.put_slice(token);
        self.encode_body(msg, dst)
    }

    /// Encode the region after the token: options, then marker and payload.
    pub fn encode_body(&self, msg: &Message, dst: &mut BytesMut) -> Result<()> {
        let mut prev = 0u16;
        for opt in msg.options() {
            let len = self.validate_option(opt)?;
            let delta = usize::from(opt.id.0 - prev);
            write_option_header(dst, delta, len);
            opt.value.write_to(dst);
            prev = opt.id.0;
        }

        if !msg.payload().is_empty() {
            dst.put_u8(PAYLOAD_MARKER);
            dst.put_slice(msg.payload());
        }
        Ok(())
    }

    /// Decode a whole message.
    pub fn decode(&self, src: &[u8]) -> Result<Message> {
        if src.len() < HEADER_SIZE {
            return Err(CodecError::Truncated("header"));
        }

        let version = src[0] >> 6;
        if version != VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        let msg_type = MessageType::from_bits(src[0] >> 4);
        let token_len = usize::from(src[0] & 0x0F);
        if token_len > MAX_TOKEN_LEN {
            return Err(CodecError::InvalidTokenLen(token_len));
        }
        let code = Code(src[1]);
        let message_id = u16::from_be_bytes([src[2], src[3]]);

        let rest = &src[HEADER_SIZE..];
        if rest.len() < token_len {
            return Err(CodecError::Truncated("token"));
        }
        let (token, body) = rest.split_at(token_len);

        let (options, payload) = self.decode_body(body)?;

        let mut msg = Message::new(msg_type, code, message_id).with_sorted_options(options);
        msg.set_token(Bytes::copy_from_slice(token))?;
        msg.set_payload(payload);
        Ok(msg)
    }

    /// Decode the region after the token.
    ///
    /// Options with unknown ids or out-of-bound lengths are skipped; malformed
    /// framing (reserved nibble, truncation) fails the whole message.
    pub fn decode_body(&self, src: &[u8]) -> Result<(Vec<MessageOption>, Bytes)> {
        let mut data = src;
        let mut prev = 0u32;
        let mut options = Vec::new();

        while let Some((&first, rest)) = data.split_first() {
            if first == PAYLOAD_MARKER {
                return Ok((options, Bytes::copy_from_slice(rest)));
            }
            data = rest;

            let delta_code = first >> 4;
            let len_code = first & 0x0F;
            if delta_code == EXT_RESERVED || len_code == EXT_RESERVED {
                return Err(CodecError::ReservedNibble);
            }

            let delta = read_extended(delta_code, &mut data, "option delta")?;
            let len = read_extended(len_code, &mut data, "option length")?;
            if data.len() < len {
                return Err(CodecError::Truncated("option value"));
            }
            let (raw, rest) = data.split_at(len);
            data = rest;

            let id = prev + delta as u32;
            let id = u16::try_from(id).map_err(|_| CodecError::OptionIdOverflow(id))?;
            prev = u32::from(id);
            let id = OptionId(id);

            match self.parse_value(id, raw) {
                Some(value) => options.push(MessageOption { id, value }),
                None => debug!(option = id.0, len, "dropping unrecognized or out-of-range option"),
            }
        }

        Ok((options, Bytes::new()))
    }

    fn validate_option(&self, opt: &MessageOption) -> Result<usize> {
        let len = opt.value.wire_len();
        match self.registry.get(opt.id) {
            Some(def) => {
                if !def.format.accepts(&opt.value) {
                    return Err(CodecError::InvalidOptionType {
                        id: opt.id,
                        expected: def.format,
                    });
                }
                if len > def.max_len.min(MAX_EXTENDED) {
                    return Err(CodecError::OptionTooLong {
                        id: opt.id,
                        len,
                        max: def.max_len.min(MAX_EXTENDED),
                    });
                }
                if len < def.min_len {
                    return Err(CodecError::OptionTooShort {
                        id: opt.id,
                        len,
                        min: def.min_len,
                    });
                }
            }
            None => {
                trace!(option = opt.id.0, "encoding option without registry entry");
                if len > MAX_EXTENDED {
                    return Err(CodecError::OptionTooLong {
                        id: opt.id,
                        len,
                        max: MAX_EXTENDED,
                    });
                }
            }
        }
        Ok(len)
    }

    fn parse_value(&self, id: OptionId, raw: &[u8]) -> Option<OptionValue> {
        let def = self.registry.get(id)?;
        if !def.accepts_len(raw.len()) {
            return None;
        }

        Some(match def.format {
            ValueFormat::Empty => OptionValue::Empty,
            ValueFormat::Opaque => OptionValue::Opaque(Bytes::copy_from_slice(raw)),
            ValueFormat::Text => OptionValue::Text(String::from_utf8_lossy(raw).into_owned()),
            ValueFormat::Uint => {
                let value = decode_uint(raw)?;
                match u16::try_from(value) {
                    Ok(media) if id.carries_media_type() => OptionValue::Media(MediaType(media)),
                    _ => OptionValue::Uint(value),
                }
            }
        })
    }
}

/// Split a delta or length into its nibble and extension bytes.
fn extend(value: usize) -> (u8, Option<u8>, Option<u16>) {
    if value >= EXT_WORD_ADDEND {
        (EXT_WORD_CODE, None, Some((value - EXT_WORD_ADDEND) as u16))
    } else if value >= EXT_BYTE_ADDEND {
        (EXT_BYTE_CODE, Some((value - EXT_BYTE_ADDEND) as u8), None)
    } else {
        (value as u8, None, None)
    }
}

fn write_option_header(dst: &mut BytesMut, delta: usize, len: usize) {
    let (delta_code, delta_byte, delta_word) = extend(delta);
    let (len_code, len_byte, len_word) = extend(len);

    dst.put_u8((delta_code << 4) | len_code);
    for (byte, word) in [(delta_byte, delta_word), (len_byte, len_word)] {
        if let Some(b) = byte {
            dst.put_u8(b);
        }
        if let Some(w) = word {
            dst.put_u16(w);
        }
    }
}

fn read_extended(code: u8, data: &mut &[u8], what: &'static str) -> Result<usize> {
    match code {
        EXT_BYTE_CODE => {
            let (&b, rest) = data.split_first().ok_or(CodecError::Truncated(what))?;
            *data = rest;
            Ok(usize::from(b) + EXT_BYTE_ADDEND)
        }
        EXT_WORD_CODE => {
            if data.len() < 2 {
                return Err(CodecError::Truncated(what));
            }
            let value = u16::from_be_bytes([data[0], data[1]]);
            *data = &data[2..];
            Ok(usize::from(value) + EXT_WORD_ADDEND)
        }
        direct => Ok(usize::from(direct)),
    }
}
