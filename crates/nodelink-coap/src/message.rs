use std::fmt;

use bytes::Bytes;

use crate::codec::MAX_TOKEN_LEN;
use crate::error::{CodecError, Result};
use crate::option::{MediaType, MessageOption, OptionId, OptionValue};

/// Message type carried in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Requires an acknowledgement.
    Confirmable = 0,
    /// Does not require an acknowledgement.
    NonConfirmable = 1,
    /// Acknowledges a confirmable message.
    Acknowledgement = 2,
    /// Permanent negative acknowledgement.
    Reset = 3,
}

impl MessageType {
    /// Map the two low bits to a type.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Confirmable,
            1 => Self::NonConfirmable,
            2 => Self::Acknowledgement,
            _ => Self::Reset,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Confirmable => "Confirmable",
            Self::NonConfirmable => "NonConfirmable",
            Self::Acknowledgement => "Acknowledgement",
            Self::Reset => "Reset",
        })
    }
}

/// Request or response code (`class.detail` packed into one byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Code(pub u8);

impl Code {
    pub const EMPTY: Self = Self(0);

    pub const GET: Self = Self(1);
    pub const POST: Self = Self(2);
    pub const PUT: Self = Self(3);
    pub const DELETE: Self = Self(4);

    pub const CREATED: Self = Self(65);
    pub const DELETED: Self = Self(66);
    pub const VALID: Self = Self(67);
    pub const CHANGED: Self = Self(68);
    pub const CONTENT: Self = Self(69);
    pub const BAD_REQUEST: Self = Self(128);
    pub const UNAUTHORIZED: Self = Self(129);
    pub const BAD_OPTION: Self = Self(130);
    pub const FORBIDDEN: Self = Self(131);
    pub const NOT_FOUND: Self = Self(132);
    pub const METHOD_NOT_ALLOWED: Self = Self(133);
    pub const NOT_ACCEPTABLE: Self = Self(134);
    pub const PRECONDITION_FAILED: Self = Self(140);
    pub const REQUEST_ENTITY_TOO_LARGE: Self = Self(141);
    pub const UNSUPPORTED_MEDIA_TYPE: Self = Self(143);
    pub const INTERNAL_SERVER_ERROR: Self = Self(160);
    pub const NOT_IMPLEMENTED: Self = Self(161);
    pub const BAD_GATEWAY: Self = Self(162);
    pub const SERVICE_UNAVAILABLE: Self = Self(163);
    pub const GATEWAY_TIMEOUT: Self = Self(164);
    pub const PROXYING_NOT_SUPPORTED: Self = Self(165);

    pub fn class(self) -> u8 {
        self.0 >> 5
    }

    pub fn detail(self) -> u8 {
        self.0 & 0x1F
    }

    pub fn is_request(self) -> bool {
        self.class() == 0 && self.0 != 0
    }

    pub fn is_response(self) -> bool {
        (2..=5).contains(&self.class())
    }

    pub fn is_success(self) -> bool {
        self.class() == 2
    }

    /// Symbolic name for well-known codes.
    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::EMPTY => "Empty",
            Self::GET => "GET",
            Self::POST => "POST",
            Self::PUT => "PUT",
            Self::DELETE => "DELETE",
            Self::CREATED => "Created",
            Self::DELETED => "Deleted",
            Self::VALID => "Valid",
            Self::CHANGED => "Changed",
            Self::CONTENT => "Content",
            Self::BAD_REQUEST => "BadRequest",
            Self::UNAUTHORIZED => "Unauthorized",
            Self::BAD_OPTION => "BadOption",
            Self::FORBIDDEN => "Forbidden",
            Self::NOT_FOUND => "NotFound",
            Self::METHOD_NOT_ALLOWED => "MethodNotAllowed",
            Self::NOT_ACCEPTABLE => "NotAcceptable",
            Self::PRECONDITION_FAILED => "PreconditionFailed",
            Self::REQUEST_ENTITY_TOO_LARGE => "RequestEntityTooLarge",
            Self::UNSUPPORTED_MEDIA_TYPE => "UnsupportedMediaType",
            Self::INTERNAL_SERVER_ERROR => "InternalServerError",
            Self::NOT_IMPLEMENTED => "NotImplemented",
            Self::BAD_GATEWAY => "BadGateway",
            Self::SERVICE_UNAVAILABLE => "ServiceUnavailable",
            Self::GATEWAY_TIMEOUT => "GatewayTimeout",
            Self::PROXYING_NOT_SUPPORTED => "ProxyingNotSupported",
            _ => return None,
        })
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "Unknown (0x{:x})", self.0),
        }
    }
}

/// A protocol message.
///
/// Options are kept sorted by id with ties in insertion order; the codec
/// relies on this when it delta-encodes ids. All mutation goes through the
/// methods below so the ordering cannot be broken from outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    msg_type: MessageType,
    code: Code,
    message_id: u16,
    token: Bytes,
    payload: Bytes,
    options: Vec<MessageOption>,
}

impl Message {
    /// Create a message with no token, options or payload.
    pub fn new(msg_type: MessageType, code: Code, message_id: u16) -> Self {
        Self {
            msg_type,
            code,
            message_id,
            token: Bytes::new(),
            payload: Bytes::new(),
            options: Vec::new(),
        }
    }

    /// Confirmable request shorthand.
    pub fn request(code: Code, message_id: u16) -> Self {
        Self::new(MessageType::Confirmable, code, message_id)
    }

    pub fn msg_type(&self) -> MessageType {
        self.msg_type
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message_id(&self) -> u16 {
        self.message_id
    }

    pub fn token(&self) -> &Bytes {
        &self.token
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// All options, in wire order.
    pub fn options(&self) -> &[MessageOption] {
        &self.options
    }

    pub fn is_confirmable(&self) -> bool {
        self.msg_type == MessageType::Confirmable
    }

    pub fn set_type(&mut self, msg_type: MessageType) {
        self.msg_type = msg_type;
    }

    pub fn set_code(&mut self, code: Code) {
        self.code = code;
    }

    pub fn set_message_id(&mut self, message_id: u16) {
        self.message_id = message_id;
    }

    /// Set the token. Fails if it is longer than eight bytes.
    pub fn set_token(&mut self, token: impl Into<Bytes>) -> Result<()> {
        let token = token.into();
        if token.len() > MAX_TOKEN_LEN {
            return Err(CodecError::InvalidTokenLen(token.len()));
        }
        self.token = token;
        Ok(())
    }

    pub fn set_payload(&mut self, payload: impl Into<Bytes>) {
        self.payload = payload.into();
    }

    /// First value for an option id.
    pub fn option(&self, id: OptionId) -> Option<&OptionValue> {
        self.option_values(id).next()
    }

    /// Every value for an option id, in insertion order.
    pub fn option_values(&self, id: OptionId) -> impl Iterator<Item = &OptionValue> + '_ {
        self.options
            .iter()
            .filter(move |opt| opt.id == id)
            .map(|opt| &opt.value)
    }

    /// Add one option value after any existing values with the same id.
    pub fn add_option(&mut self, id: OptionId, value: impl Into<OptionValue>) {
        let pos = self.options.partition_point(|opt| opt.id <= id);
        self.options.insert(pos, MessageOption::new(id, value));
    }

    /// Add one option entry per element, preserving the input order.
    pub fn add_options<I, V>(&mut self, id: OptionId, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<OptionValue>,
    {
        let mut pos = self.options.partition_point(|opt| opt.id <= id);
        for value in values {
            self.options.insert(pos, MessageOption::new(id, value));
            pos += 1;
        }
    }

    /// Replace every value for an option id with a single value.
    pub fn set_option(&mut self, id: OptionId, value: impl Into<OptionValue>) {
        self.remove_option(id);
        self.add_option(id, value);
    }

    /// Remove every value for an option id.
    pub fn remove_option(&mut self, id: OptionId) {
        self.options.retain(|opt| opt.id != id);
    }

    /// Uri-Path segments.
    pub fn path(&self) -> Vec<&str> {
        self.option_values(OptionId::URI_PATH)
            .filter_map(OptionValue::as_str)
            .collect()
    }

    /// Uri-Path joined with `/`.
    pub fn path_string(&self) -> String {
        self.path().join("/")
    }

    /// Replace the Uri-Path with the given segments.
    pub fn set_path<I, S>(&mut self, segments: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove_option(OptionId::URI_PATH);
        self.add_options(
            OptionId::URI_PATH,
            segments.into_iter().map(|s| OptionValue::Text(s.into())),
        );
    }

    /// Replace the Uri-Path from a `/`-separated string; leading slashes are ignored.
    pub fn set_path_string(&mut self, path: &str) {
        let trimmed = path.trim_start_matches('/');
        if trimmed.is_empty() {
            self.remove_option(OptionId::URI_PATH);
        } else {
            self.set_path(trimmed.split('/'));
        }
    }

    /// Append a Uri-Query entry.
    pub fn set_uri_query(&mut self, query: &str) {
        self.add_option(OptionId::URI_QUERY, query);
    }

    pub fn content_format(&self) -> Option<MediaType> {
        self.option(OptionId::CONTENT_FORMAT)
            .and_then(OptionValue::as_media_type)
    }

    /// Take ownership of the options, used by the decoder to build messages.
    pub(crate) fn with_sorted_options(mut self, options: Vec<MessageOption>) -> Self {
        for opt in options {
            let pos = self.options.partition_point(|existing| existing.id <= opt.id);
            self.options.insert(pos, opt);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_stay_sorted_with_stable_ties() {
        let mut msg = Message::request(Code::GET, 1);
        msg.add_option(OptionId::URI_QUERY, "b=2");
        msg.add_option(OptionId::URI_PATH, "first");
        msg.add_option(OptionId::CONTENT_FORMAT, MediaType::JSON);
        msg.add_option(OptionId::URI_PATH, "second");
        msg.add_option(OptionId::URI_QUERY, "a=1");

        let ids: Vec<u16> = msg.options().iter().map(|o| o.id.0).collect();
        assert_eq!(ids, vec![11, 11, 12, 15, 15]);
        assert_eq!(msg.path(), vec!["first", "second"]);
        let queries: Vec<_> = msg
            .option_values(OptionId::URI_QUERY)
            .filter_map(OptionValue::as_str)
            .collect();
        assert_eq!(queries, vec!["b=2", "a=1"]);
    }

    #[test]
    fn add_options_expands_sequence_in_order() {
        let mut msg = Message::request(Code::GET, 1);
        msg.add_option(OptionId::URI_PATH, "pre");
        msg.add_options(OptionId::URI_PATH, ["x", "y", "z"]);
        assert_eq!(msg.path_string(), "pre/x/y/z");
    }

    #[test]
    fn set_path_string_replaces_path() {
        let mut msg = Message::request(Code::GET, 1);
        msg.set_path_string("/omgr/res");
        msg.set_path_string("//dev/node/state");
        assert_eq!(msg.path(), vec!["dev", "node", "state"]);

        msg.set_path_string("/");
        assert!(msg.path().is_empty());
    }

    #[test]
    fn set_option_replaces_all_values() {
        let mut msg = Message::request(Code::GET, 1);
        msg.add_option(OptionId::ETAG, vec![1u8]);
        msg.add_option(OptionId::ETAG, vec![2u8]);
        msg.set_option(OptionId::ETAG, vec![3u8]);

        let tags: Vec<_> = msg.option_values(OptionId::ETAG).collect();
        assert_eq!(tags, vec![&OptionValue::from(vec![3u8])]);
    }

    #[test]
    fn remove_option_leaves_others() {
        let mut msg = Message::request(Code::GET, 1);
        msg.set_path_string("a/b");
        msg.set_uri_query("k=v");
        msg.remove_option(OptionId::URI_PATH);

        assert!(msg.option(OptionId::URI_PATH).is_none());
        assert_eq!(
            msg.option(OptionId::URI_QUERY).and_then(OptionValue::as_str),
            Some("k=v")
        );
    }

    #[test]
    fn token_length_is_bounded() {
        let mut msg = Message::request(Code::GET, 1);
        msg.set_token(vec![0u8; 8]).unwrap();
        let err = msg.set_token(vec![0u8; 9]).unwrap_err();
        assert!(matches!(err, CodecError::InvalidTokenLen(9)));
        assert_eq!(msg.token().len(), 8);
    }

    #[test]
    fn code_classification_and_names() {
        assert!(Code::GET.is_request());
        assert!(!Code::EMPTY.is_request());
        assert!(Code::CONTENT.is_response());
        assert!(Code::CONTENT.is_success());
        assert!(!Code::NOT_FOUND.is_success());
        assert_eq!((Code::CONTENT.class(), Code::CONTENT.detail()), (2, 5));
        assert_eq!(Code::NOT_FOUND.to_string(), "NotFound");
        assert_eq!(Code(0xFF).to_string(), "Unknown (0xff)");
        assert_eq!(MessageType::from_bits(2), MessageType::Acknowledgement);
    }
}
